//! Подгонка длительности озвучки под целевую
//!
//! Фильтр atempo стабильно работает только с коэффициентами из [0.5, 2.0],
//! поэтому план подгонки бывает трёх видов:
//! - одна ступень, если коэффициент в диапазоне;
//! - цепочка ступеней не больше 2.0, если нужно сильное ускорение;
//! - дописывание тишины и одна ступень, если нужно сильное замедление.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::NarrationConfig;
use crate::error::{NarrationError, Result};
use crate::media::toolkit::{AudioOp, MediaToolkit};
use crate::media::AudioAsset;

/// Минимальный коэффициент одной ступени atempo
pub const MIN_TEMPO: f64 = 0.5;

/// Максимальный коэффициент одной ступени atempo
pub const MAX_TEMPO: f64 = 2.0;

/// Длительность дописываемой тишины относительно целевой длительности
pub const SILENCE_PAD_FRACTION: f64 = 0.5;

/// Целевая длительность озвучки как доля длительности видео
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationTarget {
    pub video_duration_secs: f64,
    pub narration_ratio: f64,
}

impl DurationTarget {
    pub fn new(video_duration_secs: f64, narration_ratio: f64) -> Result<Self> {
        if !(video_duration_secs.is_finite() && video_duration_secs > 0.0) {
            return Err(NarrationError::InvalidInput(format!(
                "video duration must be positive, got {}",
                video_duration_secs
            )));
        }
        if !(narration_ratio > 0.0 && narration_ratio <= 1.0) {
            return Err(NarrationError::InvalidInput(format!(
                "narration ratio must be in (0, 1], got {}",
                narration_ratio
            )));
        }
        Ok(Self {
            video_duration_secs,
            narration_ratio,
        })
    }

    /// Длительность, которую должна занять озвучка
    pub fn narration_duration(&self) -> f64 {
        self.video_duration_secs * self.narration_ratio
    }
}

/// Отношение текущей длительности к целевой (>1 ускорить, <1 замедлить)
pub fn tempo_factor(current: f64, target: f64) -> f64 {
    current / target
}

/// Разложить коэффициент на ступени из [0.5, 2.0], произведение которых равно исходному
pub fn decompose(factor: f64) -> Vec<f64> {
    let mut stages = Vec::new();
    let mut remaining = factor;

    while remaining > MAX_TEMPO {
        stages.push(MAX_TEMPO);
        remaining /= MAX_TEMPO;
    }
    while remaining < MIN_TEMPO {
        stages.push(MIN_TEMPO);
        remaining /= MIN_TEMPO;
    }
    stages.push(remaining);
    stages
}

/// План изменения темпа
#[derive(Debug, Clone, PartialEq)]
pub enum TempoPlan {
    /// Разница меньше порога, файл копируется как есть
    Unchanged,
    /// Одна или несколько ступеней atempo
    Stretch { stages: Vec<f64> },
    /// Тишина в конец, затем atempo по объединённой длительности
    PadThenStretch { silence_secs: f64, stages: Vec<f64> },
}

impl TempoPlan {
    /// Выбрать план для подгонки `current` секунд под `target`
    pub fn compute(current: f64, target: f64, adjustment_threshold: f64) -> Result<Self> {
        if !(target.is_finite() && target > 0.0) {
            return Err(NarrationError::InvalidInput(format!(
                "target duration must be positive, got {}",
                target
            )));
        }
        if !(current.is_finite() && current > 0.0) {
            return Err(NarrationError::InvalidInput(format!(
                "current duration must be positive, got {}",
                current
            )));
        }

        if (current - target).abs() < adjustment_threshold {
            return Ok(Self::Unchanged);
        }

        let factor = tempo_factor(current, target);
        if factor < MIN_TEMPO {
            let silence_secs = target * SILENCE_PAD_FRACTION;
            let residual = tempo_factor(current + silence_secs, target);
            Ok(Self::PadThenStretch {
                silence_secs,
                stages: decompose(residual),
            })
        } else {
            Ok(Self::Stretch {
                stages: decompose(factor),
            })
        }
    }

    pub fn stages(&self) -> &[f64] {
        match self {
            Self::Unchanged => &[],
            Self::Stretch { stages } | Self::PadThenStretch { stages, .. } => stages,
        }
    }

    /// Итоговый коэффициент всех ступеней
    pub fn total_factor(&self) -> f64 {
        self.stages().iter().product()
    }

    /// Ожидаемая длительность результата
    pub fn predicted_duration(&self, current: f64) -> f64 {
        match self {
            Self::Unchanged => current,
            Self::Stretch { .. } => current / self.total_factor(),
            Self::PadThenStretch { silence_secs, .. } => (current + silence_secs) / self.total_factor(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Unchanged => "copy".to_string(),
            Self::Stretch { stages } if stages.len() == 1 => format!("atempo {:.4}", stages[0]),
            Self::Stretch { stages } => format!("chained atempo {:?}", stages),
            Self::PadThenStretch { silence_secs, stages } => {
                format!("pad {:.3}s silence, then atempo {:?}", silence_secs, stages)
            }
        }
    }
}

/// Подгонка длительности аудиофайла
pub struct DurationMatcher {
    toolkit: Arc<dyn MediaToolkit>,
    adjustment_threshold: f64,
    tolerance_ratio: f64,
    max_correction_passes: u32,
}

impl DurationMatcher {
    pub fn new(toolkit: Arc<dyn MediaToolkit>, config: &NarrationConfig) -> Self {
        Self {
            toolkit,
            adjustment_threshold: config.adjustment_threshold,
            tolerance_ratio: config.tolerance_ratio,
            max_correction_passes: config.max_correction_passes,
        }
    }

    /// Подогнать `asset` длительностью `current` под `target`, записав результат в `output`.
    ///
    /// Ошибка ffmpeg не прерывает работу: в `output` копируется исходный файл.
    /// Ошибкой считаются только таймаут и невозможность скопировать исходник.
    pub async fn match_duration(
        &self,
        asset: &AudioAsset,
        current: f64,
        target: f64,
        output: &Path,
    ) -> Result<AudioAsset> {
        let plan = TempoPlan::compute(current, target, self.adjustment_threshold)?;
        info!(
            "Matching narration {:.3}s -> {:.3}s (factor {:.4}): {}",
            current,
            target,
            tempo_factor(current, target),
            plan.describe()
        );

        if plan == TempoPlan::Unchanged {
            self.copy(asset.path(), output).await?;
            return Ok(AudioAsset::with_duration(output, current));
        }

        debug!(
            "Planned stages {:?}, product {:.6}, predicted {:.3}s",
            plan.stages(),
            plan.total_factor(),
            plan.predicted_duration(current)
        );

        if let Err(e) = self.apply(asset.path(), &plan, output).await {
            if matches!(e, NarrationError::Timeout { .. }) {
                return Err(e);
            }
            warn!(
                "Tempo adjustment failed ({}), shipping unmodified narration: {:.3}s instead of {:.3}s",
                e, current, target
            );
            self.copy(asset.path(), output).await?;
            return Ok(AudioAsset::with_duration(output, current));
        }

        let mut result = AudioAsset::new(output);
        self.verify(&mut result, target).await;

        for pass in 1..=self.max_correction_passes {
            let Some(measured) = result.known_duration() else {
                break;
            };
            if self.within_tolerance(measured, target) {
                break;
            }
            let correction = TempoPlan::compute(measured, target, self.adjustment_threshold)?;
            if correction == TempoPlan::Unchanged {
                break;
            }

            info!("Correction pass {}: {:.3}s -> {:.3}s ({})", pass, measured, target, correction.describe());
            let corrected = sibling_path(output, &format!("pass{}", pass));
            if let Err(e) = self.apply(output, &correction, &corrected).await {
                if matches!(e, NarrationError::Timeout { .. }) {
                    return Err(e);
                }
                warn!("Correction pass {} failed ({}), keeping previous result", pass, e);
                break;
            }
            self.copy(&corrected, output).await?;
            remove_intermediate(&corrected).await;

            result = AudioAsset::new(output);
            self.verify(&mut result, target).await;
        }

        Ok(result)
    }

    async fn apply(&self, input: &Path, plan: &TempoPlan, output: &Path) -> Result<()> {
        match plan {
            TempoPlan::Unchanged => self.copy(input, output).await,
            TempoPlan::Stretch { stages } => {
                self.toolkit
                    .run(&AudioOp::Tempo {
                        input: input.to_path_buf(),
                        output: output.to_path_buf(),
                        stages: stages.clone(),
                    })
                    .await
            }
            TempoPlan::PadThenStretch { silence_secs, stages } => {
                let padded = sibling_path(output, "padded");
                self.toolkit
                    .run(&AudioOp::PadSilence {
                        input: input.to_path_buf(),
                        output: padded.clone(),
                        silence_secs: *silence_secs,
                    })
                    .await?;
                let stretched = self
                    .toolkit
                    .run(&AudioOp::Tempo {
                        input: padded.clone(),
                        output: output.to_path_buf(),
                        stages: stages.clone(),
                    })
                    .await;
                remove_intermediate(&padded).await;
                stretched
            }
        }
    }

    async fn copy(&self, input: &Path, output: &Path) -> Result<()> {
        self.toolkit
            .run(&AudioOp::Copy {
                input: input.to_path_buf(),
                output: output.to_path_buf(),
            })
            .await
    }

    /// Повторная проба результата; только логирует погрешность
    async fn verify(&self, result: &mut AudioAsset, target: f64) {
        match result.ensure_duration(self.toolkit.as_ref()).await {
            Some(measured) => {
                let residual = measured - target;
                if self.within_tolerance(measured, target) {
                    info!(
                        "Narration duration {:.3}s (target {:.3}s, residual {:+.3}s)",
                        measured, target, residual
                    );
                } else {
                    warn!(
                        "Narration duration {:.3}s misses target {:.3}s by {:+.3}s ({:.1}%)",
                        measured,
                        target,
                        residual,
                        residual.abs() / target * 100.0
                    );
                }
            }
            None => warn!(
                "Could not verify duration of {}, residual unknown",
                result.path().display()
            ),
        }
    }

    fn within_tolerance(&self, measured: f64, target: f64) -> bool {
        (measured - target).abs() <= target * self.tolerance_ratio
    }
}

/// Удалить промежуточный файл рядом с результатом; отсутствие файла не ошибка
async fn remove_intermediate(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed intermediate {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove intermediate {}: {}", path.display(), e),
    }
}

/// `dir/name.mp3` -> `dir/name_tag.mp3`
fn sibling_path(path: &Path, tag: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "narration".to_string());
    let file_name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, tag, ext.to_string_lossy()),
        None => format!("{}_{}", stem, tag),
    };
    path.with_file_name(file_name)
}
