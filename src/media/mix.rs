//! Выбор схемы смешивания звука для итогового видео
//!
//! Оригинальная дорожка никогда не подмешивается под озвучку или музыку:
//! если есть хотя бы одно из них, флаг `keep_original_audio` игнорируется.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{NarrationError, Result};

/// Схема смешивания
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MixTopology {
    /// Озвучка и музыка через amix, длительность по самой длинной
    NarrationAndSoundtrack,
    /// Только озвучка
    NarrationOnly,
    /// Только музыка
    SoundtrackOnly,
    /// Оригинальная дорожка без изменений
    OriginalPassthrough,
    /// Видео без звука
    Silent,
}

/// Какие источники звука есть и с какой громкостью
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixSources {
    pub has_narration: bool,
    pub has_soundtrack: bool,
    pub keep_original_audio: bool,
    pub narration_volume: f32,
    pub soundtrack_volume: f32,
}

/// Выбранная схема и громкости
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixPlan {
    pub topology: MixTopology,
    pub narration_volume: f32,
    pub soundtrack_volume: f32,
}

impl MixPlan {
    /// Выбрать схему смешивания
    pub fn select(sources: &MixSources) -> Self {
        let topology = match (
            sources.has_narration,
            sources.has_soundtrack,
            sources.keep_original_audio,
        ) {
            (true, true, _) => MixTopology::NarrationAndSoundtrack,
            (true, false, _) => MixTopology::NarrationOnly,
            (false, true, _) => MixTopology::SoundtrackOnly,
            (false, false, true) => MixTopology::OriginalPassthrough,
            (false, false, false) => MixTopology::Silent,
        };

        Self {
            topology,
            narration_volume: sources.narration_volume.clamp(0.0, 1.0),
            soundtrack_volume: sources.soundtrack_volume.clamp(0.0, 1.0),
        }
    }

    /// Длительность смешанной дорожки до обрезки по длительности видео
    pub fn mixed_duration(
        &self,
        narration: Option<f64>,
        soundtrack: Option<f64>,
        original: Option<f64>,
    ) -> Option<f64> {
        match self.topology {
            MixTopology::NarrationAndSoundtrack => match (narration, soundtrack) {
                (Some(n), Some(s)) => Some(n.max(s)),
                (n, s) => n.or(s),
            },
            MixTopology::NarrationOnly => narration,
            MixTopology::SoundtrackOnly => soundtrack,
            MixTopology::OriginalPassthrough => original,
            MixTopology::Silent => None,
        }
    }

    /// Граф фильтров ffmpeg; входы нумеруются с 1, вход 0 - видео
    fn filter_graph(&self) -> Option<String> {
        match self.topology {
            MixTopology::NarrationAndSoundtrack => Some(format!(
                "[1:a]volume={:.2}[a1];[2:a]volume={:.2}[a2];[a1][a2]amix=inputs=2:duration=longest:normalize=0[aout]",
                self.narration_volume, self.soundtrack_volume
            )),
            MixTopology::NarrationOnly => Some(format!("[1:a]volume={:.2}[aout]", self.narration_volume)),
            MixTopology::SoundtrackOnly => Some(format!("[1:a]volume={:.2}[aout]", self.soundtrack_volume)),
            MixTopology::OriginalPassthrough | MixTopology::Silent => None,
        }
    }
}

/// Всё, что нужно для сборки итогового видео
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyPlan {
    pub mix: MixPlan,
    pub video: PathBuf,
    pub narration: Option<PathBuf>,
    pub soundtrack: Option<PathBuf>,
    pub output: PathBuf,
    /// Итоговая длительность видео, при любой схеме
    pub duration_cap: f64,
}

impl AssemblyPlan {
    /// Собрать план; наличие источников определяется переданными путями
    pub fn new(
        video: impl Into<PathBuf>,
        narration: Option<PathBuf>,
        soundtrack: Option<PathBuf>,
        output: impl Into<PathBuf>,
        keep_original_audio: bool,
        narration_volume: f32,
        soundtrack_volume: f32,
        duration_cap: f64,
    ) -> Result<Self> {
        if !(duration_cap.is_finite() && duration_cap > 0.0) {
            return Err(NarrationError::InvalidInput(format!(
                "duration cap must be positive, got {}",
                duration_cap
            )));
        }

        let mix = MixPlan::select(&MixSources {
            has_narration: narration.is_some(),
            has_soundtrack: soundtrack.is_some(),
            keep_original_audio,
            narration_volume,
            soundtrack_volume,
        });
        log::info!("Selected mix topology {:?}", mix.topology);

        Ok(Self {
            mix,
            video: video.into(),
            narration,
            soundtrack,
            output: output.into(),
            duration_cap,
        })
    }

    /// Аргументы ffmpeg для сборки
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec!["-i".to_string(), self.video.to_string_lossy().to_string()];

        let audio_inputs: Vec<&PathBuf> = match self.mix.topology {
            MixTopology::NarrationAndSoundtrack => self.narration.iter().chain(self.soundtrack.iter()).collect(),
            MixTopology::NarrationOnly => self.narration.iter().collect(),
            MixTopology::SoundtrackOnly => self.soundtrack.iter().collect(),
            MixTopology::OriginalPassthrough | MixTopology::Silent => Vec::new(),
        };
        for input in audio_inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().to_string());
        }

        args.extend(["-map".to_string(), "0:v:0".to_string()]);
        match self.mix.filter_graph() {
            Some(graph) => {
                args.extend([
                    "-filter_complex".to_string(),
                    graph,
                    "-map".to_string(),
                    "[aout]".to_string(),
                    "-c:a".to_string(),
                    "aac".to_string(),
                    "-b:a".to_string(),
                    "192k".to_string(),
                ]);
            }
            None if self.mix.topology == MixTopology::OriginalPassthrough => {
                args.extend([
                    "-map".to_string(),
                    "0:a?".to_string(),
                    "-c:a".to_string(),
                    "copy".to_string(),
                ]);
            }
            None => args.push("-an".to_string()),
        }

        args.extend([
            "-c:v".to_string(),
            "copy".to_string(),
            "-t".to_string(),
            format!("{:.3}", self.duration_cap),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-y".to_string(),
            self.output.to_string_lossy().to_string(),
        ]);
        args
    }
}
