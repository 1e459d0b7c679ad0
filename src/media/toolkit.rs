//! Граница между алгоритмами и внешними ffmpeg/ffprobe
//!
//! Алгоритмы формируют типизированные операции `AudioOp`, а `MediaToolkit`
//! их исполняет. Благодаря этому планы подгонки проверяются без ffmpeg.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::info;

use crate::config::NarrationConfig;
use crate::error::{NarrationError, Result};
use crate::media::mix::AssemblyPlan;
use crate::media::probe;
use crate::utils::ffmpeg::run_ffmpeg_command;

/// Кодек для промежуточных файлов озвучки
pub const NARRATION_CODEC: &str = "libmp3lame";

/// Качество VBR для озвучки (щадящее при повторном перекодировании)
pub const NARRATION_QUALITY: &str = "2";

/// Операция над аудиофайлом
#[derive(Debug, Clone, PartialEq)]
pub enum AudioOp {
    /// Побайтовое копирование без перекодирования
    Copy { input: PathBuf, output: PathBuf },
    /// Цепочка atempo, по одному фильтру на ступень
    Tempo {
        input: PathBuf,
        output: PathBuf,
        stages: Vec<f64>,
    },
    /// Дописать в конец тишину заданной длительности
    PadSilence {
        input: PathBuf,
        output: PathBuf,
        silence_secs: f64,
    },
}

impl AudioOp {
    /// Аргументы ffmpeg; для копирования ffmpeg не нужен
    pub fn ffmpeg_args(&self) -> Option<Vec<String>> {
        let (input, output, filter) = match self {
            Self::Copy { .. } => return None,
            Self::Tempo { input, output, stages } => (input, output, atempo_filter(stages)),
            Self::PadSilence {
                input,
                output,
                silence_secs,
            } => (input, output, format!("apad=pad_dur={:.6}", silence_secs)),
        };

        Some(vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-filter:a".to_string(),
            filter,
            "-c:a".to_string(),
            NARRATION_CODEC.to_string(),
            "-q:a".to_string(),
            NARRATION_QUALITY.to_string(),
            "-y".to_string(),
            output.to_string_lossy().to_string(),
        ])
    }
}

/// `atempo=a,atempo=b,...`; шесть знаков, чтобы округление не накапливалось по ступеням
pub fn atempo_filter(stages: &[f64]) -> String {
    stages
        .iter()
        .map(|factor| format!("atempo={:.6}", factor))
        .collect::<Vec<_>>()
        .join(",")
}

/// Внешние медиаинструменты
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Длительность в секундах или `None`, если её не удалось получить
    async fn probe_duration(&self, path: &Path) -> Option<f64>;

    /// Выполнить операцию над аудио
    async fn run(&self, op: &AudioOp) -> Result<()>;

    /// Собрать итоговое видео
    async fn assemble(&self, plan: &AssemblyPlan) -> Result<()>;
}

/// Реализация через ffmpeg/ffprobe из PATH
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    transform_timeout_secs: u64,
    probe_timeout_secs: u64,
}

impl FfmpegToolkit {
    pub fn new(config: &NarrationConfig) -> Self {
        Self {
            transform_timeout_secs: config.transform_timeout_secs,
            probe_timeout_secs: config.probe_timeout_secs,
        }
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe_duration(&self, path: &Path) -> Option<f64> {
        probe::probe_duration(path, self.probe_timeout_secs).await
    }

    async fn run(&self, op: &AudioOp) -> Result<()> {
        match op {
            AudioOp::Copy { input, output } => {
                if !tokio::fs::try_exists(input).await.unwrap_or(false) {
                    return Err(NarrationError::FileNotFound(input.display().to_string()));
                }
                tokio::fs::copy(input, output).await?;
                info!("Copied {} to {}", input.display(), output.display());
                Ok(())
            }
            _ => {
                let args = op
                    .ffmpeg_args()
                    .ok_or_else(|| NarrationError::Other("Operation has no ffmpeg form".to_string()))?;
                run_ffmpeg_command(&args, self.transform_timeout_secs).await
            }
        }
    }

    async fn assemble(&self, plan: &AssemblyPlan) -> Result<()> {
        run_ffmpeg_command(&plan.ffmpeg_args(), self.transform_timeout_secs).await
    }
}
