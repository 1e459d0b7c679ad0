//! Модуль для работы с аудио
//!
//! Проба длительности, подгонка темпа и сборка итоговой звуковой дорожки.

pub mod mix;
pub mod probe;
pub mod tempo;
pub mod toolkit;

#[cfg(test)]
pub(crate) mod testing;

use std::path::{Path, PathBuf};

pub use mix::{AssemblyPlan, MixPlan, MixSources, MixTopology};
pub use tempo::{DurationMatcher, DurationTarget, TempoPlan};
pub use toolkit::{AudioOp, FfmpegToolkit, MediaToolkit};

/// Известна ли длительность аудио
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DurationState {
    /// Ещё не измерялась
    Unknown,
    /// Измерена, в секундах
    Known(f64),
    /// Проба не удалась
    ProbeFailed,
}

/// Аудиофайл и его длительность
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAsset {
    pub path: PathBuf,
    pub duration: DurationState,
}

impl AudioAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            duration: DurationState::Unknown,
        }
    }

    pub fn with_duration(path: impl Into<PathBuf>, seconds: f64) -> Self {
        Self {
            path: path.into(),
            duration: DurationState::Known(seconds),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn known_duration(&self) -> Option<f64> {
        match self.duration {
            DurationState::Known(seconds) => Some(seconds),
            _ => None,
        }
    }

    /// Измерить длительность, если она ещё неизвестна
    pub async fn ensure_duration(&mut self, toolkit: &dyn MediaToolkit) -> Option<f64> {
        if let DurationState::Known(seconds) = self.duration {
            return Some(seconds);
        }
        self.duration = match toolkit.probe_duration(&self.path).await {
            Some(seconds) => DurationState::Known(seconds),
            None => DurationState::ProbeFailed,
        };
        self.known_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeToolkit;
    use super::*;

    #[tokio::test]
    async fn ensure_duration_probes_once() {
        let toolkit = FakeToolkit::new();
        toolkit.set_duration("a.mp3", 12.5);

        let mut asset = AudioAsset::new("a.mp3");
        assert_eq!(asset.ensure_duration(&toolkit).await, Some(12.5));
        assert_eq!(asset.duration, DurationState::Known(12.5));

        toolkit.set_duration("a.mp3", 99.0);
        assert_eq!(asset.ensure_duration(&toolkit).await, Some(12.5));
    }

    #[tokio::test]
    async fn failed_probe_is_explicit() {
        let toolkit = FakeToolkit::new();
        let mut asset = AudioAsset::new("missing.mp3");
        assert_eq!(asset.ensure_duration(&toolkit).await, None);
        assert_eq!(asset.duration, DurationState::ProbeFailed);
    }
}
