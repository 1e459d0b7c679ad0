//! Поддельный `MediaToolkit` для тестов: длительности считаются, а не измеряются

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{NarrationError, Result};
use crate::media::mix::AssemblyPlan;
use crate::media::toolkit::{AudioOp, MediaToolkit};

pub(crate) struct FakeToolkit {
    durations: Mutex<HashMap<PathBuf, f64>>,
    ops: Mutex<Vec<AudioOp>>,
    assemblies: Mutex<Vec<Vec<String>>>,
    /// Погрешность кодека, добавляемая к каждому перекодированию
    encoder_drift: f64,
    /// Сколько перекодирований ещё получат погрешность (`None` - все)
    drift_remaining: Mutex<Option<u32>>,
    fail_transforms: bool,
    fail_copies: bool,
    timeout_transforms: bool,
    /// Длительность файлов, о которых ничего не известно (например, от TTS)
    default_duration: Option<f64>,
    fail_probes: bool,
}

impl FakeToolkit {
    pub(crate) fn new() -> Self {
        Self {
            durations: Mutex::new(HashMap::new()),
            ops: Mutex::new(Vec::new()),
            assemblies: Mutex::new(Vec::new()),
            encoder_drift: 0.0,
            drift_remaining: Mutex::new(None),
            fail_transforms: false,
            fail_copies: false,
            timeout_transforms: false,
            default_duration: None,
            fail_probes: false,
        }
    }

    pub(crate) fn with_drift(mut self, seconds: f64) -> Self {
        self.encoder_drift = seconds;
        self
    }

    pub(crate) fn drift_limited_to(self, ops: u32) -> Self {
        *self.drift_remaining.lock() = Some(ops);
        self
    }

    pub(crate) fn failing_transforms(mut self) -> Self {
        self.fail_transforms = true;
        self
    }

    pub(crate) fn failing_copies(mut self) -> Self {
        self.fail_copies = true;
        self
    }

    pub(crate) fn timing_out(mut self) -> Self {
        self.timeout_transforms = true;
        self
    }

    pub(crate) fn with_default_duration(mut self, seconds: f64) -> Self {
        self.default_duration = Some(seconds);
        self
    }

    pub(crate) fn failing_probes(mut self) -> Self {
        self.fail_probes = true;
        self
    }

    pub(crate) fn set_duration(&self, path: impl AsRef<Path>, seconds: f64) {
        self.durations.lock().insert(path.as_ref().to_path_buf(), seconds);
    }

    pub(crate) fn duration_of(&self, path: impl AsRef<Path>) -> Option<f64> {
        self.durations
            .lock()
            .get(path.as_ref())
            .copied()
            .or(self.default_duration)
    }

    pub(crate) fn ops(&self) -> Vec<AudioOp> {
        self.ops.lock().clone()
    }

    pub(crate) fn assemblies(&self) -> Vec<Vec<String>> {
        self.assemblies.lock().clone()
    }

    fn next_drift(&self) -> f64 {
        let mut remaining = self.drift_remaining.lock();
        match remaining.as_mut() {
            None => self.encoder_drift,
            Some(0) => 0.0,
            Some(n) => {
                *n -= 1;
                self.encoder_drift
            }
        }
    }

    fn input_duration(&self, input: &Path) -> Result<f64> {
        self.duration_of(input)
            .ok_or_else(|| NarrationError::FileNotFound(input.display().to_string()))
    }
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn probe_duration(&self, path: &Path) -> Option<f64> {
        if self.fail_probes {
            return None;
        }
        self.duration_of(path)
    }

    async fn run(&self, op: &AudioOp) -> Result<()> {
        self.ops.lock().push(op.clone());

        match op {
            AudioOp::Copy { input, output } => {
                if self.fail_copies {
                    return Err(NarrationError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "disk full",
                    )));
                }
                let duration = self.input_duration(input)?;
                self.set_duration(output, duration);
            }
            AudioOp::Tempo { input, output, stages } => {
                if self.timeout_transforms {
                    return Err(NarrationError::Timeout {
                        tool: "ffmpeg".to_string(),
                        seconds: 300,
                    });
                }
                if self.fail_transforms {
                    return Err(NarrationError::Transform("atempo rejected input".to_string()));
                }
                let product: f64 = stages.iter().product();
                let duration = self.input_duration(input)? / product + self.next_drift();
                self.set_duration(output, duration);
            }
            AudioOp::PadSilence {
                input,
                output,
                silence_secs,
            } => {
                if self.fail_transforms {
                    return Err(NarrationError::Transform("apad rejected input".to_string()));
                }
                let duration = self.input_duration(input)? + silence_secs + self.next_drift();
                self.set_duration(output, duration);
            }
        }
        Ok(())
    }

    async fn assemble(&self, plan: &AssemblyPlan) -> Result<()> {
        self.assemblies.lock().push(plan.ffmpeg_args());
        self.set_duration(&plan.output, plan.duration_cap);
        Ok(())
    }
}
