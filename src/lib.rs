//! Основной файл библиотеки narration-sync
//!
//! Библиотека готовит озвучку для производного видео: сокращает транскрипт
//! до бюджета слов, синтезирует речь, подгоняет её длительность под видео
//! и планирует сведение звука при финальной сборке.

pub mod config;
pub mod error;
pub mod logger;
pub mod media;
pub mod text;
pub mod transcript;
pub mod tts;
pub mod utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use log::{debug, info, warn};

pub use crate::config::{NarrationConfig, ProviderKind, VoiceSpec};
pub use crate::error::{NarrationError, Result};
pub use crate::media::{AssemblyPlan, AudioAsset, DurationMatcher, DurationTarget, MediaToolkit, MixTopology};
pub use crate::text::TextDistiller;
pub use crate::transcript::{Transcript, TranscriptSegment};
pub use crate::tts::{ProviderChain, SpeechProvider};

use crate::media::{AudioOp, DurationState, FfmpegToolkit};
use crate::text::OpenAiSummarizer;
use crate::utils::temp::RunWorkspace;

/// Запрос на озвучку одного видео
#[derive(Debug, Clone)]
pub struct NarrationRequest {
    pub transcript: Transcript,
    pub target: DurationTarget,
    /// Основной голос; по его скорости считается бюджет слов
    pub voice: VoiceSpec,
    /// Голоса на случай сбоя основного провайдера, по порядку
    pub fallback_voices: Vec<VoiceSpec>,
    pub output_path: PathBuf,
}

/// Результат озвучки
#[derive(Debug, Clone)]
pub struct NarrationResult {
    /// Озвученный текст
    pub script: String,
    pub word_budget: usize,
    pub target_duration: f64,
    /// Голос, которым в итоге озвучено
    pub voice: VoiceSpec,
    pub asset: AudioAsset,
}

/// Основная структура для работы с библиотекой
pub struct NarrationSync {
    config: Arc<NarrationConfig>,
    distiller: TextDistiller,
    providers: ProviderChain,
    toolkit: Arc<dyn MediaToolkit>,
    matcher: DurationMatcher,
}

impl NarrationSync {
    /// Создать экземпляр с провайдерами и ffmpeg по настройкам
    pub fn new(config: NarrationConfig) -> Result<Self> {
        config.validate()?;

        let distiller = if config.use_ai_summary {
            match OpenAiSummarizer::new(&config) {
                Ok(summarizer) => TextDistiller::with_summarizer(Box::new(summarizer)),
                Err(e) => {
                    warn!("AI summary disabled ({}), using rule-based distillation", e);
                    TextDistiller::new()
                }
            }
        } else {
            TextDistiller::new()
        };

        let providers = ProviderChain::from_config(&config)?;
        let toolkit: Arc<dyn MediaToolkit> = Arc::new(FfmpegToolkit::new(&config));

        Ok(Self::with_components(config, distiller, providers, toolkit))
    }

    /// Создать экземпляр из готовых компонентов
    pub fn with_components(
        config: NarrationConfig,
        distiller: TextDistiller,
        providers: ProviderChain,
        toolkit: Arc<dyn MediaToolkit>,
    ) -> Self {
        let matcher = DurationMatcher::new(toolkit.clone(), &config);
        Self {
            config: Arc::new(config),
            distiller,
            providers,
            toolkit,
            matcher,
        }
    }

    pub fn config(&self) -> &NarrationConfig {
        &self.config
    }

    /// Целевая длительность с долей озвучки из настроек
    pub fn target_for(&self, video_duration_secs: f64) -> Result<DurationTarget> {
        DurationTarget::new(video_duration_secs, self.config.narration_ratio)
    }

    /// Проверить, что ffmpeg доступен; возвращает строку версии
    pub async fn preflight(&self) -> Result<String> {
        if !utils::ffmpeg::check_ffmpeg_installed().await {
            return Err(NarrationError::Configuration("ffmpeg is not installed or not in PATH".to_string()));
        }
        utils::ffmpeg::get_ffmpeg_version().await
    }

    /// Сократить текст, синтезировать речь и подогнать её длительность
    pub async fn narrate(&self, request: &NarrationRequest) -> Result<NarrationResult> {
        let target_duration = request.target.narration_duration();
        info!(
            "Starting narration: video {:.3}s, ratio {:.2}, target {:.3}s",
            request.target.video_duration_secs, request.target.narration_ratio, target_duration
        );

        // 1. Бюджет слов
        let word_budget = tts::target_word_count(&self.config, target_duration, &request.voice);
        if word_budget == 0 {
            return Err(NarrationError::InvalidInput(format!(
                "Target duration {:.3}s is too short for any narration",
                target_duration
            )));
        }

        // 2. Сокращение текста
        let source = request.transcript.normalized_text();
        if source.is_empty() {
            return Err(NarrationError::InvalidInput("Transcript is empty".to_string()));
        }
        let script = self.distiller.distill(&source, word_budget).await;
        if script.trim().is_empty() {
            return Err(NarrationError::InvalidInput("Distilled script is empty".to_string()));
        }
        info!(
            "Distilled {} words to {} (budget {})",
            transcript::word_count(&source),
            transcript::word_count(&script),
            word_budget
        );

        // 3. Синтез речи
        let workspace = RunWorkspace::new(self.config.cleanup_temp_files)?;
        let speech_path = workspace.file("speech", "mp3");
        let mut voices = Vec::with_capacity(1 + request.fallback_voices.len());
        voices.push(request.voice.clone());
        voices.extend(request.fallback_voices.iter().cloned());
        let speech = self
            .providers
            .synthesize_with_fallback(&script, &voices, &speech_path)
            .await?;

        // 4. Проба и подгонка длительности
        let mut raw = speech.asset;
        let asset = match raw.ensure_duration(self.toolkit.as_ref()).await {
            Some(current) if current > 0.0 => {
                let matched_path = workspace.file("matched", "mp3");
                let matched = self
                    .matcher
                    .match_duration(&raw, current, target_duration, &matched_path)
                    .await?;
                self.copy(&matched_path, &request.output_path).await?;
                AudioAsset {
                    path: request.output_path.clone(),
                    duration: matched.duration,
                }
            }
            measured => {
                warn!(
                    "Could not measure synthesized speech ({:?}), skipping duration matching",
                    measured
                );
                self.copy(raw.path(), &request.output_path).await?;
                AudioAsset {
                    path: request.output_path.clone(),
                    duration: DurationState::ProbeFailed,
                }
            }
        };

        workspace.finish()?;
        info!("Narration saved to {}", request.output_path.display());

        Ok(NarrationResult {
            script: speech.text,
            word_budget,
            target_duration,
            voice: speech.voice,
            asset,
        })
    }

    /// План финальной сборки с громкостями из настроек
    pub fn plan_assembly(
        &self,
        video: &Path,
        narration: Option<&AudioAsset>,
        soundtrack: Option<&Path>,
        output: &Path,
        video_duration_secs: f64,
    ) -> Result<AssemblyPlan> {
        AssemblyPlan::new(
            video,
            narration.map(|asset| asset.path().to_path_buf()),
            soundtrack.map(Path::to_path_buf),
            output,
            self.config.keep_original_audio,
            self.config.narration_volume,
            self.config.soundtrack_volume,
            video_duration_secs,
        )
    }

    /// Собрать итоговое видео
    pub async fn assemble(&self, plan: &AssemblyPlan) -> Result<()> {
        let narration = match &plan.narration {
            Some(path) => self.toolkit.probe_duration(path).await,
            None => None,
        };
        let soundtrack = match &plan.soundtrack {
            Some(path) => self.toolkit.probe_duration(path).await,
            None => None,
        };
        let original = if plan.mix.topology == MixTopology::OriginalPassthrough {
            self.toolkit.probe_duration(&plan.video).await
        } else {
            None
        };
        match plan.mix.mixed_duration(narration, soundtrack, original) {
            Some(mixed) if mixed > plan.duration_cap => info!(
                "Mixed audio {:.3}s will be cut to video length {:.3}s",
                mixed, plan.duration_cap
            ),
            Some(mixed) => debug!("Mixed audio duration {:.3}s", mixed),
            None => {}
        }

        info!(
            "Assembling {} ({:?}, capped at {:.3}s)",
            plan.output.display(),
            plan.mix.topology,
            plan.duration_cap
        );
        self.toolkit.assemble(plan).await
    }

    async fn copy(&self, input: &Path, output: &Path) -> Result<()> {
        self.toolkit
            .run(&AudioOp::Copy {
                input: input.to_path_buf(),
                output: output.to_path_buf(),
            })
            .await
    }
}

/// Озвучить транскрипт одним голосом с настройками из окружения
pub async fn narrate_transcript(
    config: NarrationConfig,
    transcript: Transcript,
    video_duration_secs: f64,
    voice_id: &str,
    output_path: impl AsRef<Path>,
) -> anyhow::Result<NarrationResult> {
    let config = config.with_env_overrides();
    let provider = if config.openai_api_key.trim().is_empty() {
        ProviderKind::Http
    } else {
        ProviderKind::OpenAi
    };
    let voice = config.voice_spec(provider, voice_id);

    let narration = NarrationSync::new(config).context("Failed to initialize narration-sync")?;
    let request = NarrationRequest {
        transcript,
        target: narration.target_for(video_duration_secs)?,
        voice,
        fallback_voices: Vec::new(),
        output_path: output_path.as_ref().to_path_buf(),
    };

    let result = narration.narrate(&request).await.context("Narration failed")?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::testing::FakeToolkit;
    use crate::tts::testing::FakeProvider;

    fn narrator() -> VoiceSpec {
        VoiceSpec {
            provider: ProviderKind::Http,
            voice_id: "narrator".to_string(),
            speaking_rate_wps: 2.5,
        }
    }

    fn pipeline(toolkit: Arc<FakeToolkit>, provider: FakeProvider) -> NarrationSync {
        NarrationSync::with_components(
            NarrationConfig::default(),
            TextDistiller::new(),
            ProviderChain::new().with_provider(Box::new(provider)),
            toolkit,
        )
    }

    fn request(text: &str, video_duration_secs: f64, output: &Path) -> NarrationRequest {
        NarrationRequest {
            transcript: Transcript::Plain(text.to_string()),
            target: DurationTarget::new(video_duration_secs, 0.93).unwrap(),
            voice: narrator(),
            fallback_voices: Vec::new(),
            output_path: output.to_path_buf(),
        }
    }

    fn op_kinds(toolkit: &FakeToolkit) -> Vec<&'static str> {
        toolkit
            .ops()
            .iter()
            .map(|op| match op {
                AudioOp::Copy { .. } => "copy",
                AudioOp::Tempo { .. } => "tempo",
                AudioOp::PadSilence { .. } => "pad",
            })
            .collect()
    }

    #[tokio::test]
    async fn short_speech_is_padded_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("narration.mp3");
        let toolkit = Arc::new(FakeToolkit::new().with_default_duration(10.0));
        let provider = FakeProvider::new(ProviderKind::Http);
        let calls = provider.calls();
        let narration = pipeline(toolkit.clone(), provider);

        let result = narration
            .narrate(&request(
                "<b>Hello</b> there. [Music] This is a short video. It ends here.",
                30.0,
                &output,
            ))
            .await
            .unwrap();

        assert_eq!(result.script, "Hello there. This is a short video. It ends here.");
        assert_eq!(result.word_budget, 68);
        assert!((result.target_duration - 27.9).abs() < 1e-9);
        assert_eq!(result.asset.path, output);
        assert!((result.asset.known_duration().unwrap() - 27.9).abs() < 1e-6);
        assert_eq!(op_kinds(&toolkit), vec!["pad", "tempo", "copy"]);
        assert_eq!(calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn long_transcript_is_distilled_to_budget() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = Arc::new(FakeToolkit::new().with_default_duration(3.72));
        let provider = FakeProvider::new(ProviderKind::Http);
        let calls = provider.calls();
        let narration = pipeline(toolkit.clone(), provider);

        let source = "One two three. Four five six. Seven eight nine. Ten eleven twelve.";
        let result = narration
            .narrate(&request(source, 4.0, &dir.path().join("n.mp3")))
            .await
            .unwrap();

        assert_eq!(result.word_budget, 8);
        assert!(transcript::word_count(&result.script) <= 8);
        assert!(text::distiller::ends_with_terminal(&result.script));
        assert_eq!(calls.lock()[0].1, result.script);
        assert_eq!(op_kinds(&toolkit), vec!["copy", "copy"]);
    }

    #[tokio::test]
    async fn unmeasurable_speech_is_shipped_unadjusted() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = Arc::new(FakeToolkit::new().with_default_duration(10.0).failing_probes());
        let narration = pipeline(toolkit.clone(), FakeProvider::new(ProviderKind::Http));

        let result = narration
            .narrate(&request("Just one sentence.", 30.0, &dir.path().join("n.mp3")))
            .await
            .unwrap();

        assert_eq!(result.asset.duration, DurationState::ProbeFailed);
        assert_eq!(op_kinds(&toolkit), vec!["copy"]);
    }

    #[tokio::test]
    async fn provider_failure_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = Arc::new(FakeToolkit::new().with_default_duration(10.0));
        let narration = pipeline(toolkit.clone(), FakeProvider::new(ProviderKind::Http).failing_with(503));

        let result = narration
            .narrate(&request("Just one sentence.", 30.0, &dir.path().join("n.mp3")))
            .await;

        assert!(matches!(result, Err(NarrationError::Provider { status: 503, .. })));
        assert!(toolkit.ops().is_empty());
    }

    #[tokio::test]
    async fn rejects_empty_transcript_and_tiny_target() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = Arc::new(FakeToolkit::new().with_default_duration(10.0));
        let narration = pipeline(toolkit, FakeProvider::new(ProviderKind::Http));

        let empty = narration
            .narrate(&request("[Music] [Applause]", 30.0, &dir.path().join("a.mp3")))
            .await;
        assert!(matches!(empty, Err(NarrationError::InvalidInput(_))));

        let tiny = narration
            .narrate(&request("Hello there.", 0.1, &dir.path().join("b.mp3")))
            .await;
        assert!(matches!(tiny, Err(NarrationError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn assembly_uses_configured_volumes() {
        let toolkit = Arc::new(FakeToolkit::new());
        let narration = pipeline(toolkit.clone(), FakeProvider::new(ProviderKind::Http));
        let speech = AudioAsset::with_duration("narration.mp3", 27.9);

        let plan = narration
            .plan_assembly(
                Path::new("video.mp4"),
                Some(&speech),
                Some(Path::new("music.mp3")),
                Path::new("final.mp4"),
                30.0,
            )
            .unwrap();
        assert_eq!(plan.mix.topology, MixTopology::NarrationAndSoundtrack);

        narration.assemble(&plan).await.unwrap();
        let args = toolkit.assemblies()[0].join(" ");
        assert!(args.contains("[1:a]volume=1.00[a1];[2:a]volume=0.30[a2]"));
        assert!(args.contains("amix=inputs=2:duration=longest:normalize=0[aout]"));
        assert!(args.contains("-t 30.000"));
        assert_eq!(toolkit.duration_of("final.mp4"), Some(30.0));
    }

    #[test]
    fn target_uses_configured_ratio() {
        let narration = pipeline(Arc::new(FakeToolkit::new()), FakeProvider::new(ProviderKind::Http));
        let target = narration.target_for(100.0).unwrap();
        assert!((target.narration_duration() - 93.0).abs() < 1e-9);
        assert!(narration.target_for(0.0).is_err());
    }
}
