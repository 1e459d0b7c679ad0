//! Модуль для интеграции с OpenAI speech API

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::{NarrationConfig, ProviderKind, TtsModel};
use crate::error::{NarrationError, Result};
use crate::tts::{write_audio_response, SpeechProvider};

/// Провайдер OpenAI `/audio/speech`
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: TtsModel,
    max_chars: usize,
}

impl OpenAiProvider {
    pub fn new(config: &NarrationConfig) -> Result<Self> {
        if config.openai_api_key.trim().is_empty() {
            log::error!("OpenAI API key is empty");
            return Err(NarrationError::Configuration(
                "OpenAI API key is required for TTS generation".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.tts_model.clone(),
            max_chars: config.openai_max_chars,
        })
    }

    fn request_body(&self, text: &str, voice_id: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model.as_str(),
            "voice": voice_id,
            "input": text,
            "response_format": "mp3"
        })
    }
}

#[async_trait]
impl SpeechProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn max_chars(&self) -> usize {
        self.max_chars
    }

    fn model(&self) -> &str {
        self.model.as_str()
    }

    async fn synthesize(&self, text: &str, voice_id: &str, output: &Path) -> Result<()> {
        log::info!("Sending TTS request to OpenAI API (model {}, voice {})", self.model.as_str(), voice_id);

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(text, voice_id))
            .send()
            .await?;

        write_audio_response(ProviderKind::OpenAi.as_str(), response, output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::testing::serve_once;

    fn config(base_url: &str) -> NarrationConfig {
        NarrationConfig {
            openai_api_key: "sk-test".to_string(),
            openai_base_url: base_url.to_string(),
            ..NarrationConfig::default()
        }
    }

    #[test]
    fn requires_api_key() {
        assert!(matches!(
            OpenAiProvider::new(&NarrationConfig::default()),
            Err(NarrationError::Configuration(_))
        ));
    }

    #[test]
    fn request_body_has_expected_fields() {
        let provider = OpenAiProvider::new(&NarrationConfig {
            tts_model: TtsModel::HighDefinition,
            ..config("https://api.openai.com/v1/")
        })
        .unwrap();
        let body = provider.request_body("Hello.", "nova");
        assert_eq!(body["model"], "tts-1-hd");
        assert_eq!(body["voice"], "nova");
        assert_eq!(body["input"], "Hello.");
        assert_eq!(body["response_format"], "mp3");
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
        assert_eq!(provider.max_chars(), 4096);
    }

    #[tokio::test]
    async fn saves_audio_body() {
        let (url, request) = serve_once(200, b"ID3-audio-bytes").await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("speech.mp3");

        let provider = OpenAiProvider::new(&config(&url)).unwrap();
        provider.synthesize("Hello.", "alloy", &output).await.unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"ID3-audio-bytes");
        let sent: serde_json::Value = serde_json::from_str(&request.await.unwrap()).unwrap();
        assert_eq!(sent["voice"], "alloy");
    }

    #[tokio::test]
    async fn non_success_status_is_provider_error() {
        let (url, _request) = serve_once(429, b"rate limited").await;
        let dir = tempfile::tempdir().unwrap();

        let provider = OpenAiProvider::new(&config(&url)).unwrap();
        let result = provider.synthesize("Hello.", "alloy", &dir.path().join("s.mp3")).await;

        match result {
            Err(NarrationError::Provider { provider, status, body }) => {
                assert_eq!(provider, "openai");
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
