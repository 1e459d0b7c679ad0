//! Произвольный HTTP-сервис синтеза речи
//!
//! `POST {endpoint}` с телом `{text, voice, format}`, ответ - аудио.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::{HttpProviderConfig, ProviderKind};
use crate::error::{NarrationError, Result};
use crate::tts::{write_audio_response, SpeechProvider};

pub struct HttpProvider {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    format: String,
    max_chars: usize,
}

impl HttpProvider {
    pub fn new(config: &HttpProviderConfig, timeout_secs: u64) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(NarrationError::Configuration(
                "HTTP speech provider endpoint is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone().filter(|key| !key.trim().is_empty()),
            format: config.format.clone(),
            max_chars: config.max_chars,
        })
    }
}

#[async_trait]
impl SpeechProvider for HttpProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Http
    }

    fn max_chars(&self) -> usize {
        self.max_chars
    }

    async fn synthesize(&self, text: &str, voice_id: &str, output: &Path) -> Result<()> {
        log::info!("Sending TTS request to {} (voice {})", self.endpoint, voice_id);

        let mut request = self.client.post(&self.endpoint).json(&serde_json::json!({
            "text": text,
            "voice": voice_id,
            "format": self.format,
        }));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        write_audio_response(ProviderKind::Http.as_str(), response, output).await
    }
}
