//! Модуль для работы с TTS
//!
//! Провайдеры синтеза речи, бюджет слов и цепочка провайдеров с
//! переключением на следующий при сбое.

pub mod cache;
pub mod http;
pub mod openai;

#[cfg(test)]
pub(crate) mod testing;

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;

use crate::config::{NarrationConfig, ProviderKind, VoiceSpec};
use crate::error::{NarrationError, Result};
use crate::media::AudioAsset;

pub use cache::TtsCache;
pub use http::HttpProvider;
pub use openai::OpenAiProvider;

/// Провайдер синтеза речи
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Жёсткий лимит символов на один запрос
    fn max_chars(&self) -> usize;

    /// Идентификатор модели, входит в ключ кэша
    fn model(&self) -> &str {
        ""
    }

    /// Синтезировать `text` голосом `voice_id` в файл `output`
    async fn synthesize(&self, text: &str, voice_id: &str, output: &Path) -> Result<()>;
}

/// Бюджет слов: `floor(длительность × скорость × запас)`
pub fn word_budget(target_duration_secs: f64, words_per_second: f64, buffer_factor: f64) -> usize {
    let budget = (target_duration_secs * words_per_second * buffer_factor).floor();
    if budget.is_finite() && budget > 0.0 {
        budget as usize
    } else {
        0
    }
}

/// Бюджет слов для голоса с запасом по настройкам
pub fn target_word_count(config: &NarrationConfig, target_duration_secs: f64, voice: &VoiceSpec) -> usize {
    word_budget(
        target_duration_secs,
        voice.speaking_rate_wps,
        config.buffer_factor(target_duration_secs),
    )
}

/// Обрезать текст до `max_chars` символов.
///
/// Предпочтительно по последней границе предложения в пределах лимита,
/// иначе по границе слова.
pub fn truncate_to_chars(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let window = &text[..cut];
    let rest = &text[cut..];

    let sentence_end = window
        .char_indices()
        .filter(|(_, c)| matches!(*c, '.' | '!' | '?'))
        .filter(|(i, c)| text[*i + c.len_utf8()..].starts_with(char::is_whitespace))
        .map(|(i, c)| i + c.len_utf8())
        .last();
    if let Some(end) = sentence_end {
        return window[..end].to_string();
    }

    if rest.starts_with(char::is_whitespace) {
        return window.trim_end().to_string();
    }
    match window.rfind(char::is_whitespace) {
        Some(pos) => window[..pos].trim_end().to_string(),
        None => window.to_string(),
    }
}

/// Записать успешный ответ провайдера в файл или вернуть `Provider`-ошибку
pub(crate) async fn write_audio_response(
    provider: &str,
    response: reqwest::Response,
    output: &Path,
) -> Result<()> {
    let status = response.status();
    if !status.is_success() {
        let body = match response.text().await {
            Ok(text) => text,
            Err(e) => format!("Failed to read error response: {}", e),
        };
        log::error!("{} API error (status {}): {}", provider, status, body);
        return Err(NarrationError::Provider {
            provider: provider.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    let mut file = tokio::fs::File::create(output).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len();
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    if written == 0 {
        return Err(NarrationError::Provider {
            provider: provider.to_string(),
            status: status.as_u16(),
            body: "empty audio response".to_string(),
        });
    }

    info!("Saved {} bytes of {} audio to {}", written, provider, output.display());
    Ok(())
}

/// Результат синтеза: файл, голос и фактически озвученный текст
#[derive(Debug, Clone)]
pub struct SynthesizedSpeech {
    pub asset: AudioAsset,
    pub voice: VoiceSpec,
    pub text: String,
}

/// Упорядоченная цепочка провайдеров
#[derive(Default)]
pub struct ProviderChain {
    providers: Vec<Box<dyn SpeechProvider>>,
    cache: Option<TtsCache>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Собрать цепочку из настроек: OpenAI, затем HTTP-провайдер
    pub fn from_config(config: &NarrationConfig) -> Result<Self> {
        let mut chain = Self::new();

        if !config.openai_api_key.trim().is_empty() {
            chain = chain.with_provider(Box::new(OpenAiProvider::new(config)?));
        }
        if let Some(http) = config.http_provider.as_ref() {
            if !http.endpoint.trim().is_empty() {
                chain = chain.with_provider(Box::new(HttpProvider::new(http, config.http_timeout_secs)?));
            }
        }
        if chain.providers.is_empty() {
            return Err(NarrationError::Configuration(
                "No speech provider configured: set an OpenAI API key or an HTTP endpoint".to_string(),
            ));
        }

        if config.use_cache {
            chain = chain.with_cache(TtsCache::new(config)?);
        }
        Ok(chain)
    }

    pub fn with_provider(mut self, provider: Box<dyn SpeechProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_cache(mut self, cache: TtsCache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn provider(&self, kind: ProviderKind) -> Option<&dyn SpeechProvider> {
        self.providers
            .iter()
            .find(|provider| provider.kind() == kind)
            .map(|provider| provider.as_ref())
    }

    /// Синтезировать текст одним голосом.
    ///
    /// Текст обрезается до лимита провайдера (и `max_output_chars`, если задан).
    /// Повторных попыток нет: ошибка провайдера возвращается как есть.
    pub async fn synthesize(
        &self,
        script: &str,
        voice: &VoiceSpec,
        max_output_chars: Option<usize>,
        output: &Path,
    ) -> Result<SynthesizedSpeech> {
        let script = script.trim();
        if script.is_empty() {
            return Err(NarrationError::InvalidInput("Nothing to synthesize".to_string()));
        }

        let provider = self.provider(voice.provider).ok_or_else(|| {
            NarrationError::Configuration(format!("Provider {} is not configured", voice.provider.as_str()))
        })?;

        let limit = max_output_chars
            .map(|limit| limit.min(provider.max_chars()))
            .unwrap_or_else(|| provider.max_chars());
        let text = truncate_to_chars(script, limit);
        if text.len() < script.len() {
            warn!(
                "Script truncated from {} to {} chars for provider {}",
                script.chars().count(),
                text.chars().count(),
                voice.provider.as_str()
            );
        }

        let key = TtsCache::key(voice.provider.as_str(), &voice.voice_id, provider.model(), &text);
        let cached = match self.cache.as_ref() {
            Some(cache) => cache.get(&key).await,
            None => None,
        };
        if let Some(cached) = cached {
            tokio::fs::copy(&cached, output).await?;
            info!("Using cached speech {} for voice {}", cached.display(), voice.voice_id);
        } else {
            info!(
                "Synthesizing {} words with {} voice {}",
                crate::transcript::word_count(&text),
                voice.provider.as_str(),
                voice.voice_id
            );
            provider.synthesize(&text, &voice.voice_id, output).await?;

            if let Some(cache) = self.cache.as_ref() {
                if let Err(e) = cache.store(&key, output).await {
                    warn!("Failed to cache speech {}: {}", output.display(), e);
                }
            }
        }

        Ok(SynthesizedSpeech {
            asset: AudioAsset::new(output),
            voice: voice.clone(),
            text,
        })
    }

    /// Перебрать голоса по порядку, пока один из провайдеров не ответит.
    ///
    /// К следующему голосу переходим только при сбое провайдера;
    /// прочие ошибки возвращаются сразу.
    pub async fn synthesize_with_fallback(
        &self,
        script: &str,
        voices: &[VoiceSpec],
        output: &Path,
    ) -> Result<SynthesizedSpeech> {
        let mut last_error = None;

        for voice in voices {
            if self.provider(voice.provider).is_none() {
                warn!(
                    "Skipping voice {}: provider {} is not configured",
                    voice.voice_id,
                    voice.provider.as_str()
                );
                continue;
            }

            match self.synthesize(script, voice, None, output).await {
                Ok(speech) => return Ok(speech),
                Err(e) if e.is_provider_failure() => {
                    warn!(
                        "Provider {} failed for voice {}, trying next: {}",
                        voice.provider.as_str(),
                        voice.voice_id,
                        e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        debug!("All {} voices exhausted", voices.len());
        Err(last_error.unwrap_or_else(|| {
            NarrationError::Configuration("No configured provider for any requested voice".to_string())
        }))
    }
}
