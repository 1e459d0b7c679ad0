//! Сокращение текста через языковую модель OpenAI
//!
//! Используется как необязательная замена алгоритмическому сокращению;
//! вызывающая сторона обязана уметь обойтись без него.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::NarrationConfig;
use crate::error::{NarrationError, Result};

/// Сокращение текста до заданного количества слов
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str, target_words: usize) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Клиент chat completions
pub struct OpenAiSummarizer {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiSummarizer {
    pub fn new(config: &NarrationConfig) -> Result<Self> {
        if config.openai_api_key.trim().is_empty() {
            return Err(NarrationError::Configuration(
                "OpenAI API key is required for AI summaries".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.summarizer_model.clone(),
        })
    }

    fn prompt(target_words: usize) -> String {
        format!(
            "Summarize the following video transcript as a narration script of at most {} words. \
             Use complete sentences, cover the beginning, middle and end, and reply with the script only.",
            target_words
        )
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, text: &str, target_words: usize) -> Result<String> {
        log::debug!("Requesting AI summary ({} words) with model {}", target_words, self.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "temperature": 0.3,
                "messages": [
                    { "role": "system", "content": Self::prompt(target_words) },
                    { "role": "user", "content": text }
                ]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = match response.text().await {
                Ok(text) => text,
                Err(e) => format!("Failed to read error response: {}", e),
            };
            return Err(NarrationError::Provider {
                provider: "openai-chat".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| NarrationError::Other("AI summary response has no content".to_string()))
    }
}
