//! Модуль обработки ошибок библиотеки narration-sync
//!
//! Ошибки пробы длительности сюда не входят: проба возвращает `Option<f64>`
//! и никогда не падает.

use thiserror::Error;

/// Ошибки библиотеки narration-sync
#[derive(Debug, Error)]
pub enum NarrationError {
    /// Провайдер синтеза речи ответил ошибкой
    #[error("Provider {provider} failed with status {status}: {body}")]
    Provider {
        provider: String,
        status: u16,
        body: String,
    },

    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ffmpeg завершился с ошибкой
    #[error("Transform error: {0}")]
    Transform(String),

    /// Внешний процесс превысил лимит времени и был остановлен
    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Файл не найден
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Неверные входные данные
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(String),
}

impl NarrationError {
    /// Ошибка, после которой имеет смысл попробовать следующего провайдера
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Http(_) | Self::Timeout { .. })
    }
}

impl From<&str> for NarrationError {
    fn from(s: &str) -> Self {
        NarrationError::Other(s.to_string())
    }
}

impl From<String> for NarrationError {
    fn from(s: String) -> Self {
        NarrationError::Other(s)
    }
}

impl From<anyhow::Error> for NarrationError {
    fn from(err: anyhow::Error) -> Self {
        NarrationError::Other(format!("{:#}", err))
    }
}

/// Тип Result для библиотеки narration-sync
pub type Result<T> = std::result::Result<T, NarrationError>;
