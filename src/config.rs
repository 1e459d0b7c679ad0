//! Модуль конфигурации библиотеки narration-sync
//!
//! Конфигурация читается один раз при старте, после чего не меняется:
//! компоненты получают её при создании (обычно через `Arc`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NarrationError, Result};

/// Модель TTS для использования с OpenAI API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TtsModel {
    /// Стандартная модель
    Standard,
    /// Модель высокого качества
    HighDefinition,
}

impl Default for TtsModel {
    fn default() -> Self {
        Self::Standard
    }
}

impl TtsModel {
    /// Получить строковое представление модели
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "tts-1",
            Self::HighDefinition => "tts-1-hd",
        }
    }
}

/// Провайдер синтеза речи
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// OpenAI speech API (провайдер "A")
    OpenAi,
    /// Произвольный HTTP-сервис `{text, voice, format}` (провайдер "B")
    Http,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Http => "http",
        }
    }
}

/// Голос и скорость речи, с которой он говорит
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceSpec {
    pub provider: ProviderKind,
    pub voice_id: String,
    /// Слов в секунду
    pub speaking_rate_wps: f64,
}

/// Запись калибровочной таблицы скоростей речи
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeakingRate {
    pub provider: ProviderKind,
    pub voice_id: String,
    pub words_per_second: f64,
}

/// Настройки HTTP-провайдера
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProviderConfig {
    /// URL, на который отправляется POST-запрос
    pub endpoint: String,
    /// Необязательный Bearer-токен
    pub api_key: Option<String>,
    /// Жёсткий лимит символов на один запрос
    pub max_chars: usize,
    /// Формат аудио в ответе
    pub format: String,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            max_chars: 4000,
            format: "mp3".to_string(),
        }
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    /// API ключ для OpenAI
    pub openai_api_key: String,
    /// Базовый URL OpenAI API
    pub openai_base_url: String,
    /// Модель TTS
    pub tts_model: TtsModel,
    /// Лимит символов OpenAI speech API
    pub openai_max_chars: usize,
    /// Второй провайдер, если настроен
    pub http_provider: Option<HttpProviderConfig>,
    /// Калибровка скорости речи по (провайдер, голос)
    pub speaking_rates: Vec<SpeakingRate>,
    /// Скорость речи, если голос не найден в таблице
    pub default_speaking_rate: f64,
    /// Запас по бюджету слов для длительностей от 10 до 30 секунд
    pub default_buffer_factor: f64,
    /// Доля длительности видео, которую занимает озвучка
    pub narration_ratio: f64,
    /// Разница длительностей (сек), при которой темп не меняется
    pub adjustment_threshold: f64,
    /// Допустимая относительная погрешность после подгонки
    pub tolerance_ratio: f64,
    /// Дополнительные проходы подгонки, если погрешность выше допустимой
    pub max_correction_passes: u32,
    /// Громкость озвучки (0.0 - 1.0)
    pub narration_volume: f32,
    /// Громкость фоновой музыки (0.0 - 1.0)
    pub soundtrack_volume: f32,
    /// Оставлять оригинальную дорожку, если нет ни озвучки, ни музыки
    pub keep_original_audio: bool,
    /// Таймаут ffmpeg (сек)
    pub transform_timeout_secs: u64,
    /// Таймаут ffprobe (сек)
    pub probe_timeout_secs: u64,
    /// Таймаут запроса синтеза речи (сек)
    pub http_timeout_secs: u64,
    /// Сокращать текст через языковую модель
    pub use_ai_summary: bool,
    /// Модель для сокращения текста
    pub summarizer_model: String,
    /// Использовать кэширование
    pub use_cache: bool,
    /// Директория для кэша
    pub cache_dir: Option<String>,
    /// Максимальный размер кэша в байтах
    pub max_cache_size: Option<u64>,
    /// Удалять временные файлы после успешного завершения
    pub cleanup_temp_files: bool,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            tts_model: TtsModel::default(),
            openai_max_chars: 4096,
            http_provider: None,
            speaking_rates: default_speaking_rates(),
            default_speaking_rate: 2.5,
            default_buffer_factor: 0.98,
            narration_ratio: 0.93,
            adjustment_threshold: 0.1,
            tolerance_ratio: 0.03,
            max_correction_passes: 0,
            narration_volume: 1.0,
            soundtrack_volume: 0.3,
            keep_original_audio: false,
            transform_timeout_secs: 300,
            probe_timeout_secs: 30,
            http_timeout_secs: 120,
            use_ai_summary: false,
            summarizer_model: "gpt-4o-mini".to_string(),
            use_cache: false,
            cache_dir: None,
            max_cache_size: Some(1024 * 1024 * 1024), // 1 GB
            cleanup_temp_files: true,
        }
    }
}

fn default_speaking_rates() -> Vec<SpeakingRate> {
    [
        ("alloy", 2.6),
        ("echo", 2.5),
        ("fable", 2.6),
        ("onyx", 2.4),
        ("nova", 2.7),
        ("shimmer", 2.6),
    ]
    .into_iter()
    .map(|(voice, wps)| SpeakingRate {
        provider: ProviderKind::OpenAi,
        voice_id: voice.to_string(),
        words_per_second: wps,
    })
    .collect()
}

impl NarrationConfig {
    /// Загрузить конфигурацию из JSON-файла; отсутствующие поля берутся по умолчанию
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            NarrationError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Переопределить секреты и адреса из переменных окружения
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.openai_api_key = key;
            }
        }
        if let Ok(endpoint) = std::env::var("NARRATION_TTS_ENDPOINT") {
            let provider = self.http_provider.get_or_insert_with(HttpProviderConfig::default);
            provider.endpoint = endpoint;
        }
        if let Ok(key) = std::env::var("NARRATION_TTS_KEY") {
            if let Some(provider) = self.http_provider.as_mut() {
                provider.api_key = Some(key);
            }
        }
        self
    }

    /// Проверить диапазоны значений
    pub fn validate(&self) -> Result<()> {
        if !(self.narration_ratio > 0.0 && self.narration_ratio <= 1.0) {
            return Err(NarrationError::Configuration(format!(
                "narration_ratio must be in (0, 1], got {}",
                self.narration_ratio
            )));
        }
        for (name, volume) in [
            ("narration_volume", self.narration_volume),
            ("soundtrack_volume", self.soundtrack_volume),
        ] {
            if !(0.0..=1.0).contains(&volume) {
                return Err(NarrationError::Configuration(format!(
                    "{} must be in [0, 1], got {}",
                    name, volume
                )));
            }
        }
        if self.default_speaking_rate <= 0.0 {
            return Err(NarrationError::Configuration(
                "default_speaking_rate must be positive".to_string(),
            ));
        }
        if self.adjustment_threshold < 0.0 || self.tolerance_ratio <= 0.0 {
            return Err(NarrationError::Configuration(
                "adjustment_threshold and tolerance_ratio must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Скорость речи голоса, либо глобальное значение по умолчанию
    pub fn speaking_rate(&self, provider: ProviderKind, voice_id: &str) -> f64 {
        self.speaking_rates
            .iter()
            .find(|rate| rate.provider == provider && rate.voice_id.eq_ignore_ascii_case(voice_id))
            .map(|rate| rate.words_per_second)
            .unwrap_or(self.default_speaking_rate)
    }

    /// Собрать `VoiceSpec` с откалиброванной скоростью речи
    pub fn voice_spec(&self, provider: ProviderKind, voice_id: &str) -> VoiceSpec {
        VoiceSpec {
            provider,
            voice_id: voice_id.to_string(),
            speaking_rate_wps: self.speaking_rate(provider, voice_id),
        }
    }

    /// Запас по бюджету слов: короткие озвучки хуже всего переносят перебор
    pub fn buffer_factor(&self, target_duration_secs: f64) -> f64 {
        if target_duration_secs <= 10.0 {
            0.95
        } else if target_duration_secs > 30.0 {
            0.99
        } else {
            self.default_buffer_factor
        }
    }
}
