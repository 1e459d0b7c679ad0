//! Модуль для работы с транскриптом
//!
//! Транскрипт приходит либо сегментами с таймингами, либо одной строкой,
//! если тайминги недоступны. После создания не меняется.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]*>").expect("valid regex");
    static ref CAPTION_CUE: Regex = Regex::new(r"\[[^\]]*\]").expect("valid regex");
}

/// Сегмент транскрипта
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_seconds: f64,
    pub duration_seconds: f64,
}

/// Транскрипт видео
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Transcript {
    /// Сегменты с таймингами
    Segments(Vec<TranscriptSegment>),
    /// Плоский текст без таймингов
    Plain(String),
}

impl Transcript {
    /// Весь текст одной строкой
    pub fn flatten(&self) -> String {
        match self {
            Self::Segments(segments) => segments
                .iter()
                .map(|s| s.text.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            Self::Plain(text) => text.clone(),
        }
    }

    /// Текст, подготовленный для сокращения и озвучки
    pub fn normalized_text(&self) -> String {
        normalize_text(&self.flatten())
    }

    pub fn word_count(&self) -> usize {
        word_count(&self.flatten())
    }
}

/// Подготовка текста: без HTML, служебных пометок субтитров и лишних пробелов
pub fn normalize_text(text: &str) -> String {
    let text = HTML_TAG.replace_all(text, "");
    let text = CAPTION_CUE.replace_all(&text, " ");

    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Количество слов, разделённых пробельными символами
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(text: &str, start: f64, duration: f64) -> TranscriptSegment {
        TranscriptSegment {
            text: text.to_string(),
            start_seconds: start,
            duration_seconds: duration,
        }
    }

    #[test]
    fn flattens_segments_with_single_spaces() {
        let transcript = Transcript::Segments(vec![
            segment(" Hello there. ", 0.0, 1.5),
            segment("", 1.5, 0.5),
            segment("General Kenobi.", 2.0, 2.0),
        ]);
        assert_eq!(transcript.flatten(), "Hello there. General Kenobi.");
        assert_eq!(transcript.word_count(), 4);
    }

    #[test]
    fn plain_transcript_flattens_as_is() {
        let transcript = Transcript::Plain("Just text.".to_string());
        assert_eq!(transcript.flatten(), "Just text.");
    }

    #[test]
    fn normalizes_markup_and_caption_cues() {
        let raw = "<i>Welcome</i> back &amp; thanks.\n[Music]  Let&#39;s   go!";
        assert_eq!(normalize_text(raw), "Welcome back & thanks. Let's go!");
    }
}
