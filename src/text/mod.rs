//! Модуль для подготовки текста озвучки

pub mod distiller;
pub mod summarizer;

pub use distiller::{distill, split_sentences, TextDistiller};
pub use summarizer::{OpenAiSummarizer, Summarizer};
