//! Модуль для сокращения транскрипта до заданного количества слов
//!
//! Сокращение идёт по целым предложениям и берёт материал из начала,
//! середины и конца текста, а не только вступление.

use log::{debug, info, warn};

use crate::text::summarizer::Summarizer;
use crate::transcript::word_count;

/// Бюджет, начиная с которого работает выборка по трём зонам
const MICRO_BUDGET_WORDS: usize = 20;

/// Доля предложений, которая берётся из каждой зоны
const ZONE_FRACTION: f64 = 0.25;

/// Сокращение текста с необязательным сокращением через языковую модель
pub struct TextDistiller {
    summarizer: Option<Box<dyn Summarizer>>,
}

impl Default for TextDistiller {
    fn default() -> Self {
        Self::new()
    }
}

impl TextDistiller {
    /// Только алгоритмическое сокращение
    pub fn new() -> Self {
        Self { summarizer: None }
    }

    /// Сначала языковая модель, при любой ошибке алгоритм
    pub fn with_summarizer(summarizer: Box<dyn Summarizer>) -> Self {
        Self {
            summarizer: Some(summarizer),
        }
    }

    /// Сократить текст до `target_words` слов
    pub async fn distill(&self, source: &str, target_words: usize) -> String {
        if word_count(source) <= target_words {
            return source.to_string();
        }

        if let Some(summarizer) = &self.summarizer {
            match summarizer.summarize(source, target_words).await {
                Ok(summary) if !summary.trim().is_empty() => {
                    let summary = summary.trim();
                    info!(
                        "AI summary produced {} words (budget {})",
                        word_count(summary),
                        target_words
                    );
                    // Ответ модели проходит через тот же алгоритм, чтобы гарантировать бюджет
                    return distill(summary, target_words);
                }
                Ok(_) => warn!("AI summary was empty, falling back to rule-based distillation"),
                Err(e) => warn!("AI summary failed ({}), falling back to rule-based distillation", e),
            }
        }

        distill(source, target_words)
    }
}

/// Сократить текст до не более чем `target_words` слов по границам предложений
pub fn distill(source: &str, target_words: usize) -> String {
    let total_words = word_count(source);
    if total_words <= target_words {
        return source.to_string();
    }
    if target_words == 0 {
        return String::new();
    }

    let sentences = split_sentences(source);
    let candidates = if target_words <= MICRO_BUDGET_WORDS {
        micro_candidates(&sentences)
    } else {
        zone_candidates(&sentences, target_words)
    };

    debug!(
        "Distilling {} words / {} sentences to {} words from {} candidates",
        total_words,
        sentences.len(),
        target_words,
        candidates.len()
    );

    let mut script = accumulate(&sentences, &candidates, target_words);

    if script.is_empty() {
        // Ни один кандидат не влез: ищем любое целое предложение в бюджете
        script = match sentences.iter().find(|s| word_count(s) <= target_words) {
            Some(sentence) => sentence.clone(),
            None => {
                warn!(
                    "No sentence fits into {} words, cutting at word boundary",
                    target_words
                );
                hard_cut(source, target_words)
            }
        };
    }

    let mut script = truncate_words(&script, target_words);
    if has_terminal_mark(source) && !ends_with_terminal(&script) {
        script = terminate(&script);
    }
    script
}

/// Разбить текст на предложения.
///
/// Граница предложения: `.`, `!` или `?`, за которым идут пробел и заглавная
/// буква. Сокращения вида "Mr. Smith" при этом тоже считаются границей.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (idx, c) = chars[i];
        if is_terminal(c) {
            let mut j = i + 1;
            if j < chars.len() && chars[j].1.is_whitespace() {
                while j < chars.len() && chars[j].1.is_whitespace() {
                    j += 1;
                }
                if j < chars.len() && chars[j].1.is_uppercase() {
                    push_sentence(&mut sentences, &text[start..idx + c.len_utf8()]);
                    start = chars[j].0;
                    i = j;
                    continue;
                }
            }
        }
        i += 1;
    }

    push_sentence(&mut sentences, &text[start..]);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let sentence = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if !sentence.is_empty() {
        sentences.push(sentence);
    }
}

/// Первое предложение и последнее, если влезут оба
fn micro_candidates(sentences: &[String]) -> Vec<usize> {
    match sentences.len() {
        0 => Vec::new(),
        1 => vec![0],
        n => vec![0, n - 1],
    }
}

/// Индексы из трёх зон: начало, окно вокруг середины, конец.
///
/// Если полная выборка не помещается в бюджет, зоны сужаются, пока из каждой
/// не останется по одному предложению.
fn zone_candidates(sentences: &[String], target_words: usize) -> Vec<usize> {
    let n = sentences.len();
    if n == 0 {
        return Vec::new();
    }

    let mut per_zone = ((n as f64) * ZONE_FRACTION).round().max(1.0) as usize;
    loop {
        let selection = zone_selection(n, per_zone);
        let words: usize = selection.iter().map(|&i| word_count(&sentences[i])).sum();
        if words <= target_words || per_zone == 1 {
            return selection;
        }
        per_zone -= 1;
    }
}

fn zone_selection(n: usize, per_zone: usize) -> Vec<usize> {
    let per_zone = per_zone.min(n);
    let head = 0..per_zone;

    let mid_start = (n / 2).saturating_sub(per_zone / 2).min(n - per_zone);
    let middle = mid_start..mid_start + per_zone;

    let tail = n - per_zone..n;

    let mut selection: Vec<usize> = Vec::with_capacity(per_zone * 3);
    for idx in head.chain(middle).chain(tail) {
        if !selection.contains(&idx) {
            selection.push(idx);
        }
    }
    selection.sort_unstable();
    selection
}

/// Набирать предложения, пока следующее не переполнит бюджет
fn accumulate(sentences: &[String], candidates: &[usize], target_words: usize) -> String {
    let mut picked: Vec<&str> = Vec::new();
    let mut words = 0;

    for &idx in candidates {
        let sentence = &sentences[idx];
        let sentence_words = word_count(sentence);
        if words + sentence_words > target_words {
            break;
        }
        words += sentence_words;
        picked.push(sentence);
    }

    picked.join(" ")
}

/// Жёсткая обрезка по словам; если в обрезке есть конец предложения, режем по нему
fn hard_cut(text: &str, target_words: usize) -> String {
    let cut = truncate_words(text, target_words);
    match last_boundary(&cut) {
        Some(end) => cut[..end].to_string(),
        None => cut,
    }
}

/// Конец последнего предложения: знак, за которым пробел или конец текста ("3.5" не граница)
fn last_boundary(text: &str) -> Option<usize> {
    text.char_indices()
        .filter(|(_, c)| is_terminal(*c))
        .map(|(i, c)| i + c.len_utf8())
        .filter(|&end| text[end..].is_empty() || text[end..].starts_with(char::is_whitespace))
        .last()
}

/// Оставить первые `max_words` слов
pub fn truncate_words(text: &str, max_words: usize) -> String {
    if word_count(text) <= max_words {
        return text.to_string();
    }
    text.split_whitespace().take(max_words).collect::<Vec<_>>().join(" ")
}

fn terminate(text: &str) -> String {
    let trimmed = text.trim_end_matches(|c: char| c == ',' || c == ';' || c == ':' || c == '-' || c.is_whitespace());
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{}.", trimmed)
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn has_terminal_mark(text: &str) -> bool {
    text.chars().any(is_terminal)
}

/// Текст заканчивается на `.`, `!` или `?`
pub fn ends_with_terminal(text: &str) -> bool {
    text.trim_end().chars().last().map(is_terminal).unwrap_or(false)
}
