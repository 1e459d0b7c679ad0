//! Получение длительности аудио- и видеофайлов через ffprobe

use std::path::Path;

use log::warn;

use crate::utils::ffmpeg::run_ffprobe_command;

/// Аргументы ffprobe для чтения длительности контейнера
pub fn probe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        path.to_string_lossy().to_string(),
    ]
}

/// Получение длительности файла в секундах.
///
/// Никогда не возвращает ошибку: любая проблема (процесс не запустился,
/// ненулевой код, вывод в stderr, нечисловой stdout, таймаут) даёт `None`.
pub async fn probe_duration(path: &Path, timeout_secs: u64) -> Option<f64> {
    match run_ffprobe_command(&probe_args(path), timeout_secs).await {
        Ok(stdout) => {
            let duration = parse_duration(&stdout);
            if duration.is_none() {
                warn!("Failed to parse duration of {}: {:?}", path.display(), stdout.trim());
            }
            duration
        }
        Err(e) => {
            warn!("Duration probe failed for {}: {}", path.display(), e);
            None
        }
    }
}

/// Разбор вывода ffprobe: одно неотрицательное конечное число
pub fn parse_duration(stdout: &str) -> Option<f64> {
    let value = stdout.trim().parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_seconds() {
        assert_eq!(parse_duration("12.345000\n"), Some(12.345));
        assert_eq!(parse_duration("0"), Some(0.0));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration("N/A"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("-1.0"), None);
        assert_eq!(parse_duration("inf"), None);
        assert_eq!(parse_duration("12.0\n13.0"), None);
    }

    #[test]
    fn builds_expected_arguments() {
        let args = probe_args(Path::new("/tmp/voice.mp3"));
        assert_eq!(
            args.join(" "),
            "-v error -show_entries format=duration -of default=noprint_wrappers=1:nokey=1 /tmp/voice.mp3"
        );
    }

    #[tokio::test]
    async fn missing_file_yields_none() {
        // Без ffprobe в PATH или без файла результат одинаковый
        let result = probe_duration(Path::new("/definitely/not/here.mp3"), 10).await;
        assert_eq!(result, None);
    }
}
