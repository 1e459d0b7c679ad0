//! Модуль для работы с FFmpeg
//!
//! Все вызовы асинхронные и ограничены по времени: при таймауте процесс
//! убивается (`kill_on_drop`), а вызывающая сторона получает `Timeout`.

use std::process::{Output, Stdio};
use std::time::Duration;

use log::{debug, error};
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{NarrationError, Result};

/// Сколько последних строк stderr попадает в текст ошибки
const STDERR_TAIL_LINES: usize = 8;

/// Проверка наличия FFmpeg
pub async fn check_ffmpeg_installed() -> bool {
    match Command::new("ffmpeg").arg("-version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Получение версии FFmpeg
pub async fn get_ffmpeg_version() -> Result<String> {
    let output = run_tool("ffmpeg", &["-version".to_string()], 10).await?;

    if !output.status.success() {
        return Err(NarrationError::Other("Failed to get FFmpeg version".to_string()));
    }

    let version_str = String::from_utf8_lossy(&output.stdout);
    let first_line = version_str.lines().next().unwrap_or("");

    Ok(first_line.to_string())
}

/// Запуск внешней утилиты с ограничением по времени
pub async fn run_tool(program: &str, args: &[String], timeout_secs: u64) -> Result<Output> {
    debug!("Running {} {}", program, args.join(" "));

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    match timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(output) => Ok(output?),
        Err(_) => {
            // future с дочерним процессом уже сброшен, kill_on_drop его остановил
            error!("{} timed out after {} seconds and was killed", program, timeout_secs);
            Err(NarrationError::Timeout {
                tool: program.to_string(),
                seconds: timeout_secs,
            })
        }
    }
}

/// Запуск команды FFmpeg
pub async fn run_ffmpeg_command(args: &[String], timeout_secs: u64) -> Result<()> {
    log::info!("Running FFmpeg command: ffmpeg {}", args.join(" "));
    let output = run_tool("ffmpeg", args, timeout_secs).await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("ffmpeg error: {}", stderr);
        return Err(NarrationError::Transform(format!(
            "FFmpeg command failed with status {}: {}",
            output.status,
            stderr_tail(&stderr)
        )));
    }

    Ok(())
}

/// Запуск команды FFprobe, возвращает stdout
pub async fn run_ffprobe_command(args: &[String], timeout_secs: u64) -> Result<String> {
    let output = run_tool("ffprobe", args, timeout_secs).await?;

    if !output.status.success() {
        return Err(NarrationError::Other(format!(
            "FFprobe command failed with status: {}",
            output.status
        )));
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        return Err(NarrationError::Other(format!(
            "FFprobe reported errors: {}",
            stderr_tail(&stderr)
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let stderr = (0..20).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let tail = stderr_tail(&stderr);
        assert!(tail.starts_with("line 12"));
        assert!(tail.ends_with("line 19"));
    }

    #[tokio::test]
    async fn missing_program_is_an_io_error() {
        let result = run_tool("definitely-not-a-real-binary-4242", &[], 5).await;
        assert!(matches!(result, Err(NarrationError::Io(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_program_times_out() {
        let result = run_tool("sleep", &["5".to_string()], 1).await;
        assert!(matches!(result, Err(NarrationError::Timeout { seconds: 1, .. })));
    }
}
