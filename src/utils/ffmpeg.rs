//! Модуль для работы с FFmpeg
//!
//! Асинхронный запуск ffmpeg/ffprobe через `tokio::process`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::process::Command as TokioCommand;
use crate::error::{EdgeVoiceError, Result};

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(r"version (\d+\.\d+(?:\.\d+)?)").unwrap();
}

/// Найти исполняемый файл: явный путь или поиск в `PATH`
pub fn resolve_binary(name: &str) -> Result<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        if candidate.exists() {
            return Ok(candidate.to_path_buf());
        }
        return Err(EdgeVoiceError::Configuration(format!("{} not found", name)));
    }
    which::which(name)
        .map_err(|e| EdgeVoiceError::Configuration(format!("{} not found in PATH: {}", name, e)))
}

/// ffprobe, лежащий рядом с ffmpeg (или из `PATH`)
pub fn ffprobe_for(ffmpeg_path: &str) -> String {
    let path = Path::new(ffmpeg_path);
    match (path.parent(), path.file_name().and_then(|n| n.to_str())) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => parent
            .join(name.replacen("ffmpeg", "ffprobe", 1))
            .to_string_lossy()
            .to_string(),
        _ => "ffprobe".to_string(),
    }
}

/// Получение версии FFmpeg
pub async fn ffmpeg_version(ffmpeg_path: &str) -> Result<String> {
    let output = TokioCommand::new(ffmpeg_path)
        .arg("-version")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(EdgeVoiceError::Configuration("Failed to get FFmpeg version".to_string()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first_line = stdout.lines().next().unwrap_or("");
    Ok(VERSION_RE
        .captures(first_line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| first_line.to_string()))
}

/// Запуск команды FFmpeg
///
/// Ошибка содержит хвост stderr процесса.
pub async fn run_ffmpeg(ffmpeg_path: &str, args: &[&str]) -> std::result::Result<(), String> {
    log::debug!("Running {} {}", ffmpeg_path, args.join(" "));
    let output = TokioCommand::new(ffmpeg_path)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| format!("failed to start {}: {}", ffmpeg_path, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        return Err(format!("ffmpeg exited with {}: {}", output.status, tail.join(" | ")));
    }
    Ok(())
}

/// Длительность медиафайла в миллисекундах
pub async fn probe_duration_ms(ffprobe_path: &str, file: &Path) -> Result<u64> {
    let output = TokioCommand::new(ffprobe_path)
        .args([
            "-v", "error",
            "-show_entries", "format=duration",
            "-of", "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(file)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(EdgeVoiceError::Other(anyhow::anyhow!(
            "FFprobe command failed with status: {}",
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let seconds: f64 = stdout
        .trim()
        .parse()
        .map_err(|e| EdgeVoiceError::Other(anyhow::anyhow!("Unexpected ffprobe output {:?}: {}", stdout.trim(), e)))?;
    Ok((seconds * 1000.0).round() as u64)
}
