//! Склейка аудиофайлов сегментов
//!
//! ffmpeg получает файл-список (`file '<path>'` на строку) и склеивает
//! потоки без перекодирования.

use std::io::Write;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use crate::error::{EdgeVoiceError, Result};
use crate::utils::ffmpeg::run_ffmpeg;

/// Склейка упорядоченного списка аудиофайлов в один
#[async_trait]
pub trait AudioConcatenator: Send + Sync {
    async fn concatenate(&self, files: &[PathBuf], output: &Path) -> Result<()>;
}

/// Проверить список входных файлов до запуска внешнего процесса
pub async fn check_inputs(files: &[PathBuf]) -> Result<()> {
    if files.is_empty() {
        return Err(EdgeVoiceError::Concatenation("no input files to concatenate".to_string()));
    }
    for file in files {
        if !tokio::fs::try_exists(file).await.unwrap_or(false) {
            return Err(EdgeVoiceError::Concatenation(format!(
                "input file is missing: {}",
                file.display()
            )));
        }
    }
    Ok(())
}

/// Содержимое файла-списка для concat demuxer
pub fn concat_manifest(files: &[PathBuf]) -> String {
    let mut manifest = String::new();
    for file in files {
        // Одинарная кавычка экранируется как '\''
        let escaped = file.to_string_lossy().replace('\'', "'\\''");
        manifest.push_str(&format!("file '{}'\n", escaped));
    }
    manifest
}

/// Склейка через ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegConcatenator {
    ffmpeg_path: String,
}

impl FfmpegConcatenator {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl Default for FfmpegConcatenator {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl AudioConcatenator for FfmpegConcatenator {
    async fn concatenate(&self, files: &[PathBuf], output: &Path) -> Result<()> {
        check_inputs(files).await?;

        let manifest_dir = output
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let absolute: Vec<PathBuf> = files
            .iter()
            .map(|file| std::path::absolute(file).unwrap_or_else(|_| file.clone()))
            .collect();

        // Файл-список удаляется вместе с объектом NamedTempFile
        let mut manifest = tempfile::Builder::new()
            .prefix("concat_")
            .suffix(".txt")
            .tempfile_in(manifest_dir)?;
        manifest.write_all(concat_manifest(&absolute).as_bytes())?;
        manifest.flush()?;

        let manifest_path = manifest.path().to_string_lossy().to_string();
        let output_path = output.to_string_lossy().to_string();
        log::info!("Concatenating {} files into {}", files.len(), output.display());

        run_ffmpeg(
            &self.ffmpeg_path,
            &[
                "-y",
                "-f", "concat",
                "-safe", "0",
                "-i", &manifest_path,
                "-c", "copy",
                &output_path,
            ],
        )
        .await
        .map_err(EdgeVoiceError::Concatenation)
    }
}
