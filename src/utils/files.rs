//! Вспомогательные функции для файлов артефактов

use std::path::{Component, Path, PathBuf};
use lazy_static::lazy_static;
use path_clean::PathClean;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use walkdir::WalkDir;
use crate::error::{Result, ValidationError};

/// Расширения файлов, которые можно отдавать наружу
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "srt", "vtt"];

lazy_static! {
    static ref SPLIT_FILE_RE: Regex = Regex::new(r"^(\d+)_splits\.[A-Za-z0-9]+$").unwrap();
}

/// Найти итоговый артефакт по имени файла
///
/// Принимаются только голые имена с разрешенным расширением.
/// Возвращает `Ok(None)`, если файла нет.
pub fn resolve_artifact(audio_dir: &Path, name: &str) -> Result<Option<PathBuf>> {
    let invalid = || ValidationError::InvalidArtifactName(name.to_string());

    let requested = Path::new(name);
    let mut components = requested.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => return Err(invalid().into()),
    }

    let extension = requested
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(invalid)?;
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(invalid().into());
    }

    let base = audio_dir.clean();
    let candidate = base.join(requested).clean();
    if !candidate.starts_with(&base) {
        return Err(invalid().into());
    }

    Ok(candidate.is_file().then_some(candidate))
}

/// Номер сегмента из имени `{n}_splits.{ext}`
pub fn split_number(path: &Path) -> Option<usize> {
    let name = path.file_name()?.to_str()?;
    SPLIT_FILE_RE
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Упорядочить файлы сегментов по числовому номеру, а не лексикографически
pub fn sort_by_split_number(files: &mut [PathBuf]) {
    files.sort_by_key(|path| split_number(path).unwrap_or(usize::MAX));
}

/// Аудиофайлы сегментов в директории задачи в порядке номеров
pub fn list_split_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| split_number(path).is_some())
        .collect();
    sort_by_split_number(&mut files);
    files
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&raw)?)
}

pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let raw = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, raw).await?;
    Ok(())
}

/// Размер файла, если он существует
pub async fn file_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|meta| meta.len())
}
