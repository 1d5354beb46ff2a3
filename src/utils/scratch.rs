//! Рабочая директория задачи
//!
//! Каждая задача пишет промежуточные файлы в `{audio_dir}/{task_id}/`, поэтому
//! директории разных задач не пересекаются.

use std::path::{Path, PathBuf};
use crate::error::Result;
use crate::tts::engine::timing_path_for;

/// Расширение промежуточных аудиофайлов
pub const SPLIT_EXTENSION: &str = "mp3";
/// Имя объединенной временной шкалы со смещениями
pub const MERGED_TIMING: &str = "[merged]all_splits.mp3.json";

/// Рабочая директория одной задачи
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    /// Удалять ли директорию при уничтожении объекта
    remove_on_drop: bool,
}

impl ScratchDir {
    /// Создать директорию `{audio_dir}/{task_id}`
    pub async fn create(audio_dir: &Path, task_id: &str) -> Result<Self> {
        let path = audio_dir.join(task_id);
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self {
            path,
            remove_on_drop: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Путь к аудио сегмента `index` (нумерация файлов с единицы)
    pub fn split_audio(&self, index: usize) -> PathBuf {
        self.path.join(format!("{}_splits.{}", index + 1, SPLIT_EXTENSION))
    }

    /// Путь к временной шкале сегмента `index`
    pub fn split_timing(&self, index: usize) -> PathBuf {
        timing_path_for(&self.split_audio(index))
    }

    pub fn merged_timing(&self) -> PathBuf {
        self.path.join(MERGED_TIMING)
    }

    /// Удалить директорию после того, как объект выйдет из области видимости
    pub fn cleanup_on_drop(&mut self, cleanup: bool) {
        self.remove_on_drop = cleanup;
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.remove_on_drop && self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                log::warn!("Failed to remove scratch dir {}: {}", self.path.display(), e);
            } else {
                log::debug!("Removed scratch dir {}", self.path.display());
            }
        }
    }
}
