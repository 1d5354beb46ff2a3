//! Конвейер синтеза
//!
//! Две стратегии: буферизованная (сегменты параллельно, результат — файл) и
//! потоковая (сегменты строго по очереди, байты сразу уходят потребителю).
//! Обе заканчиваются одной и той же сборкой артефактов.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use bytes::Bytes;
use crate::config::EdgeVoiceConfig;
use crate::error::{EdgeVoiceError, Result};
use crate::media::AudioConcatenator;
use crate::subtitle::{emit_subtitle, merge_timing_files};
use crate::task::{TaskResult, TaskStore};
use crate::text::NormalizedParams;
use crate::tts::engine::timing_path_for;
use crate::tts::{CachedArtifact, ResultCache, SynthesisEngine};
use crate::utils::files::{file_size, sort_by_split_number};
use crate::utils::ScratchDir;

pub mod buffered;
pub mod sink;
pub mod streaming;

#[cfg(test)]
mod tests;

pub use sink::{ChannelSink, MemorySink, OutputSink, StreamEvent};
pub use streaming::StreamOutcome;

/// Общие зависимости обеих стратегий
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<EdgeVoiceConfig>,
    pub engine: Arc<dyn SynthesisEngine>,
    pub cache: ResultCache,
    pub tasks: Arc<TaskStore>,
    pub concatenator: Arc<dyn AudioConcatenator>,
}

impl PipelineContext {
    pub fn audio_dir(&self) -> &Path {
        &self.config.audio_dir
    }

    /// Имена итоговых файлов задачи
    pub fn artifact_names(&self, task_id: &str) -> (String, String) {
        (
            format!("{}.mp3", task_id),
            format!("{}.{}", task_id, self.config.subtitle_format.extension()),
        )
    }

    /// Ссылка на итоговые артефакты
    pub async fn task_result(&self, task_id: &str, partial: bool) -> TaskResult {
        let (file, srt_file) = self.artifact_names(task_id);
        let size = file_size(&self.audio_dir().join(&file)).await;
        TaskResult {
            audio: self.config.public_url(&file),
            srt: self.config.public_url(&srt_file),
            file,
            srt_file,
            partial,
            size,
        }
    }

    /// Сообщение об ошибке для внешнего потребителя
    pub fn public_error(&self, err: &EdgeVoiceError) -> String {
        if self.config.expose_error_detail {
            err.to_string()
        } else {
            "failed".to_string()
        }
    }
}

/// Восстановить сегмент из кэша в `target`; `Ok(None)` при промахе
///
/// Вместе с аудио копируется шкала сегмента, если она есть.
pub(crate) async fn restore_cached_segment(
    ctx: &PipelineContext,
    params: &NormalizedParams,
    target: &Path,
) -> Result<Option<Bytes>> {
    let fingerprint = ResultCache::segment_fingerprint(params);
    let Some(hit) = ctx.cache.get(&fingerprint, ctx.audio_dir()).await else {
        return Ok(None);
    };
    let source = ctx.audio_dir().join(&hit.file);
    let audio = match tokio::fs::read(&source).await {
        Ok(audio) => audio,
        Err(e) => {
            log::warn!("Cached segment {} unreadable: {}", source.display(), e);
            return Ok(None);
        }
    };

    tokio::fs::write(target, &audio).await?;
    if let Err(e) = tokio::fs::copy(timing_path_for(&source), timing_path_for(target)).await {
        log::warn!("Cached segment {} has no timing: {}", source.display(), e);
    }
    log::debug!("Segment '{}' restored from cache", params.preview());
    Ok(Some(Bytes::from(audio)))
}

/// Записать в кэш сегмент из рабочей директории задачи
pub(crate) async fn cache_segment(ctx: &PipelineContext, task_id: &str, params: &NormalizedParams, target: &Path) {
    let Some(name) = target.file_name().and_then(|name| name.to_str()) else {
        return;
    };
    let file = format!("{}/{}", task_id, name);
    let artifact = CachedArtifact {
        audio: ctx.config.public_url(&file),
        srt: String::new(),
        file,
        srt_file: String::new(),
        size: file_size(target).await,
    };
    if let Err(e) = ctx.cache.put(&ResultCache::segment_fingerprint(params), &artifact).await {
        log::warn!("Failed to cache segment {}: {}", artifact.file, e);
    }
}

/// Финальная сборка: объединенная шкала, субтитры и склейка аудио
///
/// `files` — аудио сегментов; порядок восстанавливается по номеру в имени файла.
pub(crate) async fn assemble(
    ctx: &PipelineContext,
    scratch: &ScratchDir,
    task_id: &str,
    mut files: Vec<PathBuf>,
) -> Result<()> {
    sort_by_split_number(&mut files);
    let (audio_name, srt_name) = ctx.artifact_names(task_id);
    let audio_path = ctx.audio_dir().join(&audio_name);

    ctx.concatenator.concatenate(&files, &audio_path).await?;
    if !tokio::fs::try_exists(&audio_path).await.unwrap_or(false) {
        return Err(EdgeVoiceError::ArtifactIncomplete(audio_name));
    }

    let timings: Vec<PathBuf> = files.iter().map(|file| timing_path_for(file)).collect();
    let merged = merge_timing_files(&timings).await;
    merged.save(&scratch.merged_timing()).await?;
    // Рядом с итоговым аудио, как у одиночного сегмента
    merged.save(&timing_path_for(&audio_path)).await?;

    emit_subtitle(&scratch.merged_timing(), &ctx.audio_dir().join(&srt_name), ctx.config.subtitle_format).await?;
    log::info!("Assembled {} segments into {}", files.len(), audio_name);
    Ok(())
}
