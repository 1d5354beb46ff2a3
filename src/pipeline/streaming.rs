//! Потоковая стратегия
//!
//! Сегменты обрабатываются строго по очереди: синтез сегмента `k+1` не
//! начинается, пока байты сегмента `k` не переданы потребителю. Каждый сегмент
//! дополнительно пишется в `{task_id}/{n}_splits.mp3`; субтитры и итоговый
//! файл собираются с задержкой после закрытия потока.
//!
//! Повтор возможен только до первого переданного байта сегмента, иначе
//! потребитель получил бы дублирующиеся данные.

use std::path::{Path, PathBuf};
use futures::StreamExt;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use crate::error::{EdgeVoiceError, EngineError, EngineErrorKind, Result, ValidationError};
use crate::progress::segment_progress;
use crate::task::{Task, TaskError, TaskPatch, TaskResult, TaskStatus};
use crate::text::{split_text, NormalizedParams};
use crate::tts::{ResultCache, SynthesisEngine};
use crate::utils::files::list_split_files;
use crate::utils::ScratchDir;
use super::sink::OutputSink;
use super::{assemble, cache_segment, restore_cached_segment, PipelineContext};

/// Итог потокового запроса
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamOutcome {
    /// Попадание в кэш: вместо потока отдан готовый результат
    Cached(TaskResult),
    /// Все сегменты переданы
    Streamed { task_id: String, segments: usize },
    /// Потребитель отключился
    Cancelled { task_id: String },
    /// Запрос отклонен до создания задачи
    Rejected { reason: String },
}

/// Ошибка одной попытки синтеза сегмента
enum AttemptError {
    Disconnected,
    Engine { error: EngineError, forwarded: u64 },
}

/// Выполнить потоковый запрос для одного текста
pub async fn execute(ctx: &PipelineContext, task: &Task, sink: &dyn OutputSink) -> Result<StreamOutcome> {
    let fingerprint = ResultCache::fingerprint(&task.fields);
    if let Some(hit) = ctx.cache.get(&fingerprint, ctx.audio_dir()).await {
        log::info!("Stream task {} served from cache", task.id);
        let result = hit.into_result();
        sink.respond(&result).await;
        ctx.tasks.update_task(&task.id, TaskPatch::result(result.clone()));
        ctx.tasks.end_task(&task.id);
        return Ok(StreamOutcome::Cached(result));
    }

    let segments = split_text(&task.fields.text, ctx.config.max_segment_chars)
        .segments
        .into_iter()
        .map(|text| task.fields.with_text(text))
        .collect();
    execute_segments(ctx, task, segments, sink).await
}

/// Выполнить потоковый запрос для готового списка сегментов
pub async fn execute_segments(
    ctx: &PipelineContext,
    task: &Task,
    segments: Vec<NormalizedParams>,
    sink: &dyn OutputSink,
) -> Result<StreamOutcome> {
    ctx.tasks.update_task(&task.id, TaskPatch::status(TaskStatus::Processing));

    match stream_all(ctx, task, &segments, sink).await {
        Ok(scratch) => {
            sink.end().await;
            let result = ctx.task_result(&task.id, false).await;
            ctx.tasks.update_task(&task.id, TaskPatch::result(result));
            ctx.tasks.end_task(&task.id);
            log::info!(
                "Stream task {} finished: {} segment(s) in {:.2?}",
                task.id,
                segments.len(),
                task.context.started_at.elapsed()
            );
            schedule_finalization(ctx.clone(), scratch, task.id.clone());
            Ok(StreamOutcome::Streamed {
                task_id: task.id.clone(),
                segments: segments.len(),
            })
        }
        Err(EdgeVoiceError::Cancelled) => {
            // Отключение потребителя не ошибка: задача просто завершается
            log::info!("Consumer of stream task {} disconnected", task.id);
            ctx.tasks.end_task(&task.id);
            Ok(StreamOutcome::Cancelled {
                task_id: task.id.clone(),
            })
        }
        Err(e) => {
            log::error!("Stream task {} aborted: {}", task.id, e);
            sink.error(&ctx.public_error(&e)).await;
            ctx.tasks.fail_task(&task.id, TaskError::from(&e));
            Err(e)
        }
    }
}

async fn stream_all(
    ctx: &PipelineContext,
    task: &Task,
    segments: &[NormalizedParams],
    sink: &dyn OutputSink,
) -> Result<ScratchDir> {
    if segments.is_empty() {
        return Err(ValidationError::EmptySegmentList.into());
    }
    let scratch = ScratchDir::create(ctx.audio_dir(), &task.id).await?;
    let cancel = &task.context.cancel;
    let total = segments.len();

    for (index, params) in segments.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(EdgeVoiceError::Cancelled);
        }
        let target = scratch.split_audio(index);

        let from_cache = ctx.config.stream_segment_cache
            && forward_cached_segment(ctx, params, &target, sink, cancel).await?;
        if !from_cache {
            stream_with_retry(ctx, index, params, &target, sink, cancel).await?;
            if ctx.config.stream_segment_cache {
                cache_segment(ctx, &task.id, params, &target).await;
            }
        }

        ctx.tasks.update_progress(
            &task.id,
            segment_progress(index + 1, total, 1.0),
            Some(format!("{}/{} segments", index + 1, total)),
        );
    }
    Ok(scratch)
}

/// Синтез одного сегмента с повторами
///
/// Повторяются только временные ошибки движка (сеть, таймаут, пустое аудио) и
/// только пока потребителю не ушло ни одного байта сегмента. Постоянные ошибки
/// (неподдерживаемый голос, неверные параметры) повтором не исправить, поэтому
/// поток прерывается сразу с `attempts = 1`.
async fn stream_with_retry(
    ctx: &PipelineContext,
    index: usize,
    params: &NormalizedParams,
    target: &Path,
    sink: &dyn OutputSink,
    cancel: &CancellationToken,
) -> Result<()> {
    let max_attempts = ctx.config.stream_max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match stream_segment(ctx.engine.as_ref(), params, target, sink, cancel).await {
            Ok(bytes) => {
                log::debug!("Segment {} streamed: {} bytes, attempt {}", index + 1, bytes, attempt);
                return Ok(());
            }
            Err(AttemptError::Disconnected) => return Err(EdgeVoiceError::Cancelled),
            Err(AttemptError::Engine { error, forwarded }) => {
                let retry = forwarded == 0 && error.kind.is_transient() && attempt < max_attempts;
                if !retry {
                    return Err(EdgeVoiceError::SegmentFailed {
                        index,
                        attempts: attempt,
                        source: error,
                    });
                }
                log::warn!(
                    "Segment {} attempt {}/{} failed: {}, retrying",
                    index + 1,
                    attempt,
                    max_attempts,
                    error
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(EdgeVoiceError::Cancelled),
                    _ = sink.closed() => {
                        cancel.cancel();
                        return Err(EdgeVoiceError::Cancelled);
                    }
                    _ = tokio::time::sleep(ctx.config.stream_retry_delay()) => {}
                }
            }
        }
    }
}

/// Одна попытка: байты движка идут потребителю и в файл сегмента
async fn stream_segment(
    engine: &dyn SynthesisEngine,
    params: &NormalizedParams,
    target: &Path,
    sink: &dyn OutputSink,
    cancel: &CancellationToken,
) -> std::result::Result<u64, AttemptError> {
    let engine_error = |error: EngineError, forwarded: u64| AttemptError::Engine { error, forwarded };

    // Вызов движка прерывается, как только потребитель ушел
    let started = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AttemptError::Disconnected),
        _ = sink.closed() => {
            cancel.cancel();
            return Err(AttemptError::Disconnected);
        }
        started = engine.synthesize_stream(params, target) => started,
    };
    let mut stream = started.map_err(|e| engine_error(e, 0))?;
    let mut file = tokio::fs::File::create(target)
        .await
        .map_err(|e| engine_error(EngineError::new(EngineErrorKind::Other, e.to_string()), 0))?;
    let mut forwarded = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AttemptError::Disconnected),
            _ = sink.closed() => {
                cancel.cancel();
                return Err(AttemptError::Disconnected);
            }
            next = stream.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                let io_error = |e: std::io::Error| {
                    engine_error(EngineError::new(EngineErrorKind::Other, e.to_string()), forwarded)
                };
                file.write_all(&chunk).await.map_err(io_error)?;
                file.flush().await.map_err(io_error)?;
                forwarded += chunk.len() as u64;
                if sink.write(chunk).await.is_err() {
                    cancel.cancel();
                    return Err(AttemptError::Disconnected);
                }
            }
            Some(Err(error)) => return Err(engine_error(error, forwarded)),
            None => break,
        }
    }

    if forwarded == 0 {
        return Err(engine_error(
            EngineError::new(EngineErrorKind::EmptyAudio, "engine produced no audio"),
            0,
        ));
    }
    Ok(forwarded)
}

/// Передать сегмент из кэша; `Ok(false)` при промахе
async fn forward_cached_segment(
    ctx: &PipelineContext,
    params: &NormalizedParams,
    target: &Path,
    sink: &dyn OutputSink,
    cancel: &CancellationToken,
) -> Result<bool> {
    let Some(audio) = restore_cached_segment(ctx, params, target).await? else {
        return Ok(false);
    };
    if sink.write(audio).await.is_err() {
        cancel.cancel();
        return Err(EdgeVoiceError::Cancelled);
    }
    Ok(true)
}

/// Отложенная сборка субтитров и итогового файла; ошибки только логируются
///
/// После сборки результат задачи уточняется: появляется размер итогового аудио.
fn schedule_finalization(ctx: PipelineContext, mut scratch: ScratchDir, task_id: String) {
    let delay = ctx.config.subtitle_delay();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let files = match split_files(scratch.path().to_path_buf()).await {
            Ok(files) => files,
            Err(e) => {
                log::error!("Deferred finalization of task {} failed: {}", task_id, e);
                return;
            }
        };
        match assemble(&ctx, &scratch, &task_id, files).await {
            Ok(()) => {
                let result = ctx.task_result(&task_id, false).await;
                ctx.tasks.refresh_result(&task_id, result);
                scratch.cleanup_on_drop(ctx.config.cleanup_scratch);
            }
            Err(e) => log::error!("Deferred finalization of task {} failed: {}", task_id, e),
        }
    });
}

/// Обход рабочей директории вне потоков рантайма
async fn split_files(dir: PathBuf) -> Result<Vec<PathBuf>> {
    tokio::task::spawn_blocking(move || list_split_files(&dir))
        .await
        .map_err(|e| EdgeVoiceError::Other(e.into()))
}
