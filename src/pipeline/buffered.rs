//! Буферизованная стратегия
//!
//! Сегменты синтезируются параллельно (не больше `engine_call_limit` вызовов
//! движка одновременно) в рабочую директорию задачи, затем склеиваются по
//! номеру сегмента. Упавшие сегменты пропускаются, результат помечается как
//! частичный и не кэшируется.
//!
//! Каждый удачный сегмент кэшируется отдельно, поэтому повтор частичной задачи
//! или текст с общим началом синтезируют только недостающие сегменты.

use std::path::PathBuf;
use crate::error::{EdgeVoiceError, Result, ValidationError};
use crate::progress::segment_progress;
use crate::runner::{ConcurrencyJob, ConcurrencyRunner, JobOutcome};
use crate::subtitle::emit_subtitle;
use crate::task::{Task, TaskError, TaskPatch, TaskResult, TaskStatus};
use crate::text::split_text;
use crate::tts::ResultCache;
use crate::utils::ScratchDir;
use super::{assemble, cache_segment, restore_cached_segment, PipelineContext};

/// Выполнить задачу и записать итог в реестр
pub async fn execute(ctx: &PipelineContext, task: &Task) -> Result<TaskResult> {
    ctx.tasks.update_task(&task.id, TaskPatch::status(TaskStatus::Processing));
    let started = task.context.started_at;

    let outcome = run(ctx, task).await;
    match &outcome {
        Ok(result) => {
            ctx.tasks.update_task(&task.id, TaskPatch::result(result.clone()));
            ctx.tasks.end_task(&task.id);
            log::info!(
                "Task {} done in {:.2?}{}",
                task.id,
                started.elapsed(),
                if result.partial { " (partial)" } else { "" }
            );
        }
        Err(e) => {
            log::error!("Task {} failed: {}", task.id, e);
            ctx.tasks.fail_task(&task.id, TaskError::from(e));
        }
    }
    outcome
}

async fn run(ctx: &PipelineContext, task: &Task) -> Result<TaskResult> {
    let fingerprint = ResultCache::fingerprint(&task.fields);
    if let Some(hit) = ctx.cache.get(&fingerprint, ctx.audio_dir()).await {
        log::info!("Task {} served from cache", task.id);
        return Ok(hit.into_result());
    }

    tokio::fs::create_dir_all(ctx.audio_dir()).await?;

    let split = split_text(&task.fields.text, ctx.config.max_segment_chars);
    if split.length == 0 {
        return Err(ValidationError::EmptySegmentList.into());
    }
    log::info!(
        "Task {} '{}': {} segment(s)",
        task.id,
        task.fields.preview(),
        split.length
    );

    let result = if split.is_single() {
        synthesize_single(ctx, task).await?
    } else {
        synthesize_segments(ctx, task, split.segments).await?
    };

    if result.partial {
        log::warn!("Task {} produced a partial result, not caching", task.id);
    } else {
        ctx.cache.put_result(&fingerprint, &result).await;
    }
    Ok(result)
}

/// Один сегмент: движок пишет сразу в итоговый файл
async fn synthesize_single(ctx: &PipelineContext, task: &Task) -> Result<TaskResult> {
    let (audio_name, srt_name) = ctx.artifact_names(&task.id);
    let target = ctx.audio_dir().join(&audio_name);

    let output = ctx.engine.synthesize(&task.fields, &target).await?;
    if !tokio::fs::try_exists(&output.audio).await.unwrap_or(false) {
        return Err(EdgeVoiceError::ArtifactIncomplete(audio_name));
    }
    emit_subtitle(&output.timing, &ctx.audio_dir().join(&srt_name), ctx.config.subtitle_format).await?;

    Ok(ctx.task_result(&task.id, false).await)
}

/// Несколько сегментов через исполнитель с ограничением параллелизма
async fn synthesize_segments(ctx: &PipelineContext, task: &Task, segments: Vec<String>) -> Result<TaskResult> {
    let mut scratch = ScratchDir::create(ctx.audio_dir(), &task.id).await?;
    let total = segments.len();

    let jobs: Vec<ConcurrencyJob<PathBuf>> = segments
        .into_iter()
        .enumerate()
        .map(|(position, text)| {
            let job_ctx = ctx.clone();
            let task_id = task.id.clone();
            let params = task.fields.with_text(text);
            let target = scratch.split_audio(position);
            ConcurrencyJob::new(move |index| async move {
                if restore_cached_segment(&job_ctx, &params, &target).await?.is_some() {
                    return Ok(target);
                }
                log::debug!("Synthesizing segment {} '{}'", index + 1, params.preview());
                let output = job_ctx.engine.synthesize(&params, &target).await?;
                cache_segment(&job_ctx, &task_id, &params, &output.audio).await;
                Ok(output.audio)
            })
        })
        .collect();

    let tasks = ctx.tasks.clone();
    let task_id = task.id.clone();
    let report = ConcurrencyRunner::new(ctx.config.engine_call_limit)
        .run_with_progress(jobs, &task.context.cancel, move |done, total| {
            tasks.update_progress(
                &task_id,
                segment_progress(done, total, 1.0),
                Some(format!("{}/{} segments", done, total)),
            );
        })
        .await;

    if report.cancelled {
        return Err(EdgeVoiceError::Cancelled);
    }

    let failed: Vec<usize> = report.failed_indices().iter().map(|index| index + 1).collect();
    let partial = !failed.is_empty();
    if partial {
        log::warn!("Task {}: segments {:?} of {} failed", task.id, failed, total);
    }

    let files: Vec<PathBuf> = report
        .results
        .into_iter()
        .filter_map(|outcome| match outcome {
            JobOutcome::Success(path) => Some(path),
            _ => None,
        })
        .collect();

    assemble(ctx, &scratch, &task.id, files).await?;
    scratch.cleanup_on_drop(ctx.config.cleanup_scratch);

    Ok(ctx.task_result(&task.id, partial).await)
}
