//! Основной файл библиотеки edge-voice
//!
//! Конвейер синтеза длинных текстов: сегментация, синтез с ограничением
//! параллелизма, кэширование результатов, упорядоченная сборка аудио и
//! субтитров, а также потоковая передача аудио по мере синтеза.

pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod runner;
pub mod subtitle;
pub mod task;
pub mod text;
pub mod tts;
pub mod utils;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use crate::error::{Result, ValidationError};
use crate::media::{AudioConcatenator, FfmpegConcatenator};
use crate::pipeline::{buffered, streaming, OutputSink, PipelineContext};
use crate::progress::ProgressObserver;
use crate::task::{TaskError, TaskStats, TaskStore};
use crate::text::{split_text, validate_lang_and_voice, LanguageDetector, NormalizedParams, ScriptDetector};
use crate::tts::{CacheStore, DiskCacheStore, EngineRegistry, MemoryCacheStore, ResultCache, SynthesisEngine};

pub use crate::config::{EdgeVoiceConfig, SubtitleFormat};
pub use crate::error::EdgeVoiceError;
pub use crate::pipeline::{ChannelSink, MemorySink, StreamEvent, StreamOutcome};
pub use crate::task::{Task, TaskResult, TaskStatus};
pub use crate::text::SynthesisParams;
pub use crate::utils::init_logger;

/// Режим запроса, от него зависят лимиты длины текста
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Блокирующая генерация: ограничена `direct_gen_limit`
    Generate,
    /// Фоновая задача
    Submit,
    /// Потоковая передача
    Stream,
}

/// Основная структура для работы с библиотекой
pub struct EdgeVoice {
    ctx: PipelineContext,
    detector: Arc<dyn LanguageDetector>,
}

impl EdgeVoice {
    /// Создать экземпляр с указанной конфигурацией и движком синтеза
    pub fn new(config: EdgeVoiceConfig, engine: Arc<dyn SynthesisEngine>) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn CacheStore> = match DiskCacheStore::new(config.cache_dir()) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                log::warn!(
                    "Cache dir {} unavailable ({}), falling back to memory cache",
                    config.cache_dir().display(),
                    e
                );
                Arc::new(MemoryCacheStore::new())
            }
        };
        let concatenator = Arc::new(FfmpegConcatenator::new(config.ffmpeg_path.clone()));

        log::info!(
            "edge-voice ready: engine '{}', audio dir {}",
            engine.name(),
            config.audio_dir.display()
        );

        Ok(Self {
            ctx: PipelineContext {
                config: Arc::new(config),
                engine,
                cache: ResultCache::new(store),
                tasks: Arc::new(TaskStore::new()),
                concatenator,
            },
            detector: Arc::new(ScriptDetector::new()),
        })
    }

    /// Создать экземпляр с движком из реестра (`None` — движок по умолчанию)
    pub fn from_registry(config: EdgeVoiceConfig, registry: &EngineRegistry, engine: Option<&str>) -> Result<Self> {
        Self::new(config, registry.resolve(engine)?)
    }

    pub fn with_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.ctx.cache = ResultCache::new(store);
        self
    }

    pub fn with_concatenator(mut self, concatenator: Arc<dyn AudioConcatenator>) -> Self {
        self.ctx.concatenator = concatenator;
        self
    }

    pub fn config(&self) -> &EdgeVoiceConfig {
        &self.ctx.config
    }

    /// Реестр задач
    pub fn tasks(&self) -> &Arc<TaskStore> {
        &self.ctx.tasks
    }

    /// Добавить наблюдателя прогресса
    pub fn add_observer(&self, observer: Arc<dyn ProgressObserver>) {
        self.ctx.tasks.add_observer(observer);
    }

    /// Создать задачу в состоянии `pending`
    pub fn create_task(&self, params: &SynthesisParams) -> Task {
        self.ctx.tasks.create_task(params.normalized())
    }

    /// Снимок задачи с учетом политики раскрытия ошибок
    pub fn get_task(&self, id: &str) -> Option<Task> {
        self.ctx
            .tasks
            .get_task(id)
            .map(|task| task.public_view(self.ctx.config.expose_error_detail))
    }

    /// Отпечаток запроса для кэша
    pub fn generate_fingerprint(params: &SynthesisParams) -> String {
        ResultCache::fingerprint(&params.normalized())
    }

    pub fn update_progress(&self, id: &str, percent: f32) -> bool {
        self.ctx.tasks.update_progress(id, percent, None)
    }

    pub fn fail_task(&self, id: &str, error: TaskError) -> bool {
        self.ctx.tasks.fail_task(id, error)
    }

    /// Запросить кооперативную отмену незавершенной задачи
    ///
    /// Буферизованная задача перестает запускать новые сегменты, уже начатые
    /// дорабатывают, и задача завершается ошибкой `cancelled` без результата.
    /// Потоковая задача при отмене просто завершается.
    pub fn cancel(&self, id: &str) -> bool {
        match self.ctx.tasks.get_task(id) {
            Some(task) if !task.is_terminal() => {
                log::info!("Cancelling task {}", id);
                task.context.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn stats(&self) -> TaskStats {
        self.ctx.tasks.stats()
    }

    /// Удалить завершенные задачи старше `task_ttl_secs`
    pub fn evict_expired(&self) -> usize {
        match self.ctx.config.task_ttl() {
            Some(ttl) => self.ctx.tasks.evict_finished(ttl),
            None => 0,
        }
    }

    /// Проверить наличие ffmpeg и вернуть его версию
    pub async fn check_ffmpeg(&self) -> Result<String> {
        let path = utils::ffmpeg::resolve_binary(&self.ctx.config.ffmpeg_path)?;
        let version = utils::ffmpeg::ffmpeg_version(&path.to_string_lossy()).await?;
        log::info!("Using ffmpeg {} at {}", version, path.display());
        Ok(version)
    }

    /// Полный путь к артефакту по имени файла
    pub fn resolve_artifact(&self, name: &str) -> Result<Option<PathBuf>> {
        utils::files::resolve_artifact(self.ctx.audio_dir(), name)
    }

    /// Проверить запрос до создания задачи
    pub fn validate_request(&self, params: &NormalizedParams, mode: RequestMode) -> std::result::Result<(), ValidationError> {
        let config = &self.ctx.config;
        let length = params.text.chars().count();

        if length < config.min_text_chars {
            return Err(ValidationError::TextTooShort {
                min: config.min_text_chars,
            });
        }
        if params.voice.is_empty() {
            return Err(ValidationError::EmptyVoice);
        }
        if config.limit_text_length > 0 && length > config.limit_text_length {
            return Err(ValidationError::TextTooLong {
                actual: length,
                limit: config.limit_text_length,
                hint: "",
            });
        }
        if mode == RequestMode::Generate && length > config.direct_gen_limit {
            return Err(ValidationError::TextTooLong {
                actual: length,
                limit: config.direct_gen_limit,
                hint: ", use the streaming API for long text",
            });
        }

        let lang = self.detector.detect(&params.text);
        log::debug!("Detected language '{}' for '{}'", lang, params.preview());
        validate_lang_and_voice(&lang, &params.voice)
    }

    /// Синтезировать текст и дождаться итоговых артефактов
    pub async fn generate(&self, params: &SynthesisParams) -> Result<TaskResult> {
        let fields = params.normalized();
        self.validate_request(&fields, RequestMode::Generate)?;
        let task = self.ctx.tasks.create_task(fields);
        buffered::execute(&self.ctx, &task).await
    }

    /// Поставить синтез в фон и сразу вернуть задачу в состоянии `pending`
    pub fn submit(&self, params: &SynthesisParams) -> Result<Task> {
        let fields = params.normalized();
        self.validate_request(&fields, RequestMode::Submit)?;
        let task = self.ctx.tasks.create_task(fields);

        let ctx = self.ctx.clone();
        let background = task.clone();
        tokio::spawn(async move {
            // Итог фиксируется в реестре внутри execute
            let _ = buffered::execute(&ctx, &background).await;
        });

        log::info!("Task {} submitted", task.id);
        Ok(task)
    }

    /// Синтезировать текст с передачей аудио в приемник по мере готовности
    pub async fn generate_stream(&self, params: &SynthesisParams, sink: &dyn OutputSink) -> Result<StreamOutcome> {
        let fields = params.normalized();
        if let Err(e) = self.validate_request(&fields, RequestMode::Stream) {
            return Ok(reject(sink, e).await);
        }
        let task = self.ctx.tasks.create_task(fields);
        streaming::execute(&self.ctx, &task, sink).await
    }

    /// Потоковый синтез списка фрагментов, каждый со своими параметрами голоса
    pub async fn generate_stream_items(
        &self,
        items: &[SynthesisParams],
        sink: &dyn OutputSink,
    ) -> Result<StreamOutcome> {
        let items: Vec<NormalizedParams> = items.iter().map(SynthesisParams::normalized).collect();
        let Some(first) = items.first() else {
            return Ok(reject(sink, ValidationError::EmptySegmentList).await);
        };
        for item in &items {
            if let Err(e) = self.validate_request(item, RequestMode::Stream) {
                return Ok(reject(sink, e).await);
            }
        }

        let combined = items
            .iter()
            .map(|item| item.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let segments: Vec<NormalizedParams> = items
            .iter()
            .flat_map(|item| {
                split_text(&item.text, self.ctx.config.max_segment_chars)
                    .segments
                    .into_iter()
                    .map(move |text| item.with_text(text))
            })
            .collect();

        let task = self.ctx.tasks.create_task(first.with_text(combined));
        log::info!(
            "Stream task {}: {} item(s), {} segment(s)",
            task.id,
            items.len(),
            segments.len()
        );
        streaming::execute_segments(&self.ctx, &task, segments, sink).await
    }
}

async fn reject(sink: &dyn OutputSink, error: ValidationError) -> StreamOutcome {
    let reason = error.to_string();
    log::warn!("Stream request rejected: {}", reason);
    sink.error(&reason).await;
    StreamOutcome::Rejected { reason }
}
