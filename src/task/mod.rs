//! Задачи синтеза
//!
//! Задача создается при приеме запроса и живет только в памяти процесса.
//! Из состояний `success` и `failed` выхода нет.

use std::time::Instant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use crate::error::EdgeVoiceError;
use crate::text::NormalizedParams;

pub mod store;

pub use store::{TaskPatch, TaskStats, TaskStore};

/// Состояние задачи
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Ссылка на итоговый артефакт
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// URL аудио
    pub audio: String,
    /// URL субтитров
    pub srt: String,
    /// Имя аудиофайла в директории артефактов
    pub file: String,
    /// Имя файла субтитров
    pub srt_file: String,
    /// Часть сегментов не удалось синтезировать
    #[serde(default)]
    pub partial: bool,
    /// Размер аудио в байтах
    #[serde(default)]
    pub size: Option<u64>,
}

/// Ошибка, сохраненная в задаче
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Машинный тег ошибки
    pub kind: String,
    /// Текст ошибки
    pub message: String,
}

impl TaskError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Копия без подробностей для внешнего потребителя
    pub fn redacted(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            message: "failed".to_string(),
        }
    }
}

impl From<&EdgeVoiceError> for TaskError {
    fn from(err: &EdgeVoiceError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Временное состояние выполнения, не сериализуется
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Момент приема запроса
    pub started_at: Instant,
    /// Токен отмены (отключение потребителя потока)
    pub cancel: CancellationToken,
}

impl Default for TaskContext {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Задача синтеза
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub fields: NormalizedParams,
    pub status: TaskStatus,
    pub progress: f32,
    pub result: Option<TaskResult>,
    pub error: Option<TaskError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub context: TaskContext,
}

impl Task {
    pub(crate) fn new(id: String, fields: NormalizedParams) -> Self {
        let now = Utc::now();
        Self {
            id,
            fields,
            status: TaskStatus::Pending,
            progress: 0.0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            context: TaskContext::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Имя итогового аудиофайла
    pub fn audio_file_name(&self) -> String {
        format!("{}.mp3", self.id)
    }

    /// Снимок задачи для внешнего потребителя
    pub fn public_view(&self, expose_error_detail: bool) -> Self {
        let mut view = self.clone();
        if !expose_error_detail {
            view.error = view.error.as_ref().map(TaskError::redacted);
        }
        view
    }
}
