//! Модуль обработки ошибок библиотеки edge-voice
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть при синтезе,
//! кэшировании и сборке итоговых артефактов.

use std::fmt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ошибки валидации запроса. Никогда не повторяются.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Английский голос выбран для текста на другом языке
    #[error("English model cannot process non-English text (detected language: {detected}, voice: {voice})")]
    LanguageMismatch { detected: String, voice: String },

    /// Сегментатор не вернул ни одного сегмента
    #[error("No segments found")]
    EmptySegmentList,

    /// Текст короче минимально допустимого
    #[error("Text must contain at least {min} characters")]
    TextTooShort { min: usize },

    /// Текст длиннее допустимого
    #[error("Text length {actual} exceeds the limit of {limit} characters{hint}")]
    TextTooLong { actual: usize, limit: usize, hint: &'static str },

    /// Голос не указан
    #[error("Voice must not be empty")]
    EmptyVoice,

    /// Недопустимое имя файла артефакта
    #[error("Invalid artifact name: {0}")]
    InvalidArtifactName(String),
}

/// Тип ошибки движка синтеза, определяется в месте возникновения
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    /// Голос не поддерживается движком
    UnsupportedVoice,
    /// Сетевая ошибка (соединение, 429, 5xx)
    Network,
    /// Превышено время ожидания
    Timeout,
    /// Некорректные параметры синтеза
    InvalidParameters,
    /// Движок вернул пустое аудио
    EmptyAudio,
    /// Прочие ошибки
    Other,
}

impl EngineErrorKind {
    /// Имеет ли смысл повторить запрос
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::EmptyAudio)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedVoice => "unsupported_voice",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::InvalidParameters => "invalid_parameters",
            Self::EmptyAudio => "empty_audio",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ошибка вызова движка синтеза
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} engine error: {message}")]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Timeout, message)
    }

    pub fn unsupported_voice(voice: &str) -> Self {
        Self::new(EngineErrorKind::UnsupportedVoice, format!("voice '{}' is not supported", voice))
    }

    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::InvalidParameters, message)
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            EngineErrorKind::Timeout
        } else if err.is_connect() || err.is_request() || err.is_body() {
            EngineErrorKind::Network
        } else {
            EngineErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }
}

/// Ошибки библиотеки edge-voice
#[derive(Debug, Error)]
pub enum EdgeVoiceError {
    /// Ошибка валидации запроса
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Ошибка движка синтеза
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Сегмент не удалось синтезировать после всех попыток
    #[error("Segment {} failed after {attempts} attempts: {source}", .index + 1)]
    SegmentFailed {
        index: usize,
        attempts: u32,
        #[source]
        source: EngineError,
    },

    /// В итоговом результате нет аудио
    #[error("Incomplete TTS result for segment {0}")]
    ArtifactIncomplete(String),

    /// Ошибка склейки аудио
    #[error("Concat failed: {0}")]
    Concatenation(String),

    /// Ошибка построения субтитров
    #[error("Subtitle error: {0}")]
    Subtitle(String),

    /// Ошибка хранилища кэша
    #[error("Cache error: {0}")]
    Cache(String),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Операция отменена потребителем
    #[error("Operation cancelled")]
    Cancelled,

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка HTTP-запроса вне движка синтеза
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Другая ошибка
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EdgeVoiceError {
    /// Короткий машинно-читаемый тег ошибки
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Engine(_) => "engine",
            Self::SegmentFailed { .. } => "segment_failed",
            Self::ArtifactIncomplete(_) => "artifact_incomplete",
            Self::Concatenation(_) => "concatenation",
            Self::Subtitle(_) => "subtitle",
            Self::Cache(_) => "cache",
            Self::Configuration(_) => "configuration",
            Self::Cancelled => "cancelled",
            Self::Io(_) => "io",
            Self::Http(_) => "http",
            Self::Json(_) => "json",
            Self::Other(_) => "other",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<&str> for EdgeVoiceError {
    fn from(s: &str) -> Self {
        EdgeVoiceError::Other(anyhow::anyhow!(s.to_string()))
    }
}

impl From<String> for EdgeVoiceError {
    fn from(s: String) -> Self {
        EdgeVoiceError::Other(anyhow::anyhow!(s))
    }
}

/// Тип Result для библиотеки edge-voice
pub type Result<T> = std::result::Result<T, EdgeVoiceError>;
