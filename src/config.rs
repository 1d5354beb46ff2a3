//! Модуль конфигурации библиотеки edge-voice
//!
//! Этот модуль содержит структуры и перечисления для настройки конвейера синтеза.
//! Значения по умолчанию можно переопределить переменными окружения `EDGE_VOICE_*`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::{EdgeVoiceError, Result};

/// Формат итоговых субтитров
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    /// SubRip
    Srt,
    /// WebVTT
    Vtt,
}

impl Default for SubtitleFormat {
    fn default() -> Self {
        Self::Srt
    }
}

impl SubtitleFormat {
    /// Расширение файла без точки
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Srt => "srt",
            Self::Vtt => "vtt",
        }
    }
}

impl FromStr for SubtitleFormat {
    type Err = EdgeVoiceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "srt" => Ok(Self::Srt),
            "vtt" | "webvtt" => Ok(Self::Vtt),
            other => Err(EdgeVoiceError::Configuration(format!("Unknown subtitle format: {}", other))),
        }
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeVoiceConfig {
    /// Директория для итоговых артефактов и рабочих директорий задач
    pub audio_dir: PathBuf,
    /// Директория для индекса кэша (по умолчанию `{audio_dir}/.cache`)
    pub cache_dir: Option<PathBuf>,
    /// Префикс URL для ссылок на артефакты
    pub static_domain: String,
    /// Максимальное количество одновременных вызовов движка (буферизованный режим)
    pub engine_call_limit: usize,
    /// Максимальная длина сегмента в символах
    pub max_segment_chars: usize,
    /// Количество попыток синтеза сегмента в потоковом режиме
    pub stream_max_attempts: u32,
    /// Пауза между попытками, мс
    pub stream_retry_delay_ms: u64,
    /// Задержка отложенной генерации субтитров после окончания потока, мс
    pub subtitle_delay_ms: u64,
    /// Использовать кэш отдельных сегментов в потоковом режиме
    pub stream_segment_cache: bool,
    /// Минимальная длина текста запроса
    pub min_text_chars: usize,
    /// Максимальная длина текста для блокирующей генерации
    pub direct_gen_limit: usize,
    /// Общий лимит длины текста (0 — без ограничения)
    pub limit_text_length: usize,
    /// Формат субтитров
    pub subtitle_format: SubtitleFormat,
    /// Удалять рабочую директорию задачи после успешной сборки
    pub cleanup_scratch: bool,
    /// Показывать вызывающей стороне полный текст ошибок
    pub expose_error_detail: bool,
    /// Путь к ffmpeg
    pub ffmpeg_path: String,
    /// Время жизни завершенных задач в реестре, секунды
    pub task_ttl_secs: Option<u64>,
}

impl Default for EdgeVoiceConfig {
    fn default() -> Self {
        Self {
            audio_dir: PathBuf::from("audio"),
            cache_dir: None,
            static_domain: String::new(),
            engine_call_limit: 3,
            max_segment_chars: 500,
            stream_max_attempts: 3,
            stream_retry_delay_ms: 1000,
            subtitle_delay_ms: 200,
            stream_segment_cache: false,
            min_text_chars: 5,
            direct_gen_limit: 200,
            limit_text_length: 0,
            subtitle_format: SubtitleFormat::default(),
            cleanup_scratch: false,
            expose_error_detail: false,
            ffmpeg_path: "ffmpeg".to_string(),
            task_ttl_secs: None,
        }
    }
}

impl EdgeVoiceConfig {
    /// Загрузить конфигурацию из переменных окружения поверх значений по умолчанию
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(dir) = env_string("EDGE_VOICE_AUDIO_DIR") {
            config.audio_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_string("EDGE_VOICE_CACHE_DIR") {
            config.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(domain) = env_string("EDGE_VOICE_STATIC_DOMAIN") {
            config.static_domain = domain;
        }
        if let Some(ffmpeg) = env_string("EDGE_VOICE_FFMPEG") {
            config.ffmpeg_path = ffmpeg;
        }

        env_parse("EDGE_VOICE_ENGINE_CALL_LIMIT", &mut config.engine_call_limit);
        env_parse("EDGE_VOICE_MAX_SEGMENT_CHARS", &mut config.max_segment_chars);
        env_parse("EDGE_VOICE_STREAM_MAX_ATTEMPTS", &mut config.stream_max_attempts);
        env_parse("EDGE_VOICE_STREAM_RETRY_DELAY_MS", &mut config.stream_retry_delay_ms);
        env_parse("EDGE_VOICE_SUBTITLE_DELAY_MS", &mut config.subtitle_delay_ms);
        env_parse("EDGE_VOICE_DIRECT_GEN_LIMIT", &mut config.direct_gen_limit);
        env_parse("EDGE_VOICE_LIMIT_TEXT_LENGTH", &mut config.limit_text_length);
        env_parse("EDGE_VOICE_SUBTITLE_FORMAT", &mut config.subtitle_format);
        env_bool("EDGE_VOICE_STREAM_SEGMENT_CACHE", &mut config.stream_segment_cache);
        env_bool("EDGE_VOICE_CLEANUP_SCRATCH", &mut config.cleanup_scratch);
        env_bool("EDGE_VOICE_EXPOSE_ERROR_DETAIL", &mut config.expose_error_detail);

        let mut ttl = 0u64;
        env_parse("EDGE_VOICE_TASK_TTL_SECS", &mut ttl);
        if ttl > 0 {
            config.task_ttl_secs = Some(ttl);
        }

        config
    }

    /// Проверить согласованность параметров
    pub fn validate(&self) -> Result<()> {
        if self.engine_call_limit == 0 {
            return Err(EdgeVoiceError::Configuration("engine_call_limit must be positive".to_string()));
        }
        if self.max_segment_chars == 0 {
            return Err(EdgeVoiceError::Configuration("max_segment_chars must be positive".to_string()));
        }
        if self.stream_max_attempts == 0 {
            return Err(EdgeVoiceError::Configuration("stream_max_attempts must be positive".to_string()));
        }
        if self.ffmpeg_path.trim().is_empty() {
            return Err(EdgeVoiceError::Configuration("ffmpeg_path must not be empty".to_string()));
        }
        Ok(())
    }

    /// Директория индекса кэша
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.audio_dir.join(".cache"))
    }

    pub fn stream_retry_delay(&self) -> Duration {
        Duration::from_millis(self.stream_retry_delay_ms)
    }

    pub fn subtitle_delay(&self) -> Duration {
        Duration::from_millis(self.subtitle_delay_ms)
    }

    pub fn task_ttl(&self) -> Option<Duration> {
        self.task_ttl_secs.map(Duration::from_secs)
    }

    /// Публичная ссылка на файл в директории артефактов
    pub fn public_url(&self, file_name: &str) -> String {
        let domain = self.static_domain.trim_end_matches('/');
        if domain.is_empty() {
            format!("/{}", file_name)
        } else {
            format!("{}/{}", domain, file_name)
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str, target: &mut T) {
    if let Some(raw) = env_string(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => log::warn!("Ignoring invalid value for {}: {}", key, raw),
        }
    }
}

fn env_bool(key: &str, target: &mut bool) {
    if let Some(raw) = env_string(key) {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *target = true,
            "0" | "false" | "no" | "off" => *target = false,
            _ => log::warn!("Ignoring invalid boolean for {}: {}", key, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_constants() {
        let config = EdgeVoiceConfig::default();
        assert_eq!(config.engine_call_limit, 3);
        assert_eq!(config.stream_max_attempts, 3);
        assert_eq!(config.stream_retry_delay(), Duration::from_secs(1));
        assert_eq!(config.subtitle_format, SubtitleFormat::Srt);
        assert!(!config.cleanup_scratch);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = EdgeVoiceConfig {
            engine_call_limit: 0,
            ..EdgeVoiceConfig::default()
        };
        assert!(matches!(config.validate(), Err(EdgeVoiceError::Configuration(_))));
    }

    #[test]
    fn test_public_url() {
        let mut config = EdgeVoiceConfig::default();
        assert_eq!(config.public_url("a.mp3"), "/a.mp3");
        config.static_domain = "http://localhost:3000/".to_string();
        assert_eq!(config.public_url("a.mp3"), "http://localhost:3000/a.mp3");
    }

    #[test]
    fn test_subtitle_format_parsing() {
        assert_eq!("SRT".parse::<SubtitleFormat>().unwrap(), SubtitleFormat::Srt);
        assert_eq!("webvtt".parse::<SubtitleFormat>().unwrap(), SubtitleFormat::Vtt);
        assert!("ass".parse::<SubtitleFormat>().is_err());
    }
}
