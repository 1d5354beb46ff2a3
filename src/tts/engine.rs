//! Контракт движка синтеза речи
//!
//! Движок превращает один сегмент текста в аудио и временную шкалу.
//! Он работает в двух режимах: запись в файл и поток байтов.

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use crate::error::EngineError;
use crate::text::NormalizedParams;

/// Поток аудио от движка
pub type AudioStream = BoxStream<'static, std::result::Result<Bytes, EngineError>>;

/// Результат синтеза в файл
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisOutput {
    /// Путь к аудио
    pub audio: PathBuf,
    /// Путь к временной шкале
    pub timing: PathBuf,
}

impl SynthesisOutput {
    pub fn for_target(target: &Path) -> Self {
        Self {
            audio: target.to_path_buf(),
            timing: timing_path_for(target),
        }
    }
}

/// Путь к временной шкале аудиофайла: `{audio}.json`
pub fn timing_path_for(audio: &Path) -> PathBuf {
    let mut name = audio.as_os_str().to_os_string();
    name.push(".json");
    PathBuf::from(name)
}

/// Движок синтеза речи
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Имя движка в реестре
    fn name(&self) -> &str;

    /// Синтезировать сегмент в файл `target` и шкалу `{target}.json`
    async fn synthesize(
        &self,
        request: &NormalizedParams,
        target: &Path,
    ) -> std::result::Result<SynthesisOutput, EngineError>;

    /// Синтезировать сегмент потоком
    ///
    /// Вызывающая сторона сама записывает байты в `target`; движок пишет
    /// шкалу `{target}.json` после последнего фрагмента.
    async fn synthesize_stream(
        &self,
        request: &NormalizedParams,
        target: &Path,
    ) -> std::result::Result<AudioStream, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_path() {
        assert_eq!(
            timing_path_for(Path::new("/a/b/1_splits.mp3")),
            PathBuf::from("/a/b/1_splits.mp3.json")
        );
        let output = SynthesisOutput::for_target(Path::new("x.mp3"));
        assert_eq!(output.timing, PathBuf::from("x.mp3.json"));
    }
}
