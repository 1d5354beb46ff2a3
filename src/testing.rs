//! Тестовые движок и склейщик без внешних процессов

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use crate::error::{EngineError, EngineErrorKind, Result};
use crate::media::concat::{check_inputs, AudioConcatenator};
use crate::subtitle::{TimingCue, TimingMap};
use crate::text::NormalizedParams;
use crate::tts::engine::{timing_path_for, AudioStream, SynthesisEngine, SynthesisOutput};

/// Миллисекунд на символ в шкалах тестового движка
pub const MS_PER_CHAR: u64 = 50;

/// Аудио, которое тестовый движок выдает для текста
pub fn mock_audio(text: &str) -> Vec<u8> {
    format!("<{}>", text).into_bytes()
}

/// Шкала по словам, как у движка с пословной разметкой
pub fn mock_timing(text: &str) -> TimingMap {
    let mut cues = Vec::new();
    let mut cursor = 0u64;
    for word in text.split_whitespace() {
        let end = cursor + word.chars().count() as u64 * MS_PER_CHAR;
        cues.push(TimingCue::new(word, cursor, end));
        cursor = end;
    }
    TimingMap::new(Some(cursor), cues)
}

#[derive(Debug, Clone)]
enum Failure {
    /// Первые `n` вызовов для текста завершаются ошибкой
    Times(usize, EngineErrorKind),
    /// Поток отдает первый фрагмент и обрывается
    MidStream,
}

/// Движок со сценарием ошибок и задержек по тексту сегмента
#[derive(Debug, Default)]
pub struct MockEngine {
    name: String,
    failures: Mutex<HashMap<String, Failure>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::named("mock")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Первые `times` вызовов для текста, содержащего `needle`, падают
    pub fn fail_times(self, needle: &str, times: usize, kind: EngineErrorKind) -> Self {
        self.failures.lock().insert(needle.to_string(), Failure::Times(times, kind));
        self
    }

    pub fn fail_always(self, needle: &str) -> Self {
        self.fail_times(needle, usize::MAX, EngineErrorKind::Network)
    }

    pub fn fail_mid_stream(self, needle: &str) -> Self {
        self.failures.lock().insert(needle.to_string(), Failure::MidStream);
        self
    }

    pub fn delay(self, needle: &str, delay: Duration) -> Self {
        self.delays.lock().insert(needle.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, needle: &str) -> usize {
        self.calls.lock().iter().filter(|text| text.contains(needle)).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record_call(&self, text: &str) {
        self.calls.lock().push(text.to_string());
    }

    /// Ошибка для очередного вызова, если она запланирована
    fn scripted_failure(&self, text: &str) -> Option<Failure> {
        let mut failures = self.failures.lock();
        let (needle, failure) = failures
            .iter_mut()
            .find(|(needle, _)| text.contains(needle.as_str()))?;
        match failure {
            Failure::Times(0, _) => None,
            Failure::Times(remaining, kind) => {
                let kind = *kind;
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                log::debug!("Mock failure for '{}'", needle);
                Some(Failure::Times(1, kind))
            }
            Failure::MidStream => Some(Failure::MidStream),
        }
    }

    fn delay_for(&self, text: &str) -> Option<Duration> {
        self.delays
            .lock()
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, delay)| *delay)
    }

    async fn write_timing(target: &Path, text: &str) -> std::result::Result<(), EngineError> {
        mock_timing(text)
            .save(&timing_path_for(target))
            .await
            .map_err(|e| EngineError::new(EngineErrorKind::Other, e.to_string()))
    }
}

#[async_trait]
impl SynthesisEngine for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn synthesize(
        &self,
        request: &NormalizedParams,
        target: &Path,
    ) -> std::result::Result<SynthesisOutput, EngineError> {
        self.record_call(&request.text);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay_for(&request.text) {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        let result = match self.scripted_failure(&request.text) {
            Some(Failure::Times(_, kind)) => {
                Err(EngineError::new(kind, format!("scripted failure for '{}'", request.text)))
            }
            Some(Failure::MidStream) => Err(EngineError::network("connection reset")),
            None => {
                match tokio::fs::write(target, mock_audio(&request.text)).await {
                    Ok(()) => Self::write_timing(target, &request.text)
                        .await
                        .map(|_| SynthesisOutput::for_target(target)),
                    Err(e) => Err(EngineError::new(EngineErrorKind::Other, e.to_string())),
                }
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn synthesize_stream(
        &self,
        request: &NormalizedParams,
        target: &Path,
    ) -> std::result::Result<AudioStream, EngineError> {
        self.record_call(&request.text);
        if let Some(delay) = self.delay_for(&request.text) {
            tokio::time::sleep(delay).await;
        }

        let audio = Bytes::from(mock_audio(&request.text));
        let middle = audio.len() / 2;
        let first = audio.slice(..middle);
        let second = audio.slice(middle..);

        match self.scripted_failure(&request.text) {
            Some(Failure::Times(_, kind)) => {
                Err(EngineError::new(kind, format!("scripted failure for '{}'", request.text)))
            }
            Some(Failure::MidStream) => {
                let chunks = vec![
                    Ok(first),
                    Err(EngineError::network("connection reset mid-stream")),
                ];
                Ok(stream::iter(chunks).boxed())
            }
            None => {
                Self::write_timing(target, &request.text).await?;
                Ok(stream::iter(vec![Ok(first), Ok(second)]).boxed())
            }
        }
    }
}

/// Склейка простым объединением байтов
#[derive(Debug, Default)]
pub struct ByteConcatenator {
    calls: AtomicUsize,
    inputs: Mutex<Vec<PathBuf>>,
}

impl ByteConcatenator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Файлы последнего вызова
    pub fn last_inputs(&self) -> Vec<PathBuf> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl AudioConcatenator for ByteConcatenator {
    async fn concatenate(&self, files: &[PathBuf], output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.inputs.lock() = files.to_vec();
        check_inputs(files).await?;
        let mut joined = Vec::new();
        for file in files {
            joined.extend(tokio::fs::read(file).await?);
        }
        tokio::fs::write(output, joined).await?;
        Ok(())
    }
}
