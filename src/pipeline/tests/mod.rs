mod test_buffered;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use crate::config::EdgeVoiceConfig;
use crate::task::{Task, TaskStore};
use crate::testing::{mock_audio, ByteConcatenator, MockEngine};
use crate::text::SynthesisParams;
use crate::tts::{MemoryCacheStore, ResultCache};
use super::PipelineContext;

/// Четыре предложения, каждое становится отдельным сегментом при лимите 20 символов
pub(super) const FOUR_SEGMENTS: &str = "Alpha one here. Bravo two here. Charlie three. Delta four now.";
pub(super) const SEGMENTS: [&str; 4] = ["Alpha one here.", "Bravo two here.", "Charlie three.", "Delta four now."];

pub(super) struct Harness {
    pub ctx: PipelineContext,
    pub engine: Arc<MockEngine>,
    pub concat: Arc<ByteConcatenator>,
    pub store: Arc<MemoryCacheStore>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(engine: MockEngine) -> Self {
        Self::with_config(engine, |_| {})
    }

    pub fn with_config(engine: MockEngine, tweak: impl FnOnce(&mut EdgeVoiceConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EdgeVoiceConfig {
            audio_dir: dir.path().to_path_buf(),
            max_segment_chars: 20,
            stream_retry_delay_ms: 10,
            subtitle_delay_ms: 0,
            ..Default::default()
        };
        tweak(&mut config);

        let engine = Arc::new(engine);
        let concat = Arc::new(ByteConcatenator::new());
        let store = Arc::new(MemoryCacheStore::new());
        let ctx = PipelineContext {
            config: Arc::new(config),
            engine: engine.clone(),
            cache: ResultCache::new(store.clone()),
            tasks: Arc::new(TaskStore::new()),
            concatenator: concat.clone(),
        };
        Self {
            ctx,
            engine,
            concat,
            store,
            dir,
        }
    }

    pub fn task(&self, text: &str) -> Task {
        self.ctx
            .tasks
            .create_task(SynthesisParams::new(text, "en-US-AriaNeural").normalized())
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Ожидаемое аудио: сегменты в заданном порядке
pub(super) fn expected_audio(segments: &[&str]) -> Vec<u8> {
    segments.iter().flat_map(|text| mock_audio(text)).collect()
}

/// Дождаться появления файла (отложенная сборка)
pub(super) async fn wait_for_file(path: &Path) -> bool {
    for _ in 0..200 {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
