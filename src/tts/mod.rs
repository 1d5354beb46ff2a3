//! Модуль для работы с TTS
//!
//! Контракт движка синтеза, реестр движков, кэш результатов и движок OpenAI.

pub mod cache;
pub mod engine;
pub mod openai;
pub mod registry;

pub use cache::{CacheStore, CachedArtifact, DiskCacheStore, MemoryCacheStore, ResultCache};
pub use engine::{AudioStream, SynthesisEngine, SynthesisOutput};
pub use openai::OpenAiEngine;
pub use registry::EngineRegistry;
