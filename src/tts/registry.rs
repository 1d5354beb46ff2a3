//! Реестр движков синтеза

use std::collections::BTreeMap;
use std::sync::Arc;
use crate::error::{EdgeVoiceError, Result};
use crate::utils::ffmpeg::ffprobe_for;
use super::engine::SynthesisEngine;
use super::openai::OpenAiEngine;

/// Движки по имени; первый зарегистрированный становится движком по умолчанию
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: BTreeMap<String, Arc<dyn SynthesisEngine>>,
    default: Option<String>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Зарегистрировать движки, доступные по переменным окружения
    ///
    /// ffprobe ищется рядом с `EDGE_VOICE_FFMPEG`, если он задан.
    pub fn from_env() -> Self {
        let mut registry = Self::new();
        let ffmpeg = std::env::var("EDGE_VOICE_FFMPEG").unwrap_or_else(|_| "ffmpeg".to_string());
        match OpenAiEngine::from_env() {
            Some(engine) => registry.register(Arc::new(engine.with_ffprobe(ffprobe_for(&ffmpeg)))),
            None => log::debug!("OPENAI_API_KEY is not set, OpenAI engine is not registered"),
        }
        registry
    }

    pub fn register(&mut self, engine: Arc<dyn SynthesisEngine>) {
        let name = engine.name().to_string();
        log::info!("Registered synthesis engine '{}'", name);
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.engines.insert(name, engine);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SynthesisEngine>> {
        self.engines.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.engines.keys().cloned().collect()
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.engines.contains_key(name) {
            return Err(EdgeVoiceError::Configuration(format!("Unknown engine: {}", name)));
        }
        self.default = Some(name.to_string());
        Ok(())
    }

    pub fn default_engine(&self) -> Option<Arc<dyn SynthesisEngine>> {
        self.default.as_deref().and_then(|name| self.get(name))
    }

    /// Движок по имени или движок по умолчанию
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<dyn SynthesisEngine>> {
        match name {
            Some(name) => self
                .get(name)
                .ok_or_else(|| EdgeVoiceError::Configuration(format!("Unknown engine: {}", name))),
            None => self
                .default_engine()
                .ok_or_else(|| EdgeVoiceError::Configuration("No synthesis engine registered".to_string())),
        }
    }
}
