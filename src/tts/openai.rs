//! Модуль для интеграции с OpenAI API
//!
//! Движок синтеза поверх `POST /audio/speech`. Скорость берется из нормализованной
//! поправки `rate`, высота тона и громкость API не поддерживает.

use std::path::Path;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use reqwest::{Client, Response, StatusCode};
use crate::error::{EngineError, EngineErrorKind};
use crate::subtitle::TimingMap;
use crate::text::NormalizedParams;
use crate::utils::ffmpeg::probe_duration_ms;
use super::engine::{timing_path_for, AudioStream, SynthesisEngine, SynthesisOutput};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "tts-1";

/// Движок OpenAI TTS
#[derive(Debug, Clone)]
pub struct OpenAiEngine {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    ffprobe_path: String,
}

impl OpenAiEngine {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }

    /// `OPENAI_API_KEY`, опционально `OPENAI_BASE_URL` и `OPENAI_TTS_MODEL`
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|key| !key.trim().is_empty())?;
        let mut engine = Self::new(api_key);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            engine = engine.with_base_url(base_url);
        }
        if let Ok(model) = std::env::var("OPENAI_TTS_MODEL") {
            engine = engine.with_model(model);
        }
        Some(engine)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_ffprobe(mut self, ffprobe_path: impl Into<String>) -> Self {
        self.ffprobe_path = ffprobe_path.into();
        self
    }

    async fn request(&self, request: &NormalizedParams) -> Result<Response, EngineError> {
        if request.text.trim().is_empty() {
            return Err(EngineError::invalid_parameters("empty input text"));
        }
        log::debug!("Sending TTS request to OpenAI API: '{}'", request.preview());

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "voice": request.voice,
                "input": request.text,
                "response_format": "mp3",
                "speed": speed_from_rate(&request.rate),
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = match response.text().await {
            Ok(text) => text,
            Err(e) => format!("Failed to read error response: {}", e),
        };
        log::error!("OpenAI API error (status {}): {}", status, body);
        Err(EngineError::new(classify_status(status, &body), format!("status {}: {}", status, body)))
    }
}

/// Скорость OpenAI из поправки вида `+25%`
pub fn speed_from_rate(rate: &str) -> f32 {
    let percent = rate
        .trim()
        .trim_end_matches('%')
        .parse::<f32>()
        .unwrap_or(0.0);
    ((100.0 + percent) / 100.0).clamp(0.25, 4.0)
}

/// Тип ошибки по HTTP-статусу ответа
pub fn classify_status(status: StatusCode, body: &str) -> EngineErrorKind {
    match status {
        StatusCode::NOT_FOUND => EngineErrorKind::UnsupportedVoice,
        StatusCode::BAD_REQUEST if body.to_ascii_lowercase().contains("voice") => EngineErrorKind::UnsupportedVoice,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => EngineErrorKind::InvalidParameters,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => EngineErrorKind::Timeout,
        StatusCode::TOO_MANY_REQUESTS => EngineErrorKind::Network,
        s if s.is_server_error() => EngineErrorKind::Network,
        _ => EngineErrorKind::Other,
    }
}

/// Записать шкалу из одной фразы с длительностью из ffprobe
async fn write_sidecar(ffprobe_path: &str, audio: &Path, text: &str) {
    let duration = match probe_duration_ms(ffprobe_path, audio).await {
        Ok(ms) => Some(ms),
        Err(e) => {
            log::warn!("Failed to probe duration of {}: {}", audio.display(), e);
            None
        }
    };
    if let Err(e) = TimingMap::single_cue(text, duration).save(&timing_path_for(audio)).await {
        log::warn!("Failed to write timing for {}: {}", audio.display(), e);
    }
}

#[async_trait]
impl SynthesisEngine for OpenAiEngine {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, request: &NormalizedParams, target: &Path) -> Result<SynthesisOutput, EngineError> {
        let response = self.request(request).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(EngineError::new(EngineErrorKind::EmptyAudio, "received empty response"));
        }

        tokio::fs::write(target, &bytes)
            .await
            .map_err(|e| EngineError::new(EngineErrorKind::Other, format!("failed to save audio: {}", e)))?;
        log::debug!("Saved TTS audio to {}", target.display());

        write_sidecar(&self.ffprobe_path, target, &request.text).await;
        Ok(SynthesisOutput::for_target(target))
    }

    async fn synthesize_stream(&self, request: &NormalizedParams, target: &Path) -> Result<AudioStream, EngineError> {
        let response = self.request(request).await?;
        let body = response.bytes_stream().map_err(EngineError::from);

        let ffprobe_path = self.ffprobe_path.clone();
        let target = target.to_path_buf();
        let text = request.text.clone();
        // После последнего фрагмента файл уже записан вызывающей стороной
        let finish = stream::once(async move { write_sidecar(&ffprobe_path, &target, &text).await })
            .filter_map(|_| async { None::<Result<Bytes, EngineError>> });

        Ok(body.chain(finish).boxed())
    }
}
