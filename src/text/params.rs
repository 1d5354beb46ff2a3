//! Параметры синтеза и их нормализация
//!
//! Отсутствующие или нулевые поправки скорости, громкости и высоты тона
//! приводятся к явному нейтральному значению (`+0%`, `+0Hz`), чтобы логически
//! одинаковые запросы давали одинаковый отпечаток в кэше.

use serde::{Deserialize, Serialize};

/// Нейтральная поправка в процентах
pub const NEUTRAL_PERCENT: &str = "+0%";
/// Нейтральная поправка высоты тона
pub const NEUTRAL_HZ: &str = "+0Hz";

/// Параметры одного запроса на синтез
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SynthesisParams {
    /// Текст для озвучивания
    pub text: String,
    /// Идентификатор голоса, например `en-US-AriaNeural`
    pub voice: String,
    /// Поправка скорости (`+10%`)
    #[serde(default)]
    pub rate: Option<String>,
    /// Поправка высоты тона (`-5Hz`)
    #[serde(default)]
    pub pitch: Option<String>,
    /// Поправка громкости (`+20%`)
    #[serde(default)]
    pub volume: Option<String>,
}

impl SynthesisParams {
    pub fn new(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
            rate: None,
            pitch: None,
            volume: None,
        }
    }

    pub fn with_rate(mut self, rate: impl Into<String>) -> Self {
        self.rate = Some(rate.into());
        self
    }

    pub fn with_pitch(mut self, pitch: impl Into<String>) -> Self {
        self.pitch = Some(pitch.into());
        self
    }

    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volume = Some(volume.into());
        self
    }

    /// Привести параметры к каноническому виду
    pub fn normalized(&self) -> NormalizedParams {
        NormalizedParams {
            text: self.text.trim().to_string(),
            voice: self.voice.trim().to_string(),
            rate: normalize_adjustment(self.rate.as_deref(), "%"),
            pitch: normalize_adjustment(self.pitch.as_deref(), "Hz"),
            volume: normalize_adjustment(self.volume.as_deref(), "%"),
        }
    }
}

/// Нормализованные параметры: все поля заполнены явными значениями
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedParams {
    pub text: String,
    pub voice: String,
    pub rate: String,
    pub pitch: String,
    pub volume: String,
}

impl NormalizedParams {
    /// Те же параметры, но с другим текстом (для сегментов)
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..self.clone()
        }
    }

    /// Короткий фрагмент текста для логов
    pub fn preview(&self) -> String {
        self.text.chars().take(10).collect()
    }
}

impl From<NormalizedParams> for SynthesisParams {
    fn from(params: NormalizedParams) -> Self {
        Self {
            text: params.text,
            voice: params.voice,
            rate: Some(params.rate),
            pitch: Some(params.pitch),
            volume: Some(params.volume),
        }
    }
}

/// Нормализация поправки вида `[+-]<число><единица>`
///
/// Пустые, нулевые и бесконечные (`NaN`, `inf`) значения превращаются в
/// `+0<единица>`, значения без знака получают явный `+`. Нераспознанные строки
/// передаются движку как есть.
fn normalize_adjustment(value: Option<&str>, unit: &str) -> String {
    let raw = value.map(str::trim).unwrap_or("");
    let neutral = format!("+0{}", unit);
    if raw.is_empty() {
        return neutral;
    }

    let (sign, rest) = match raw.chars().next() {
        Some('+') => ("+", &raw[1..]),
        Some('-') => ("-", &raw[1..]),
        _ => ("+", raw),
    };
    let number = rest.strip_suffix(unit).unwrap_or(rest).trim();

    match number.parse::<f64>() {
        Ok(parsed) if !parsed.is_finite() => {
            log::warn!("Ignoring non-finite adjustment '{}'", raw);
            neutral
        }
        Ok(parsed) if parsed == 0.0 => neutral,
        Ok(_) => format!("{}{}{}", sign, number, unit),
        Err(_) => raw.to_string(),
    }
}
