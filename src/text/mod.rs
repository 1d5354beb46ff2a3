//! Модуль для работы с текстом
//!
//! Нормализация параметров синтеза, сегментация и определение языка.

pub mod params;
pub mod segmenter;
pub mod language;

pub use params::{NormalizedParams, SynthesisParams, NEUTRAL_HZ, NEUTRAL_PERCENT};
pub use segmenter::{split_text, SplitResult};
pub use language::{validate_lang_and_voice, LanguageDetector, ScriptDetector};
