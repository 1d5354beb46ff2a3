//! Определение языка текста по письменности
//!
//! Детектор считает символы каждой письменности и выбирает преобладающую.
//! Коды языков — ISO 639-3.

use std::collections::HashMap;
use crate::error::ValidationError;

/// Язык по умолчанию, для которого допустимы английские голоса
pub const DEFAULT_LANGUAGE: &str = "eng";
/// Язык не определен (нет букв)
pub const UNDETERMINED: &str = "und";

/// Детектор языка исходного текста
pub trait LanguageDetector: Send + Sync {
    /// Вернуть ISO 639-3 код языка
    fn detect(&self, text: &str) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Script {
    Latin,
    Han,
    Kana,
    Hangul,
    Cyrillic,
    Arabic,
    Devanagari,
    Thai,
    Greek,
    Hebrew,
    Other,
}

/// Детектор на основе письменности
#[derive(Debug, Clone)]
pub struct ScriptDetector {
    script_to_language: HashMap<Script, &'static str>,
}

impl ScriptDetector {
    pub fn new() -> Self {
        let mut map = HashMap::new();
        map.insert(Script::Latin, "eng");
        map.insert(Script::Han, "cmn");
        map.insert(Script::Kana, "jpn");
        map.insert(Script::Hangul, "kor");
        map.insert(Script::Cyrillic, "rus");
        map.insert(Script::Arabic, "arb");
        map.insert(Script::Devanagari, "hin");
        map.insert(Script::Thai, "tha");
        map.insert(Script::Greek, "ell");
        map.insert(Script::Hebrew, "heb");

        Self { script_to_language: map }
    }

    fn char_to_script(c: char) -> Script {
        match c as u32 {
            0x0041..=0x005A | 0x0061..=0x007A | 0x00C0..=0x024F | 0x1E00..=0x1EFF => Script::Latin,
            0x0370..=0x03FF => Script::Greek,
            0x0400..=0x04FF => Script::Cyrillic,
            0x0590..=0x05FF => Script::Hebrew,
            0x0600..=0x06FF | 0x0750..=0x077F => Script::Arabic,
            0x0900..=0x097F => Script::Devanagari,
            0x0E00..=0x0E7F => Script::Thai,
            0x3040..=0x30FF => Script::Kana,
            0x1100..=0x11FF | 0xAC00..=0xD7AF => Script::Hangul,
            0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF => Script::Han,
            _ => Script::Other,
        }
    }
}

impl Default for ScriptDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageDetector for ScriptDetector {
    fn detect(&self, text: &str) -> String {
        let mut counts: HashMap<Script, usize> = HashMap::new();
        for c in text.chars() {
            if !c.is_alphabetic() {
                continue;
            }
            let script = Self::char_to_script(c);
            if script != Script::Other {
                *counts.entry(script).or_insert(0) += 1;
            }
        }

        // Японский текст почти всегда содержит кандзи; любая кана означает японский
        if counts.get(&Script::Kana).copied().unwrap_or(0) > 0 {
            return "jpn".to_string();
        }

        counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .and_then(|(script, _)| self.script_to_language.get(&script).copied())
            .unwrap_or(UNDETERMINED)
            .to_string()
    }
}

/// Проверить, что выбранный голос подходит для языка текста
///
/// Английский голос для неанглийского текста считается ошибкой валидации.
pub fn validate_lang_and_voice(lang: &str, voice: &str) -> Result<(), ValidationError> {
    if lang != DEFAULT_LANGUAGE && lang != UNDETERMINED && voice.starts_with("en") {
        return Err(ValidationError::LanguageMismatch {
            detected: lang.to_string(),
            voice: voice.to_string(),
        });
    }
    Ok(())
}
