//! Временные шкалы сегментов
//!
//! Каждый аудиофайл сегмента сопровождается файлом `{audio}.json` с фразами и
//! их временем в миллисекундах. Объединение сдвигает шкалу сегмента `k` на
//! суммарную длительность сегментов `0..k`.

use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::utils::files::{read_json, write_json};

/// Фраза с временем начала и конца, мс
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingCue {
    pub part: String,
    pub start: u64,
    pub end: u64,
}

impl TimingCue {
    pub fn new(part: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            part: part.into(),
            start,
            end: end.max(start),
        }
    }

    fn shifted(&self, offset: u64) -> Self {
        Self {
            part: self.part.clone(),
            start: self.start + offset,
            end: self.end + offset,
        }
    }
}

/// Временная шкала одного аудиофайла
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingMap {
    /// Длительность аудио, если известна
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub cues: Vec<TimingCue>,
}

impl TimingMap {
    pub fn new(duration: Option<u64>, cues: Vec<TimingCue>) -> Self {
        Self { duration, cues }
    }

    /// Шкала из одной фразы на всю длительность
    pub fn single_cue(text: &str, duration: Option<u64>) -> Self {
        let end = duration.unwrap_or(0);
        Self {
            duration,
            cues: vec![TimingCue::new(text.trim(), 0, end)],
        }
    }

    /// Длительность сегмента для расчета смещения следующего
    pub fn segment_duration(&self) -> u64 {
        self.duration
            .or_else(|| self.cues.iter().map(|cue| cue.end).max())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub async fn load(path: &Path) -> Result<Self> {
        read_json(path).await
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self).await
    }
}

/// Объединить шкалы сегментов в одну
pub fn merge_timelines(maps: &[TimingMap]) -> TimingMap {
    let mut offset = 0u64;
    let mut cues = Vec::with_capacity(maps.iter().map(|map| map.cues.len()).sum());

    for map in maps {
        cues.extend(map.cues.iter().map(|cue| cue.shifted(offset)));
        offset += map.segment_duration();
    }

    TimingMap {
        duration: Some(offset),
        cues,
    }
}

/// Загрузить шкалы в заданном порядке и объединить
///
/// Отсутствующий или поврежденный файл дает пустую шкалу сегмента с предупреждением.
pub async fn merge_timing_files(paths: &[impl AsRef<Path>]) -> TimingMap {
    let mut maps = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        match TimingMap::load(path).await {
            Ok(map) => maps.push(map),
            Err(e) => {
                log::warn!("Skipping timing map {}: {}", path.display(), e);
                maps.push(TimingMap::default());
            }
        }
    }
    merge_timelines(&maps)
}
