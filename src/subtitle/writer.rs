//! Генерация файлов субтитров из временной шкалы

use std::fmt::Write as _;
use std::path::Path;
use crate::config::SubtitleFormat;
use crate::error::{EdgeVoiceError, Result};
use super::timeline::TimingMap;

/// Форматирование времени `HH:MM:SS{sep}mmm`
fn format_timestamp(ms: u64, separator: char) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{:02}:{:02}:{:02}{}{:03}", hours, minutes, seconds, separator, millis)
}

/// SubRip
pub fn render_srt(map: &TimingMap) -> String {
    let mut out = String::new();
    for (i, cue) in map.cues.iter().filter(|cue| !cue.part.trim().is_empty()).enumerate() {
        let _ = writeln!(out, "{}", i + 1);
        let _ = writeln!(
            out,
            "{} --> {}",
            format_timestamp(cue.start, ','),
            format_timestamp(cue.end, ',')
        );
        let _ = writeln!(out, "{}", cue.part.trim());
        out.push('\n');
    }
    out
}

/// WebVTT
pub fn render_vtt(map: &TimingMap) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for cue in map.cues.iter().filter(|cue| !cue.part.trim().is_empty()) {
        let _ = writeln!(
            out,
            "{} --> {}",
            format_timestamp(cue.start, '.'),
            format_timestamp(cue.end, '.')
        );
        let _ = writeln!(out, "{}", cue.part.trim());
        out.push('\n');
    }
    out
}

pub fn render(map: &TimingMap, format: SubtitleFormat) -> String {
    match format {
        SubtitleFormat::Srt => render_srt(map),
        SubtitleFormat::Vtt => render_vtt(map),
    }
}

/// Прочитать объединенную шкалу и записать файл субтитров
pub async fn emit_subtitle(timing_path: &Path, output: &Path, format: SubtitleFormat) -> Result<()> {
    let map = TimingMap::load(timing_path)
        .await
        .map_err(|e| EdgeVoiceError::Subtitle(format!("cannot read {}: {}", timing_path.display(), e)))?;
    tokio::fs::write(output, render(&map, format))
        .await
        .map_err(|e| EdgeVoiceError::Subtitle(format!("cannot write {}: {}", output.display(), e)))?;
    log::debug!("Subtitle written to {}", output.display());
    Ok(())
}
