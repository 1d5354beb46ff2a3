//! Модуль для работы с субтитрами
//!
//! Объединение временных шкал сегментов и генерация SRT/VTT.

pub mod timeline;
pub mod writer;

pub use timeline::{merge_timelines, merge_timing_files, TimingCue, TimingMap};
pub use writer::{emit_subtitle, render_srt, render_vtt};
