//! Модуль для работы с медиафайлами

pub mod concat;

pub use concat::{AudioConcatenator, FfmpegConcatenator};
