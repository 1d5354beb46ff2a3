//! Вспомогательные модули

pub mod ffmpeg;
pub mod files;
pub mod logger;
pub mod scratch;

pub use logger::init_logger;
pub use scratch::ScratchDir;
