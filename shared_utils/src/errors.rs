use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmartError {
    #[error("Unknown encoder: {name}. Available: {available}")]
    UnknownEncoder { name: String, available: String },

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Input file missing: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("Path is not valid UTF-8 and cannot be passed to ffmpeg: {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("FFprobe failed: {0}")]
    FFprobeError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SmartError>;
