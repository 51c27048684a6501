use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Unknown format '{0}' provided")]
    UnsupportedFormat(String),

    #[error("Invalid probe output: {0}")]
    Probe(#[from] serde_json::Error),

    #[error("Image processing failed: {0}")]
    Image(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] crate::ffmpeg::FfmpegError),
}

pub type Result<T> = std::result::Result<T, VideoError>;
