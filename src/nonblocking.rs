//! Async variants that keep ffmpeg off the calling task
//!
//! Each call moves a clone of the [`Video`] onto tokio's blocking pool and
//! resolves once the result is fully materialized.

use crate::error::{Result, VideoError};
use crate::ffmpeg::Toolchain;
use crate::video::{EncodeOptions, Video};
use std::path::PathBuf;

async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| VideoError::Task(e.to_string()))?
}

impl Video {
    pub async fn open_async(path: impl Into<PathBuf>, toolchain: Toolchain) -> Result<Video> {
        let path = path.into();
        run_blocking(move || Video::open_with(path, &toolchain)).await
    }

    pub async fn encode_async(&self, options: EncodeOptions) -> Result<Video> {
        let video = self.clone();
        run_blocking(move || video.encode(&options)).await
    }

    pub async fn convert_async(&self, format: String, persistent_dir: Option<PathBuf>) -> Result<Video> {
        let video = self.clone();
        run_blocking(move || video.convert(&format, persistent_dir.as_deref())).await
    }

    pub async fn screenshot_async(&self, offset: f64) -> Result<Vec<u8>> {
        let video = self.clone();
        run_blocking(move || video.screenshot(offset)).await
    }

    pub async fn screenshot_file_async(&self, offset: f64) -> Result<PathBuf> {
        let video = self.clone();
        run_blocking(move || video.screenshot_file(offset)).await
    }

    pub async fn thumbnail_async(&self, bound: u32) -> Result<Vec<u8>> {
        let video = self.clone();
        run_blocking(move || video.thumbnail(bound)).await
    }
}
