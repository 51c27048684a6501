//! video_probe - ffmpeg-backed video metadata and transcoding
//!
//! Wraps a single media file: probes it once through `ffprobe` (or by scraping
//! the `ffmpeg -i` banner), exposes the metadata, and derives new files by
//! re-encoding, grabbing frames and building thumbnails.
//! All operations shell out to the system `ffmpeg` binary (no linking).

mod error;
mod ffmpeg;
mod format;
mod nonblocking;
mod probe;
mod thumbnail;
mod video;

pub use error::{Result, VideoError};
pub use ffmpeg::{is_installed, FfmpegCommand, FfmpegError, SystemRunner, ToolConfig, ToolOutput, ToolRunner, Toolchain};
pub use format::ContainerFormat;
pub use probe::{parse_probe_json, MediaInfo, ProbeMode, RawInfo, UNKNOWN_CODEC};
pub use thumbnail::{fit_dimensions, ImageBackend, ResizeBackend};
pub use video::{persistent_path, EncodeOptions, Video, DEFAULT_SCREENSHOT_OFFSET, DEFAULT_THUMBNAIL_BOUND};
