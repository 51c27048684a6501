//! Video file facade backed by ffmpeg
//!
//! A [`Video`] is probed once when opened and is read-only afterwards. Every
//! derived operation (re-encode, screenshot, thumbnail) spawns a fresh ffmpeg
//! process and hands back a new value; the original is never touched.

use crate::error::{Result, VideoError};
use crate::ffmpeg::{FfmpegCommand, Toolchain};
use crate::format::ContainerFormat;
use crate::probe::{self, MediaInfo, RawInfo};
use crate::thumbnail::{ImageBackend, ResizeBackend};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info, warn};

/// Screenshot position in seconds; negative values count back from the end.
pub const DEFAULT_SCREENSHOT_OFFSET: f64 = -4.0;
/// Thumbnails larger than this square are scaled down to fit it.
pub const DEFAULT_THUMBNAIL_BOUND: u32 = 200;

const ENCODE_TMP_PREFIX: &str = "video_format_implicit_tmpfile_";
const CONVERT_TMP_PREFIX: &str = "video_format_tmpfile_";
const SCREENSHOT_TMP_PREFIX: &str = "videoScreenshot_";

/// Target of a generic re-encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOptions {
    pub extension: String,
    pub video_codec: String,
    pub audio_codec: String,
    /// Passed to ffmpeg verbatim, before the codec selection.
    pub extra_args: Vec<String>,
    /// Adds `-strict experimental`.
    pub strict_experimental: bool,
    /// Reuse-able output directory; `None` writes to a fresh temp file.
    pub persistent_dir: Option<PathBuf>,
}

impl EncodeOptions {
    pub fn new(
        extension: impl Into<String>,
        video_codec: impl Into<String>,
        audio_codec: impl Into<String>,
    ) -> Self {
        Self {
            extension: extension.into(),
            video_codec: video_codec.into(),
            audio_codec: audio_codec.into(),
            extra_args: Vec::new(),
            strict_experimental: false,
            persistent_dir: None,
        }
    }

    pub fn extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_experimental = strict;
        self
    }

    pub fn persist_in(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persistent_dir = Some(dir.into());
        self
    }
}

enum Destination {
    /// Output from an earlier run in the persistent directory.
    Existing(PathBuf),
    Fresh(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Video {
    path: PathBuf,
    info: MediaInfo,
    raw_info: Option<RawInfo>,
    toolchain: Toolchain,
}

impl Video {
    /// Open with the system `ffmpeg`/`ffprobe` and default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &Toolchain::default())
    }

    pub fn open_with(path: impl AsRef<Path>, toolchain: &Toolchain) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(VideoError::SourceNotFound(path));
        }

        let probe = probe::probe_file(&path, toolchain)?;

        Ok(Self {
            path,
            info: probe.info,
            raw_info: probe.raw,
            toolchain: toolchain.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-only handle on the media bytes.
    pub fn open_read(&self) -> std::io::Result<File> {
        File::open(&self.path)
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    /// Captured banner lines, when probed in diagnostic mode.
    pub fn raw_info(&self) -> Option<&RawInfo> {
        self.raw_info.as_ref()
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Seconds.
    pub fn duration(&self) -> f64 {
        self.info.duration
    }

    /// Seconds.
    pub fn start(&self) -> f64 {
        self.info.start
    }

    /// Overall bitrate in kb/s.
    pub fn video_bitrate(&self) -> u32 {
        self.info.bitrate
    }

    pub fn video_codec(&self) -> &str {
        &self.info.video_codec
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn fps(&self) -> u32 {
        self.info.fps
    }

    pub fn audio_codec(&self) -> &str {
        &self.info.audio_codec
    }

    /// Hz.
    pub fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    /// kb/s.
    pub fn audio_bitrate(&self) -> u32 {
        self.info.audio_bitrate
    }

    pub fn is_stereo(&self) -> bool {
        self.info.stereo
    }

    /// Value for an HTML5 `<source type=...>` attribute, e.g. `video/mp4`.
    pub fn html5_source_type(&self) -> String {
        let extension = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        format!("video/{}", extension)
    }

    /// Re-encode with explicit codecs.
    pub fn encode(&self, options: &EncodeOptions) -> Result<Video> {
        let destination = match self.destination(
            &options.extension,
            options.persistent_dir.as_deref(),
            ENCODE_TMP_PREFIX,
        )? {
            Destination::Existing(path) => return self.reuse(path),
            Destination::Fresh(path) => path,
        };

        let mut cmd = self.toolchain.ffmpeg().overwrite().input(&self.path);
        if options.strict_experimental {
            cmd = cmd.args(["-strict", "experimental"]);
        }
        let cmd = cmd
            .args(options.extra_args.iter().cloned())
            .args(["-c:v".to_string(), options.video_codec.to_lowercase()])
            .args(["-c:a".to_string(), options.audio_codec.to_lowercase()])
            .output(&destination);

        self.transcode(cmd, destination)
    }

    /// Re-encode into one of the [`ContainerFormat`]s with its default codecs.
    pub fn convert(&self, format: &str, persistent_dir: Option<&Path>) -> Result<Video> {
        let format: ContainerFormat = format.parse()?;

        let destination = match self.destination(format.as_str(), persistent_dir, CONVERT_TMP_PREFIX)? {
            Destination::Existing(path) => return self.reuse(path),
            Destination::Fresh(path) => path,
        };

        let cmd = self
            .toolchain
            .ffmpeg()
            .overwrite()
            .input(&self.path)
            .output(&destination);

        self.transcode(cmd, destination)
    }

    /// Encoded frame at `offset` seconds. No file is left behind.
    pub fn screenshot(&self, offset: f64) -> Result<Vec<u8>> {
        let frame = self.capture_frame(offset)?;
        Ok(fs::read(&frame)?)
    }

    /// Frame at `offset` seconds written to a temp file the caller now owns.
    pub fn screenshot_file(&self, offset: f64) -> Result<PathBuf> {
        let frame = self.capture_frame(offset)?;
        Ok(frame.keep().map_err(|e| e.error)?)
    }

    /// Frame from near the end, scaled down to fit `bound`×`bound`.
    ///
    /// [`DEFAULT_THUMBNAIL_BOUND`] is the usual bound; see [`Video::thumbnail_default`].
    pub fn thumbnail(&self, bound: u32) -> Result<Vec<u8>> {
        self.thumbnail_with(&ResizeBackend::default(), bound, |bytes| bytes)
    }

    /// Thumbnail bounded by [`DEFAULT_THUMBNAIL_BOUND`].
    pub fn thumbnail_default(&self) -> Result<Vec<u8>> {
        self.thumbnail(DEFAULT_THUMBNAIL_BOUND)
    }

    /// Like [`Video::thumbnail`], with a custom image backend and a
    /// post-processing step applied before the frame file is released.
    pub fn thumbnail_with<B, F>(&self, backend: &B, bound: u32, transform: F) -> Result<Vec<u8>>
    where
        B: ImageBackend + ?Sized,
        F: FnOnce(Vec<u8>) -> Vec<u8>,
    {
        let frame = self.capture_frame(DEFAULT_SCREENSHOT_OFFSET)?;

        let (width, height) = backend.geometry(&frame)?;
        let bytes = if width > bound || height > bound {
            debug!("Scaling {}x{} frame to fit {}", width, height, bound);
            backend.fit_within(&frame, bound)?
        } else {
            fs::read(&frame)?
        };

        Ok(transform(bytes))
    }

    fn capture_frame(&self, offset: f64) -> Result<TempPath> {
        let frame = tempfile::Builder::new()
            .prefix(SCREENSHOT_TMP_PREFIX)
            .suffix(".jpg")
            .tempfile()?
            .into_temp_path();

        self.toolchain
            .ffmpeg()
            .overwrite()
            .args(seek_args(offset))
            .input(&self.path)
            .args(["-vframes", "1", "-an", "-f", "image2"])
            .output(&frame)
            .execute(self.toolchain.runner())?;

        Ok(frame)
    }

    fn destination(&self, extension: &str, persistent_dir: Option<&Path>, prefix: &str) -> Result<Destination> {
        match persistent_dir {
            Some(dir) => {
                let path = persistent_path(&self.path, dir, extension);
                if path.is_file() {
                    Ok(Destination::Existing(path))
                } else {
                    Ok(Destination::Fresh(path))
                }
            }
            None => {
                let path = tempfile::Builder::new()
                    .prefix(prefix)
                    .suffix(&format!(".{}", extension))
                    .tempfile()?
                    .into_temp_path()
                    .keep()
                    .map_err(|e| e.error)?;
                Ok(Destination::Fresh(path))
            }
        }
    }

    fn reuse(&self, path: PathBuf) -> Result<Video> {
        info!("Reusing existing output {}", path.display());
        Video::open_with(path, &self.toolchain)
    }

    fn transcode(&self, cmd: FfmpegCommand, destination: PathBuf) -> Result<Video> {
        if let Err(e) = cmd.execute(self.toolchain.runner()) {
            discard_output(&destination);
            return Err(e.into());
        }

        info!("Encoded {} -> {}", self.path.display(), destination.display());
        match Video::open_with(destination.clone(), &self.toolchain) {
            Ok(video) => Ok(video),
            Err(e) => {
                // Unreadable output would otherwise be reused or orphaned
                discard_output(&destination);
                Err(e)
            }
        }
    }
}

fn discard_output(path: &Path) {
    if path.exists() {
        warn!("Removing partial output {}", path.display());
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

/// Deterministic output path: `dir/<md5 of source path><stem>.<extension>`.
///
/// The key is the path string, not the file contents.
pub fn persistent_path(source: &Path, dir: &Path, extension: &str) -> PathBuf {
    let digest = md5::compute(source.to_string_lossy().as_bytes());
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join(format!("{:x}{}.{}", digest, stem, extension))
}

fn seek_args(offset: f64) -> [String; 2] {
    if offset < 0.0 {
        ["-sseof".to_string(), offset.to_string()]
    } else {
        ["-ss".to_string(), offset.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistent_path_replaces_extension() {
        let path = persistent_path(Path::new("/media/Holiday.AVI"), Path::new("/cache"), "mp4");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();

        assert_eq!(path.parent().unwrap(), Path::new("/cache"));
        assert!(name.ends_with("Holiday.mp4"), "{}", name);
        assert_eq!(name.len(), 32 + "Holiday.mp4".len());
        assert_eq!(&name[..32], format!("{:x}", md5::compute("/media/Holiday.AVI")));
    }

    #[test]
    fn test_persistent_path_is_keyed_by_source_path() {
        let dir = Path::new("/cache");
        let a = persistent_path(Path::new("/a/clip.avi"), dir, "webm");
        let b = persistent_path(Path::new("/b/clip.avi"), dir, "webm");

        assert_eq!(a, persistent_path(Path::new("/a/clip.avi"), dir, "webm"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_seek_args_pick_direction() {
        assert_eq!(seek_args(DEFAULT_SCREENSHOT_OFFSET), ["-sseof", "-4"]);
        assert_eq!(seek_args(2.5), ["-ss", "2.5"]);
        assert_eq!(seek_args(0.0), ["-ss", "0"]);
    }

    #[test]
    fn test_encode_options_builder() {
        let options = EncodeOptions::new("webm", "libvpx", "libvorbis")
            .extra_args(["-b:v", "1M"])
            .strict(true)
            .persist_in("/cache");

        assert_eq!(options.extra_args, ["-b:v", "1M"]);
        assert!(options.strict_experimental);
        assert_eq!(options.persistent_dir.as_deref(), Some(Path::new("/cache")));
    }

    #[test]
    fn test_open_missing_file() {
        let err = Video::open("/nonexistent/clip.mp4").unwrap_err();
        assert!(matches!(err, VideoError::SourceNotFound(_)));
    }
}
