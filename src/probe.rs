//! Media metadata extraction
//!
//! Two sources feed the same [`MediaInfo`] record:
//!
//! - **Structured**: `ffprobe -print_format json`, deserialized into typed structs.
//! - **Diagnostic**: the human-readable banner `ffmpeg -i <file>` prints on stderr.
//!   Only three lines are kept (see [`RawInfo`]) and each field is pulled out with
//!   a regular expression. A field whose pattern does not match falls back to a
//!   zero/"unknown" sentinel instead of failing.

use crate::error::Result;
use crate::ffmpeg::Toolchain;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Codec name reported when the stream line does not reveal one.
pub const UNKNOWN_CODEC: &str = "unknown";

static INFO_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*(Duration:|Stream).+").unwrap());
static DURATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Duration:\s+([:.\d]+),").unwrap());
static START: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)start:\s+([:.\d]+),").unwrap());
static BITRATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)bitrate:\s+(\d+)\s+kb/s").unwrap());
static VIDEO_CODEC: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Video:\s+(\w+)(\s+\(.+)?,").unwrap());
static RESOLUTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i),\s+([\dx]+)\s*(,|\[SAR)").unwrap());
static FPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i),\s+(\d+)\s+fps,").unwrap());
static AUDIO_CODEC: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Audio:\s+(\w+)(\s+\(.+)?,").unwrap());
static SAMPLE_RATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i),\s+(\d+)\s+Hz,").unwrap());
static AUDIO_BITRATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i),\s+(\d+)\s+kb/s").unwrap());
static STEREO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i),\s+stereo,").unwrap());

/// Where metadata comes from when a [`crate::Video`] is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    /// ffprobe JSON report.
    #[default]
    Structured,
    /// Regex scraping of the ffmpeg banner.
    Diagnostic,
}

/// Parsed media metadata. Bitrates are kb/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration: f64,
    pub start: f64,
    pub bitrate: u32,
    pub video_codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub audio_codec: String,
    pub sample_rate: u32,
    pub audio_bitrate: u32,
    pub stereo: bool,
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            duration: 0.0,
            start: 0.0,
            bitrate: 0,
            video_codec: UNKNOWN_CODEC.to_string(),
            width: 0,
            height: 0,
            fps: 0,
            audio_codec: UNKNOWN_CODEC.to_string(),
            sample_rate: 0,
            audio_bitrate: 0,
            stereo: false,
        }
    }
}

/// The three banner lines metadata is scraped from.
///
/// Lines are picked by role rather than position: the first `Duration:` line,
/// the first video `Stream` line and the first audio `Stream` line. A role
/// that never shows up stays empty, so its fields degrade to sentinels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInfo {
    pub format: String,
    pub video: String,
    pub audio: String,
}

impl RawInfo {
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut raw = RawInfo::default();

        for line in lines.into_iter().filter(|l| INFO_LINE.is_match(l)) {
            let lower = line.to_ascii_lowercase();
            let slot = if lower.trim_start().starts_with("duration:") {
                &mut raw.format
            } else if lower.contains("video:") {
                &mut raw.video
            } else if lower.contains("audio:") {
                &mut raw.audio
            } else {
                continue;
            };
            if slot.is_empty() {
                *slot = line.to_string();
            }
        }

        if raw.format.is_empty() || raw.video.is_empty() || raw.audio.is_empty() {
            warn!(
                "Diagnostic output incomplete (format: {}, video: {}, audio: {})",
                !raw.format.is_empty(),
                !raw.video.is_empty(),
                !raw.audio.is_empty()
            );
        }

        raw
    }

    /// `[format, video, audio]`
    pub fn lines(&self) -> [&str; 3] {
        [&self.format, &self.video, &self.audio]
    }

    /// Total seconds from `Duration: HH:MM:SS.ss,`
    pub fn duration(&self) -> f64 {
        capture(&DURATION, &self.format)
            .map(|d| {
                d.split(':')
                    .fold(0.0, |acc, part| acc * 60.0 + part.parse::<f64>().unwrap_or(0.0))
            })
            .unwrap_or(0.0)
    }

    pub fn start(&self) -> f64 {
        capture(&START, &self.format)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0)
    }

    pub fn bitrate(&self) -> u32 {
        parse_u32(capture(&BITRATE, &self.format))
    }

    pub fn video_codec(&self) -> String {
        capture(&VIDEO_CODEC, &self.video)
            .unwrap_or(UNKNOWN_CODEC)
            .to_string()
    }

    pub fn resolution(&self) -> (u32, u32) {
        capture(&RESOLUTION, &self.video)
            .and_then(|r| r.split_once('x'))
            .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)))
            .unwrap_or((0, 0))
    }

    pub fn fps(&self) -> u32 {
        parse_u32(capture(&FPS, &self.video))
    }

    pub fn audio_codec(&self) -> String {
        capture(&AUDIO_CODEC, &self.audio)
            .unwrap_or(UNKNOWN_CODEC)
            .to_string()
    }

    pub fn sample_rate(&self) -> u32 {
        parse_u32(capture(&SAMPLE_RATE, &self.audio))
    }

    pub fn audio_bitrate(&self) -> u32 {
        parse_u32(capture(&AUDIO_BITRATE, &self.audio))
    }

    pub fn is_stereo(&self) -> bool {
        STEREO.is_match(&self.audio)
    }

    pub fn to_media_info(&self) -> MediaInfo {
        let (width, height) = self.resolution();
        MediaInfo {
            duration: self.duration(),
            start: self.start(),
            bitrate: self.bitrate(),
            video_codec: self.video_codec(),
            width,
            height,
            fps: self.fps(),
            audio_codec: self.audio_codec(),
            sample_rate: self.sample_rate(),
            audio_bitrate: self.audio_bitrate(),
            stereo: self.is_stereo(),
        }
    }
}

fn capture<'a>(re: &Regex, line: &'a str) -> Option<&'a str> {
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn parse_u32(value: Option<&str>) -> u32 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    start_time: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    bit_rate: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
}

/// Parse `ffprobe -show_format -show_streams -print_format json` output.
pub fn parse_probe_json(json: &str) -> std::result::Result<MediaInfo, serde_json::Error> {
    let output: ProbeOutput = serde_json::from_str(json)?;
    let mut info = MediaInfo::default();

    if let Some(format) = &output.format {
        info.duration = parse_f64(format.duration.as_deref());
        info.start = parse_f64(format.start_time.as_deref());
        info.bitrate = kbps(format.bit_rate.as_deref());
    }

    let first_of = |kind: &str| {
        output
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some(kind))
    };

    if let Some(video) = first_of("video") {
        if let Some(name) = &video.codec_name {
            info.video_codec = name.clone();
        }
        info.width = video.width.unwrap_or(0);
        info.height = video.height.unwrap_or(0);
        info.fps = video
            .avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate))
            .map(|r| r.round() as u32)
            .unwrap_or(0);
    }

    if let Some(audio) = first_of("audio") {
        if let Some(name) = &audio.codec_name {
            info.audio_codec = name.clone();
        }
        info.sample_rate = audio
            .sample_rate
            .as_deref()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        info.audio_bitrate = kbps(audio.bit_rate.as_deref());
        info.stereo = match audio.channel_layout.as_deref() {
            Some(layout) => layout.eq_ignore_ascii_case("stereo"),
            None => audio.channels == Some(2),
        };
    }

    Ok(info)
}

fn parse_f64(value: Option<&str>) -> f64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0.0)
}

fn kbps(bits_per_second: Option<&str>) -> u32 {
    bits_per_second
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|bps| (bps / 1000) as u32)
        .unwrap_or(0)
}

/// `"24000/1001"` -> 23.976; `"0/0"` -> None
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 || num == 0.0 {
        return None;
    }
    Some(num / den)
}

/// Result of probing one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub info: MediaInfo,
    /// Only populated in [`ProbeMode::Diagnostic`].
    pub raw: Option<RawInfo>,
}

/// Run the configured probe against `path`.
pub fn probe_file(path: &Path, toolchain: &Toolchain) -> Result<Probe> {
    match toolchain.config().probe_mode {
        ProbeMode::Structured => {
            let output = toolchain
                .ffprobe()
                .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
                .input(path)
                .execute(toolchain.runner())?;
            let info = parse_probe_json(&output.stdout)?;
            debug!("Probed {}: {:?}", path.display(), info);
            Ok(Probe { info, raw: None })
        }
        ProbeMode::Diagnostic => {
            // ffmpeg exits non-zero when given no output file, so the status is not checked
            let output = toolchain.ffmpeg().input(path).run(toolchain.runner())?;
            let raw = RawInfo::from_lines(output.lines());
            let info = raw.to_media_info();
            debug!("Probed {}: {:?}", path.display(), info);
            Ok(Probe { info, raw: Some(raw) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANNER: &str = "\
ffmpeg version 6.0 Copyright (c) 2000-2023 the FFmpeg developers
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'clip.mp4':
  Metadata:
    major_brand     : isom
  Duration: 00:01:30.50, start: 0.000000, bitrate: 128 kb/s
  Stream #0:0: Video: h264 (High), 1920x1080 [SAR 1:1 DAR 16:9], 24 fps, 24 tbr, 12288 tbn
  Stream #0:1: Audio: aac, 44100 Hz, stereo, fltp, 96 kb/s
At least one output file must be specified";

    fn banner_info() -> RawInfo {
        RawInfo::from_lines(BANNER.lines())
    }

    #[test]
    fn test_format_line_fields() {
        let raw = banner_info();
        assert_eq!(raw.duration(), 90.5);
        assert_eq!(raw.start(), 0.0);
        assert_eq!(raw.bitrate(), 128);
    }

    #[test]
    fn test_video_line_fields() {
        let raw = banner_info();
        assert_eq!(raw.video_codec(), "h264");
        assert_eq!(raw.resolution(), (1920, 1080));
        assert_eq!(raw.fps(), 24);
    }

    #[test]
    fn test_audio_line_fields() {
        let raw = banner_info();
        assert_eq!(raw.audio_codec(), "aac");
        assert_eq!(raw.sample_rate(), 44100);
        assert_eq!(raw.audio_bitrate(), 96);
        assert!(raw.is_stereo());
    }

    #[test]
    fn test_only_info_lines_are_kept() {
        let raw = banner_info();
        assert!(raw.format.trim_start().starts_with("Duration:"));
        assert!(raw.video.contains("Video:"));
        assert!(raw.audio.contains("Audio:"));
        assert_eq!(raw.lines().len(), 3);
    }

    #[test]
    fn test_resolution_before_comma() {
        let raw = RawInfo {
            video: "  Stream #0:0: Video: vp9, yuv420p, 640x360, 30 fps, 30 tbr".to_string(),
            ..Default::default()
        };
        assert_eq!(raw.resolution(), (640, 360));
        assert_eq!(raw.video_codec(), "vp9");
        assert_eq!(raw.fps(), 30);
    }

    #[test]
    fn test_missing_lines_fall_back_to_sentinels() {
        let raw = RawInfo::from_lines("No such file or directory".lines());
        let info = raw.to_media_info();
        assert_eq!(info, MediaInfo::default());
        assert_eq!(info.video_codec, UNKNOWN_CODEC);
        assert_eq!(info.audio_codec, UNKNOWN_CODEC);
        assert!(!info.stereo);
    }

    #[test]
    fn test_mono_and_fractional_fps_do_not_match() {
        let raw = RawInfo {
            video: "  Stream #0:0: Video: h264, 1280x720, 23.98 fps, 23.98 tbr".to_string(),
            audio: "  Stream #0:1: Audio: mp3, 22050 Hz, mono, s16p".to_string(),
            ..Default::default()
        };
        assert_eq!(raw.fps(), 0);
        assert!(!raw.is_stereo());
        assert_eq!(raw.audio_bitrate(), 0);
        assert_eq!(raw.sample_rate(), 22050);
    }

    #[test]
    fn test_audio_first_container_keeps_roles() {
        let lines = [
            "  Duration: 00:00:10.00, start: 1.500000, bitrate: 800 kb/s",
            "  Stream #0:0: Audio: opus, 48000 Hz, stereo, fltp",
            "  Stream #0:1: Video: vp9 (Profile 0), 854x480, 25 fps, 25 tbr",
        ];
        let raw = RawInfo::from_lines(lines);
        assert_eq!(raw.audio_codec(), "opus");
        assert_eq!(raw.video_codec(), "vp9");
        assert_eq!(raw.start(), 1.5);
        assert_eq!(raw.resolution(), (854, 480));
    }

    #[test]
    fn test_parse_probe_json() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                 "avg_frame_rate": "24000/1001", "r_frame_rate": "24000/1001"},
                {"codec_type": "audio", "codec_name": "aac", "sample_rate": "44100",
                 "channels": 2, "channel_layout": "stereo", "bit_rate": "128000"}
            ],
            "format": {"duration": "90.500000", "start_time": "0.000000", "bit_rate": "1500000"}
        }"#;

        let info = parse_probe_json(json).unwrap();
        assert_eq!(info.duration, 90.5);
        assert_eq!(info.start, 0.0);
        assert_eq!(info.bitrate, 1500);
        assert_eq!(info.video_codec, "h264");
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.fps, 24);
        assert_eq!(info.audio_codec, "aac");
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.audio_bitrate, 128);
        assert!(info.stereo);
    }

    #[test]
    fn test_parse_probe_json_without_streams() {
        let info = parse_probe_json(r#"{"format": {"duration": "3.0"}}"#).unwrap();
        assert_eq!(info.duration, 3.0);
        assert_eq!(info.video_codec, UNKNOWN_CODEC);
        assert_eq!(info.fps, 0);
    }

    #[test]
    fn test_parse_probe_json_falls_back_to_r_frame_rate() {
        let json = r#"{"streams": [{"codec_type": "video", "avg_frame_rate": "0/0", "r_frame_rate": "30/1"}]}"#;
        assert_eq!(parse_probe_json(json).unwrap().fps, 30);
    }

    #[test]
    fn test_parse_probe_json_rejects_garbage() {
        assert!(parse_probe_json("not json").is_err());
    }
}
