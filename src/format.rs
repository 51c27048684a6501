//! Container formats accepted by the format-only conversion shortcut

use crate::error::VideoError;
use std::fmt;
use std::str::FromStr;

/// Formats ffmpeg can both demux and mux (`ffmpeg -formats | grep DE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    Mov,
    Webm,
    Mpg,
    Mp4,
    Avi,
    Flac,
    Flv,
    Mpeg,
    Ogv,
    Swf,
    Wmv,
    Mkv,
    ThreeGp,
    ThreeG2,
    Amc,
    H264,
    M2p,
    M4v,
    Moi,
    Mts,
    Vob,
    Xvid,
}

impl ContainerFormat {
    const ALL: [ContainerFormat; 22] = [
        ContainerFormat::Mov,
        ContainerFormat::Webm,
        ContainerFormat::Mpg,
        ContainerFormat::Mp4,
        ContainerFormat::Avi,
        ContainerFormat::Flac,
        ContainerFormat::Flv,
        ContainerFormat::Mpeg,
        ContainerFormat::Ogv,
        ContainerFormat::Swf,
        ContainerFormat::Wmv,
        ContainerFormat::Mkv,
        ContainerFormat::ThreeGp,
        ContainerFormat::ThreeG2,
        ContainerFormat::Amc,
        ContainerFormat::H264,
        ContainerFormat::M2p,
        ContainerFormat::M4v,
        ContainerFormat::Moi,
        ContainerFormat::Mts,
        ContainerFormat::Vob,
        ContainerFormat::Xvid,
    ];

    pub fn all() -> &'static [ContainerFormat] {
        &Self::ALL
    }

    /// File extension, also used as the ffmpeg output hint.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerFormat::Mov => "mov",
            ContainerFormat::Webm => "webm",
            ContainerFormat::Mpg => "mpg",
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Avi => "avi",
            ContainerFormat::Flac => "flac",
            ContainerFormat::Flv => "flv",
            ContainerFormat::Mpeg => "mpeg",
            ContainerFormat::Ogv => "ogv",
            ContainerFormat::Swf => "swf",
            ContainerFormat::Wmv => "wmv",
            ContainerFormat::Mkv => "mkv",
            ContainerFormat::ThreeGp => "3gp",
            ContainerFormat::ThreeG2 => "3g2",
            ContainerFormat::Amc => "amc",
            ContainerFormat::H264 => "h264",
            ContainerFormat::M2p => "m2p",
            ContainerFormat::M4v => "m4v",
            ContainerFormat::Moi => "moi",
            ContainerFormat::Mts => "mts",
            ContainerFormat::Vob => "vob",
            ContainerFormat::Xvid => "xvid",
        }
    }
}

impl FromStr for ContainerFormat {
    type Err = VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| VideoError::UnsupportedFormat(s.to_string()))
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_formats() {
        assert_eq!("mp4".parse::<ContainerFormat>().unwrap(), ContainerFormat::Mp4);
        assert_eq!("3gp".parse::<ContainerFormat>().unwrap(), ContainerFormat::ThreeGp);
        assert_eq!("MKV".parse::<ContainerFormat>().unwrap(), ContainerFormat::Mkv);
    }

    #[test]
    fn test_reject_unknown_format() {
        let err = "gif".parse::<ContainerFormat>().unwrap_err();
        assert!(matches!(err, VideoError::UnsupportedFormat(ref f) if f == "gif"));
        assert_eq!(err.to_string(), "Unknown format 'gif' provided");
    }

    #[test]
    fn test_every_format_round_trips_through_its_name() {
        assert_eq!(ContainerFormat::all().len(), 22);
        for format in ContainerFormat::all() {
            assert_eq!(format.as_str().parse::<ContainerFormat>().unwrap(), *format);
        }
    }
}
