use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output container selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Mp4,
    Avi,
    Webm,
    Gif,
}

/// Encoder used when frames are written straight into the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectCodec {
    /// ffmpeg `-c:v` value
    pub codec: &'static str,
    /// Optional fourcc (`-vtag`)
    pub tag: Option<&'static str>,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Mp4,
        ExportFormat::Avi,
        ExportFormat::Webm,
        ExportFormat::Gif,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Mp4 => "mp4",
            ExportFormat::Avi => "avi",
            ExportFormat::Webm => "webm",
            ExportFormat::Gif => "gif",
        }
    }

    /// GIF never carries audio and is encoded in-process.
    pub fn is_animated_image(self) -> bool {
        self == ExportFormat::Gif
    }

    pub fn direct_codec(self) -> Option<DirectCodec> {
        match self {
            ExportFormat::Mp4 => Some(DirectCodec {
                codec: "mpeg4",
                tag: None,
            }),
            ExportFormat::Avi => Some(DirectCodec {
                codec: "mpeg4",
                tag: Some("XVID"),
            }),
            ExportFormat::Webm => Some(DirectCodec {
                codec: "libvpx",
                tag: None,
            }),
            ExportFormat::Gif => None,
        }
    }

    /// `(video, audio)` codec selectors for the mux step.
    pub fn mux_codecs(self) -> Option<(&'static str, &'static str)> {
        match self {
            ExportFormat::Mp4 => Some(("libx264", "aac")),
            ExportFormat::Avi => Some(("mpeg4", "libmp3lame")),
            ExportFormat::Webm => Some(("libvpx", "libopus")),
            ExportFormat::Gif => None,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('.').to_lowercase();
        ExportFormat::ALL
            .into_iter()
            .find(|f| f.extension() == wanted)
            .ok_or_else(|| format!("unsupported export format: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extensions_case_insensitively() {
        assert_eq!("MP4".parse::<ExportFormat>(), Ok(ExportFormat::Mp4));
        assert_eq!(".gif".parse::<ExportFormat>(), Ok(ExportFormat::Gif));
        assert!("mkv".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn gif_has_no_ffmpeg_codecs() {
        assert!(ExportFormat::Gif.is_animated_image());
        assert_eq!(ExportFormat::Gif.direct_codec(), None);
        assert_eq!(ExportFormat::Gif.mux_codecs(), None);
    }

    #[test]
    fn codec_selectors() {
        assert_eq!(ExportFormat::Avi.direct_codec().and_then(|c| c.tag), Some("XVID"));
        assert_eq!(ExportFormat::Mp4.mux_codecs(), Some(("libx264", "aac")));
        assert_eq!(ExportFormat::Webm.mux_codecs(), Some(("libvpx", "libopus")));
        for format in ExportFormat::ALL {
            assert_eq!(format.is_animated_image(), format.direct_codec().is_none());
        }
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&ExportFormat::Webm).unwrap(), "\"webm\"");
        let parsed: ExportFormat = serde_json::from_str("\"avi\"").unwrap();
        assert_eq!(parsed, ExportFormat::Avi);
    }
}
