//! Media-domain enums and the probed source description.
//!
//! All enums serialize in lowercase (via `serde(rename_all = "lowercase")`)
//! and implement `Display` manually for consistent string representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// MediaType
// ---------------------------------------------------------------------------

/// The kind of library item being played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Episode,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie => write!(f, "movie"),
            Self::Episode => write!(f, "episode"),
        }
    }
}

// ---------------------------------------------------------------------------
// VideoCodec
// ---------------------------------------------------------------------------

/// Video codecs the planner understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Hevc,
    Av1,
    Vp9,
    Mpeg2,
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => write!(f, "h264"),
            Self::Hevc => write!(f, "hevc"),
            Self::Av1 => write!(f, "av1"),
            Self::Vp9 => write!(f, "vp9"),
            Self::Mpeg2 => write!(f, "mpeg2"),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioCodec
// ---------------------------------------------------------------------------

/// Audio codecs the planner understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Ac3,
    Eac3,
    Opus,
    Flac,
    #[serde(rename = "truehd")]
    TrueHd,
    Dts,
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aac => write!(f, "aac"),
            Self::Ac3 => write!(f, "ac3"),
            Self::Eac3 => write!(f, "eac3"),
            Self::Opus => write!(f, "opus"),
            Self::Flac => write!(f, "flac"),
            Self::TrueHd => write!(f, "truehd"),
            Self::Dts => write!(f, "dts"),
        }
    }
}

// ---------------------------------------------------------------------------
// HdrFormat
// ---------------------------------------------------------------------------

/// Dynamic-range metadata carried by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HdrFormat {
    Sdr,
    Hdr10,
    Hlg,
    #[serde(rename = "dolbyvision")]
    DolbyVision,
}

impl HdrFormat {
    /// Whether this format carries HDR metadata at all.
    pub fn is_hdr(&self) -> bool {
        !matches!(self, Self::Sdr)
    }
}

impl fmt::Display for HdrFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sdr => write!(f, "sdr"),
            Self::Hdr10 => write!(f, "hdr10"),
            Self::Hlg => write!(f, "hlg"),
            Self::DolbyVision => write!(f, "dolbyvision"),
        }
    }
}

// ---------------------------------------------------------------------------
// FieldOrder
// ---------------------------------------------------------------------------

/// Interlacing field order of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldOrder {
    Progressive,
    /// Top field first.
    Tff,
    /// Bottom field first.
    Bff,
}

impl FieldOrder {
    /// Whether the source needs deinterlacing.
    pub fn is_interlaced(&self) -> bool {
        !matches!(self, Self::Progressive)
    }
}

// ---------------------------------------------------------------------------
// MediaSource
// ---------------------------------------------------------------------------

/// Probed technical description of one playable file, as provided by the
/// media catalog collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSource {
    /// Absolute path to the source file.
    pub path: PathBuf,
    /// Container name as reported by the prober (e.g. "matroska", "mp4").
    pub container: String,
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    pub hdr: HdrFormat,
    pub field_order: FieldOrder,
    /// Whether the catalog determined this file can be served unmodified to
    /// the requesting client.
    pub direct_playable: bool,
}

// ---------------------------------------------------------------------------
// PlaybackProfile
// ---------------------------------------------------------------------------

/// What the client asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PlaybackProfile {
    /// Use the source as-is when the catalog says it is directly playable.
    Original,
    /// Transcode to a broadly compatible H.264/AAC stream.
    Standard {
        /// Cap the output height (e.g. 1080); `None` keeps the source size.
        #[serde(default)]
        max_height: Option<u32>,
        /// Whether the client can render HDR output without tone-mapping.
        #[serde(default)]
        supports_hdr: bool,
    },
}

impl PlaybackProfile {
    pub fn is_original(&self) -> bool {
        matches!(self, Self::Original)
    }
}
