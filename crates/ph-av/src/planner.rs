//! Transcode planning: decide between direct play and an encoder/filter
//! chain for one playback request.
//!
//! The planner is a pure function of (capability manifest, source
//! description, requested profile); it never touches the filesystem or
//! spawns processes, which keeps it trivially testable.

use serde::{Deserialize, Serialize};

use ph_core::media::{AudioCodec, MediaSource, PlaybackProfile, VideoCodec};
use ph_core::{Error, Result};

use crate::capabilities::CapabilityManifest;

/// The outcome of planning one playback request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingPlan {
    /// Serve the source unmodified; all other fields are unused.
    pub direct_play: bool,
    /// Selected video encoder (e.g. "h264_nvenc", "libx264").
    pub video_encoder: Option<String>,
    /// Selected audio encoder (e.g. "aac").
    pub audio_encoder: Option<String>,
    /// Video filter chain entries, applied in order.
    pub video_filters: Vec<String>,
    /// True when the plan had to drop a requested treatment (e.g. HDR
    /// source tone-mapped nowhere because no tonemap filter works here).
    pub degraded: bool,
    /// Target HLS segment duration in seconds.
    pub segment_duration: u32,
}

impl EncodingPlan {
    fn direct() -> Self {
        Self {
            direct_play: true,
            video_encoder: None,
            audio_encoder: None,
            video_filters: Vec::new(),
            degraded: false,
            segment_duration: 0,
        }
    }

    /// The complete `-vf` argument value, if any filters apply.
    pub fn filter_chain(&self) -> Option<String> {
        if self.video_filters.is_empty() {
            None
        } else {
            Some(self.video_filters.join(","))
        }
    }
}

/// Build an [`EncodingPlan`] for one playback request.
///
/// Direct play is chosen only when the profile asks for the source as-is
/// *and* the catalog already determined the client can play it unmodified.
/// Everything else transcodes.
///
/// # Errors
///
/// [`Error::Planning`] when no usable video or audio encoder exists at
/// all. The caller must surface this as a hard failure; silently direct-
/// playing an unsupported source would strand the client.
pub fn plan(
    manifest: &CapabilityManifest,
    source: &MediaSource,
    profile: &PlaybackProfile,
    segment_duration: u32,
) -> Result<EncodingPlan> {
    if profile.is_original() && source.direct_playable {
        return Ok(EncodingPlan::direct());
    }

    let (max_height, supports_hdr) = match profile {
        PlaybackProfile::Original => (None, false),
        PlaybackProfile::Standard {
            max_height,
            supports_hdr,
        } => (*max_height, *supports_hdr),
    };

    let video_encoder = manifest
        .best_video_encoder(VideoCodec::H264)
        .ok_or_else(|| {
            Error::Planning(format!(
                "no usable h264 encoder on this host (source: {})",
                source.path.display()
            ))
        })?;

    let audio_encoder = manifest
        .best_audio_encoder(AudioCodec::Aac)
        .or_else(|| manifest.best_audio_encoder(AudioCodec::Opus))
        .ok_or_else(|| Error::Planning("no usable audio encoder on this host".into()))?;

    let mut filters = Vec::new();
    let mut degraded = false;

    // Deinterlace before any colour or scaling work.
    if source.field_order.is_interlaced() {
        match manifest.best_deinterlace(source.field_order) {
            Some(chain) => filters.push(chain),
            None => degraded = true,
        }
    }

    // HDR sources going to a non-HDR client need tone-mapping.
    if source.hdr.is_hdr() && !supports_hdr {
        match manifest.best_tonemap_chain() {
            Some(chain) => filters.push(chain),
            None => degraded = true,
        }
    }

    if let Some(max) = max_height {
        if max < source.height && manifest.filters.scale {
            filters.push(format!("scale=-2:{max}"));
        }
    }

    if degraded {
        tracing::warn!(
            source = %source.path.display(),
            hdr = %source.hdr,
            "Planned a degraded pipeline; requested treatment unavailable on this host"
        );
    }

    Ok(EncodingPlan {
        direct_play: false,
        video_encoder: Some(video_encoder.to_string()),
        audio_encoder: Some(audio_encoder.to_string()),
        video_filters: filters,
        degraded,
        segment_duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{EncoderSupport, FilterSupport};
    use ph_core::media::{FieldOrder, HdrFormat};
    use std::path::PathBuf;

    fn source(direct_playable: bool) -> MediaSource {
        MediaSource {
            path: PathBuf::from("/media/movie.mkv"),
            container: "matroska".into(),
            video_codec: VideoCodec::Hevc,
            audio_codec: AudioCodec::Eac3,
            width: 3840,
            height: 2160,
            duration_secs: 7200.0,
            hdr: HdrFormat::Sdr,
            field_order: FieldOrder::Progressive,
            direct_playable,
        }
    }

    fn sw_manifest() -> CapabilityManifest {
        CapabilityManifest {
            encoders: EncoderSupport {
                libx264: true,
                aac: true,
                ..Default::default()
            },
            filters: FilterSupport {
                scale: true,
                yadif: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn original_profile_direct_plays() {
        let plan = plan(
            &CapabilityManifest::default(),
            &source(true),
            &PlaybackProfile::Original,
            4,
        )
        .unwrap();
        assert!(plan.direct_play);
        assert!(plan.video_encoder.is_none());
    }

    #[test]
    fn original_profile_on_unplayable_source_transcodes() {
        let plan = plan(&sw_manifest(), &source(false), &PlaybackProfile::Original, 4).unwrap();
        assert!(!plan.direct_play);
        assert_eq!(plan.video_encoder.as_deref(), Some("libx264"));
        assert_eq!(plan.audio_encoder.as_deref(), Some("aac"));
    }

    #[test]
    fn no_video_encoder_is_fatal() {
        let err = plan(
            &CapabilityManifest::default(),
            &source(false),
            &PlaybackProfile::Original,
            4,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Planning(_)));
    }

    #[test]
    fn no_audio_encoder_is_fatal() {
        let mut manifest = CapabilityManifest::default();
        manifest.encoders.libx264 = true;
        let err = plan(
            &manifest,
            &source(false),
            &PlaybackProfile::Standard {
                max_height: None,
                supports_hdr: false,
            },
            4,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Planning(_)));
    }

    #[test]
    fn hdr_without_tonemap_degrades_but_succeeds() {
        let mut src = source(false);
        src.hdr = HdrFormat::Hdr10;

        let plan = plan(
            &sw_manifest(),
            &src,
            &PlaybackProfile::Standard {
                max_height: None,
                supports_hdr: false,
            },
            4,
        )
        .unwrap();
        assert!(!plan.direct_play);
        assert!(plan.degraded);
        assert!(plan.video_filters.is_empty());
    }

    #[test]
    fn hdr_with_tonemap_inserts_chain() {
        let mut manifest = sw_manifest();
        manifest.filters.zscale = true;
        manifest.filters.tonemap = true;

        let mut src = source(false);
        src.hdr = HdrFormat::Hdr10;

        let plan = plan(
            &manifest,
            &src,
            &PlaybackProfile::Standard {
                max_height: None,
                supports_hdr: false,
            },
            4,
        )
        .unwrap();
        assert!(!plan.degraded);
        assert!(plan.filter_chain().unwrap().contains("tonemap"));
    }

    #[test]
    fn hdr_capable_client_skips_tonemap() {
        let mut manifest = sw_manifest();
        manifest.filters.zscale = true;
        manifest.filters.tonemap = true;

        let mut src = source(false);
        src.hdr = HdrFormat::Hlg;

        let plan = plan(
            &manifest,
            &src,
            &PlaybackProfile::Standard {
                max_height: None,
                supports_hdr: true,
            },
            4,
        )
        .unwrap();
        assert!(plan.video_filters.is_empty());
    }

    #[test]
    fn interlaced_source_gets_deinterlaced() {
        let mut src = source(false);
        src.field_order = FieldOrder::Tff;

        let plan = plan(
            &sw_manifest(),
            &src,
            &PlaybackProfile::Standard {
                max_height: None,
                supports_hdr: false,
            },
            4,
        )
        .unwrap();
        assert!(plan.video_filters[0].contains("yadif"));
        assert!(plan.video_filters[0].contains("parity=tff"));
    }

    #[test]
    fn max_height_inserts_scale() {
        let plan = plan(
            &sw_manifest(),
            &source(false),
            &PlaybackProfile::Standard {
                max_height: Some(1080),
                supports_hdr: false,
            },
            4,
        )
        .unwrap();
        assert_eq!(plan.filter_chain().as_deref(), Some("scale=-2:1080"));
    }

    #[test]
    fn max_height_above_source_does_not_upscale() {
        let mut src = source(false);
        src.height = 720;

        let plan = plan(
            &sw_manifest(),
            &src,
            &PlaybackProfile::Standard {
                max_height: Some(1080),
                supports_hdr: false,
            },
            4,
        )
        .unwrap();
        assert!(plan.video_filters.is_empty());
    }

    #[test]
    fn hardware_encoder_preferred_when_probed() {
        let mut manifest = sw_manifest();
        manifest.encoders.h264_qsv = true;

        let plan = plan(
            &manifest,
            &source(false),
            &PlaybackProfile::Standard {
                max_height: None,
                supports_hdr: false,
            },
            4,
        )
        .unwrap();
        assert_eq!(plan.video_encoder.as_deref(), Some("h264_qsv"));
    }
}
