//! Functional capability probing of the encoder toolchain.
//!
//! A binary listing an encoder does not mean the encoder works on this
//! host (missing GPU, missing driver, broken build). So every encoder,
//! decoder and filter flag in the [`CapabilityManifest`] is only set after
//! an actual successful invocation: encode a few synthetic frames, apply
//! the filter, decode a freshly produced sample. Hardware *accelerator*
//! flags are the one exception; those come from `ffmpeg -hwaccels`
//! membership, and the per-encoder functional tests catch non-working
//! backends anyway.
//!
//! All individual tests run concurrently and each is bounded by the
//! configured per-test timeout; a timeout or non-zero exit resolves that
//! single flag to `false` without failing the probe as a whole.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ph_core::media::{AudioCodec, FieldOrder, VideoCodec};

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Synthetic video input used by every functional test: a handful of tiny
/// frames so even software AV1 encodes finish well inside the timeout.
const TEST_VIDEO_SRC: &str = "testsrc2=duration=1:size=320x180:rate=10";
/// Synthetic audio input for audio encoder/filter tests.
const TEST_AUDIO_SRC: &str = "sine=frequency=440:sample_rate=48000:duration=0.5";

// ---------------------------------------------------------------------------
// Manifest types
// ---------------------------------------------------------------------------

/// Hardware accelerator backends advertised by ffmpeg on this host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HwAccelSupport {
    pub cuda: bool,
    pub vaapi: bool,
    pub qsv: bool,
    pub videotoolbox: bool,
}

/// Encoders proven to work by encoding synthetic frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSupport {
    // Software video
    pub libx264: bool,
    pub libx265: bool,
    pub libsvtav1: bool,
    // NVIDIA
    pub h264_nvenc: bool,
    pub hevc_nvenc: bool,
    pub av1_nvenc: bool,
    // Intel QuickSync
    pub h264_qsv: bool,
    pub hevc_qsv: bool,
    // VAAPI
    pub h264_vaapi: bool,
    pub hevc_vaapi: bool,
    // Apple
    pub h264_videotoolbox: bool,
    pub hevc_videotoolbox: bool,
    // Audio
    pub aac: bool,
    pub libopus: bool,
}

/// Decoders proven to work by decoding a freshly encoded sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderSupport {
    pub h264: bool,
    pub hevc: bool,
    pub av1: bool,
    pub vp9: bool,
    pub mpeg2: bool,
}

/// Filters proven to work by applying them to synthetic frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSupport {
    pub scale: bool,
    pub zscale: bool,
    pub tonemap: bool,
    pub tonemap_vaapi: bool,
    pub libplacebo: bool,
    pub yadif: bool,
    pub bwdif: bool,
    pub subtitles: bool,
    pub loudnorm: bool,
    pub atempo: bool,
}

/// Dolby Vision handling support.
///
/// Deliberately conservative: RPU extraction and profile conversion need
/// `dovi_tool`, and tone-mapping additionally needs a recent ffmpeg with a
/// working tonemap filter. Detection alone is unconditional whenever
/// ffprobe exists, because reading side-data metadata is reliable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DolbyVisionSupport {
    pub detect: bool,
    pub extract_rpu: bool,
    pub convert_to_hdr10: bool,
    pub tonemap: bool,
}

/// Minimum ffmpeg release for trustworthy Dolby Vision tone-mapping.
const DOVI_TONEMAP_MIN_FFMPEG: semver::Version = semver::Version::new(5, 0, 0);

/// Everything this host was proven to support, plus probe metadata.
///
/// Immutable once built: a refresh produces a brand-new manifest via
/// [`CapabilityProber::probe`], never a partial mutation of this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityManifest {
    pub ffmpeg_version: Option<String>,
    pub ffprobe_version: Option<String>,
    pub hwaccels: HwAccelSupport,
    pub encoders: EncoderSupport,
    pub decoders: DecoderSupport,
    pub filters: FilterSupport,
    pub dolby_vision: DolbyVisionSupport,
    pub generated_at: DateTime<Utc>,
    pub probe_duration_ms: u64,
}

impl Default for CapabilityManifest {
    fn default() -> Self {
        Self {
            ffmpeg_version: None,
            ffprobe_version: None,
            hwaccels: HwAccelSupport::default(),
            encoders: EncoderSupport::default(),
            decoders: DecoderSupport::default(),
            filters: FilterSupport::default(),
            dolby_vision: DolbyVisionSupport::default(),
            generated_at: Utc::now(),
            probe_duration_ms: 0,
        }
    }
}

impl CapabilityManifest {
    /// Best available encoder for the given target codec, preferring
    /// vendor hardware over software: nvenc > qsv > vaapi > videotoolbox >
    /// software.
    pub fn best_video_encoder(&self, codec: VideoCodec) -> Option<&'static str> {
        let e = &self.encoders;
        match codec {
            VideoCodec::H264 => [
                ("h264_nvenc", e.h264_nvenc),
                ("h264_qsv", e.h264_qsv),
                ("h264_vaapi", e.h264_vaapi),
                ("h264_videotoolbox", e.h264_videotoolbox),
                ("libx264", e.libx264),
            ]
            .into_iter()
            .find_map(|(name, ok)| ok.then_some(name)),
            VideoCodec::Hevc => [
                ("hevc_nvenc", e.hevc_nvenc),
                ("hevc_qsv", e.hevc_qsv),
                ("hevc_vaapi", e.hevc_vaapi),
                ("hevc_videotoolbox", e.hevc_videotoolbox),
                ("libx265", e.libx265),
            ]
            .into_iter()
            .find_map(|(name, ok)| ok.then_some(name)),
            VideoCodec::Av1 => [("av1_nvenc", e.av1_nvenc), ("libsvtav1", e.libsvtav1)]
                .into_iter()
                .find_map(|(name, ok)| ok.then_some(name)),
            VideoCodec::Vp9 | VideoCodec::Mpeg2 => None,
        }
    }

    /// Best available audio encoder for the given target codec.
    pub fn best_audio_encoder(&self, codec: AudioCodec) -> Option<&'static str> {
        match codec {
            AudioCodec::Aac => self.encoders.aac.then_some("aac"),
            AudioCodec::Opus => self.encoders.libopus.then_some("libopus"),
            _ => None,
        }
    }

    /// Best available HDR→SDR tone-mapping filter chain, preferring GPU
    /// tone-mapping over the software linear-light conversion chain.
    pub fn best_tonemap_chain(&self) -> Option<String> {
        let f = &self.filters;
        if f.tonemap_vaapi && self.hwaccels.vaapi {
            return Some(
                "format=nv12,hwupload,tonemap_vaapi=format=nv12:primaries=bt709:\
                 transfer=bt709:matrix=bt709,hwdownload,format=nv12"
                    .to_string(),
            );
        }
        if f.libplacebo {
            return Some(
                "libplacebo=tonemapping=auto:colorspace=bt709:color_primaries=bt709:\
                 color_trc=bt709:format=yuv420p"
                    .to_string(),
            );
        }
        if f.zscale && f.tonemap {
            return Some(
                "zscale=t=linear:npl=100,format=gbrpf32le,zscale=p=bt709,\
                 tonemap=tonemap=hable:desat=0,zscale=t=bt709:m=bt709:r=tv,format=yuv420p"
                    .to_string(),
            );
        }
        None
    }

    /// Best available deinterlace filter for the given field order.
    pub fn best_deinterlace(&self, field_order: FieldOrder) -> Option<String> {
        if !field_order.is_interlaced() {
            return None;
        }
        let parity = match field_order {
            FieldOrder::Tff => "tff",
            FieldOrder::Bff => "bff",
            FieldOrder::Progressive => unreachable!(),
        };
        if self.filters.bwdif {
            Some(format!("bwdif=mode=send_frame:parity={parity}"))
        } else if self.filters.yadif {
            Some(format!("yadif=mode=send_frame:parity={parity}"))
        } else {
            None
        }
    }

    /// Minimum viable fallback guarantee: transcoding is possible at all
    /// only when a baseline software video and audio encoder both work.
    pub fn can_transcode(&self) -> bool {
        self.encoders.libx264 && self.encoders.aac
    }
}

// ---------------------------------------------------------------------------
// ManifestStore
// ---------------------------------------------------------------------------

/// Shared holder for the current capability manifest.
///
/// Constructed once at startup and injected everywhere it is needed.
/// Readers take a cheap `Arc` snapshot; a refresh swaps the whole
/// manifest atomically.
#[derive(Debug)]
pub struct ManifestStore {
    inner: RwLock<Arc<CapabilityManifest>>,
}

impl ManifestStore {
    pub fn new(manifest: CapabilityManifest) -> Self {
        Self {
            inner: RwLock::new(Arc::new(manifest)),
        }
    }

    /// Snapshot of the current manifest.
    pub fn get(&self) -> Arc<CapabilityManifest> {
        self.inner.read().clone()
    }

    /// Swap in a freshly probed manifest.
    pub fn replace(&self, manifest: CapabilityManifest) {
        *self.inner.write() = Arc::new(manifest);
    }
}

// ---------------------------------------------------------------------------
// CapabilityProber
// ---------------------------------------------------------------------------

/// Runs the full capability test battery against the discovered toolchain.
pub struct CapabilityProber {
    tools: Arc<ToolRegistry>,
    test_timeout: Duration,
}

impl CapabilityProber {
    pub fn new(tools: Arc<ToolRegistry>, test_timeout: Duration) -> Self {
        Self {
            tools,
            test_timeout,
        }
    }

    /// Run every capability test and assemble a fresh manifest.
    ///
    /// Never fails: a host without ffmpeg yields a manifest with every
    /// flag `false`.
    pub async fn probe(&self) -> CapabilityManifest {
        let started = Instant::now();

        let ffmpeg = self.tools.get("ffmpeg").map(|t| t.path.clone());
        let ffprobe_present = self.tools.get("ffprobe").is_some();
        let dovi_tool_present = self.tools.get("dovi_tool").is_some();

        let (hwaccels, encoders, decoders, filters) = match ffmpeg.as_deref() {
            Some(path) => {
                tokio::join!(
                    self.probe_hwaccels(path),
                    self.probe_encoders(path),
                    self.probe_decoders(path),
                    self.probe_filters(path),
                )
            }
            None => {
                tracing::warn!("ffmpeg not found; every capability resolves to unsupported");
                Default::default()
            }
        };

        let ffmpeg_version = self.tools.version_line("ffmpeg");
        let ffprobe_version = self.tools.version_line("ffprobe");

        let version_ok = self
            .tools
            .ffmpeg_version()
            .map(|v| v >= DOVI_TONEMAP_MIN_FFMPEG)
            .unwrap_or(false);
        let dolby_vision = DolbyVisionSupport {
            detect: ffprobe_present,
            extract_rpu: dovi_tool_present,
            convert_to_hdr10: dovi_tool_present,
            tonemap: version_ok && (filters.libplacebo || (filters.zscale && filters.tonemap)),
        };

        let manifest = CapabilityManifest {
            ffmpeg_version,
            ffprobe_version,
            hwaccels,
            encoders,
            decoders,
            filters,
            dolby_vision,
            generated_at: Utc::now(),
            probe_duration_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            duration_ms = manifest.probe_duration_ms,
            can_transcode = manifest.can_transcode(),
            hw_h264 = ?manifest.best_video_encoder(VideoCodec::H264),
            "Capability probe complete"
        );

        manifest
    }

    /// `ffmpeg -hwaccels` advertised-list membership.
    async fn probe_hwaccels(&self, ffmpeg: &Path) -> HwAccelSupport {
        let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
        cmd.args(["-hide_banner", "-hwaccels"]);
        cmd.timeout(self.test_timeout);

        let listed: Vec<String> = match cmd.output().await {
            Ok(out) if out.status.success() => out
                .stdout
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
            Ok(out) => {
                tracing::debug!(status = ?out.status, "ffmpeg -hwaccels failed");
                Vec::new()
            }
            Err(e) => {
                tracing::debug!(error = %e, "ffmpeg -hwaccels did not run");
                Vec::new()
            }
        };

        let has = |name: &str| listed.iter().any(|l| l == name);
        HwAccelSupport {
            cuda: has("cuda"),
            vaapi: has("vaapi"),
            qsv: has("qsv"),
            videotoolbox: has("videotoolbox"),
        }
    }

    /// Encode a few synthetic frames with every encoder of interest.
    async fn probe_encoders(&self, ffmpeg: &Path) -> EncoderSupport {
        let video = [
            "libx264",
            "libx265",
            "libsvtav1",
            "h264_nvenc",
            "hevc_nvenc",
            "av1_nvenc",
            "h264_qsv",
            "hevc_qsv",
            "h264_vaapi",
            "hevc_vaapi",
            "h264_videotoolbox",
            "hevc_videotoolbox",
        ];
        let audio = ["aac", "libopus"];

        let video_futs = video
            .iter()
            .map(|&name| async move { (name, self.test_video_encoder(ffmpeg, name).await) });
        let audio_futs = audio
            .iter()
            .map(|&name| async move { (name, self.test_audio_encoder(ffmpeg, name).await) });

        let (video_results, audio_results) =
            tokio::join!(join_all(video_futs), join_all(audio_futs));

        let ok = |results: &[(&str, bool)], name: &str| {
            results.iter().any(|(n, passed)| *n == name && *passed)
        };

        EncoderSupport {
            libx264: ok(&video_results, "libx264"),
            libx265: ok(&video_results, "libx265"),
            libsvtav1: ok(&video_results, "libsvtav1"),
            h264_nvenc: ok(&video_results, "h264_nvenc"),
            hevc_nvenc: ok(&video_results, "hevc_nvenc"),
            av1_nvenc: ok(&video_results, "av1_nvenc"),
            h264_qsv: ok(&video_results, "h264_qsv"),
            hevc_qsv: ok(&video_results, "hevc_qsv"),
            h264_vaapi: ok(&video_results, "h264_vaapi"),
            hevc_vaapi: ok(&video_results, "hevc_vaapi"),
            h264_videotoolbox: ok(&video_results, "h264_videotoolbox"),
            hevc_videotoolbox: ok(&video_results, "hevc_videotoolbox"),
            aac: ok(&audio_results, "aac"),
            libopus: ok(&audio_results, "libopus"),
        }
    }

    async fn test_video_encoder(&self, ffmpeg: &Path, encoder: &str) -> bool {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            TEST_VIDEO_SRC.into(),
            "-frames:v".into(),
            "3".into(),
        ];
        // VAAPI encoders only accept hardware frames; upload first.
        if encoder.ends_with("_vaapi") {
            args.extend([
                "-vf".into(),
                "format=nv12,hwupload".into(),
                "-vaapi_device".into(),
                "/dev/dri/renderD128".into(),
            ]);
        }
        args.extend(["-c:v".into(), encoder.into(), "-f".into(), "null".into(), "-".into()]);

        self.run_test(ffmpeg, &args, encoder).await
    }

    async fn test_audio_encoder(&self, ffmpeg: &Path, encoder: &str) -> bool {
        let args = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "lavfi",
            "-i",
            TEST_AUDIO_SRC,
            "-c:a",
            encoder,
            "-f",
            "null",
            "-",
        ];
        self.run_test(ffmpeg, &args, encoder).await
    }

    /// Decode a freshly encoded sample per codec.
    ///
    /// The sample is produced with the codec's stock software encoder; if
    /// that encoder is unavailable the decoder flag conservatively stays
    /// `false`, matching the "trust only behavior" rule.
    async fn probe_decoders(&self, ffmpeg: &Path) -> DecoderSupport {
        let cases = [
            ("h264", "libx264"),
            ("hevc", "libx265"),
            ("av1", "libsvtav1"),
            ("vp9", "libvpx-vp9"),
            ("mpeg2", "mpeg2video"),
        ];

        let futs = cases.iter().map(|&(codec, encoder)| async move {
            (codec, self.test_decoder(ffmpeg, codec, encoder).await)
        });
        let results = join_all(futs).await;

        let ok = |name: &str| results.iter().any(|(n, passed)| *n == name && *passed);
        DecoderSupport {
            h264: ok("h264"),
            hevc: ok("hevc"),
            av1: ok("av1"),
            vp9: ok("vp9"),
            mpeg2: ok("mpeg2"),
        }
    }

    async fn test_decoder(&self, ffmpeg: &Path, codec: &str, encoder: &str) -> bool {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(error = %e, codec, "no scratch dir for decoder test");
                return false;
            }
        };
        let sample = dir.path().join(format!("sample-{codec}.mkv"));
        let sample_str = sample.to_string_lossy().to_string();

        let encode_args = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            TEST_VIDEO_SRC,
            "-frames:v",
            "3",
            "-c:v",
            encoder,
            "-f",
            "matroska",
            &sample_str,
        ];
        if !self.run_test(ffmpeg, &encode_args, encoder).await {
            return false;
        }

        let decode_args = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            &sample_str,
            "-f",
            "null",
            "-",
        ];
        self.run_test(ffmpeg, &decode_args, codec).await
    }

    /// Apply each filter of interest to synthetic frames.
    async fn probe_filters(&self, ffmpeg: &Path) -> FilterSupport {
        let video_cases: [(&str, String); 7] = [
            ("scale", "scale=160:90".into()),
            ("zscale", "zscale=w=160:h=90".into()),
            ("tonemap", "format=gbrpf32le,tonemap=hable".into()),
            (
                "tonemap_vaapi",
                "format=nv12,hwupload,tonemap_vaapi=format=nv12,hwdownload".into(),
            ),
            ("libplacebo", "libplacebo=format=yuv420p".into()),
            ("yadif", "yadif".into()),
            ("bwdif", "bwdif".into()),
        ];
        let audio_cases: [(&str, &str); 2] = [("loudnorm", "loudnorm"), ("atempo", "atempo=1.25")];

        let video_futs = video_cases.iter().map(|(name, chain)| {
            let chain = chain.clone();
            async move { (*name, self.test_video_filter(ffmpeg, *name, &chain).await) }
        });
        let audio_futs = audio_cases
            .iter()
            .map(|&(name, chain)| async move { (name, self.test_audio_filter(ffmpeg, chain).await) });

        let (video_results, audio_results, subtitles) = tokio::join!(
            join_all(video_futs),
            join_all(audio_futs),
            self.test_subtitles_filter(ffmpeg),
        );

        let ok = |results: &[(&str, bool)], name: &str| {
            results.iter().any(|(n, passed)| *n == name && *passed)
        };

        FilterSupport {
            scale: ok(&video_results, "scale"),
            zscale: ok(&video_results, "zscale"),
            tonemap: ok(&video_results, "tonemap"),
            tonemap_vaapi: ok(&video_results, "tonemap_vaapi"),
            libplacebo: ok(&video_results, "libplacebo"),
            yadif: ok(&video_results, "yadif"),
            bwdif: ok(&video_results, "bwdif"),
            subtitles,
            loudnorm: ok(&audio_results, "loudnorm"),
            atempo: ok(&audio_results, "atempo"),
        }
    }

    async fn test_video_filter(&self, ffmpeg: &Path, name: &str, chain: &str) -> bool {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
        ];
        if name == "tonemap_vaapi" {
            args.extend(["-vaapi_device".into(), "/dev/dri/renderD128".into()]);
        }
        args.extend([
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            TEST_VIDEO_SRC.into(),
            "-vf".into(),
            chain.into(),
            "-frames:v".into(),
            "3".into(),
            "-f".into(),
            "null".into(),
            "-".into(),
        ]);
        self.run_test(ffmpeg, &args, name).await
    }

    async fn test_audio_filter(&self, ffmpeg: &Path, chain: &str) -> bool {
        let args = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "lavfi",
            "-i",
            TEST_AUDIO_SRC,
            "-af",
            chain,
            "-f",
            "null",
            "-",
        ];
        self.run_test(ffmpeg, &args, chain).await
    }

    /// The subtitles burn-in filter needs a real subtitle file to parse.
    async fn test_subtitles_filter(&self, ffmpeg: &Path) -> bool {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(_) => return false,
        };
        let srt = dir.path().join("probe.srt");
        if std::fs::write(&srt, "1\n00:00:00,000 --> 00:00:01,000\nprobe\n").is_err() {
            return false;
        }

        let chain = format!("subtitles={}", srt.to_string_lossy());
        self.test_video_filter(ffmpeg, "subtitles", &chain).await
    }

    async fn run_test(&self, ffmpeg: &Path, args: &[impl AsRef<str>], what: &str) -> bool {
        let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
        cmd.args(args.iter().map(|a| a.as_ref().to_string()));
        cmd.timeout(self.test_timeout);

        match cmd.output().await {
            Ok(out) => {
                let passed = out.status.success();
                tracing::debug!(what, passed, "capability test");
                passed
            }
            Err(e) => {
                tracing::debug!(what, error = %e, "capability test did not run");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_with(encoders: EncoderSupport, filters: FilterSupport) -> CapabilityManifest {
        CapabilityManifest {
            encoders,
            filters,
            ..CapabilityManifest::default()
        }
    }

    #[tokio::test]
    async fn missing_ffmpeg_yields_all_false() {
        let prober = CapabilityProber::new(
            Arc::new(ToolRegistry::empty()),
            Duration::from_secs(1),
        );
        let manifest = prober.probe().await;

        assert_eq!(manifest.hwaccels, HwAccelSupport::default());
        assert_eq!(manifest.encoders, EncoderSupport::default());
        assert_eq!(manifest.decoders, DecoderSupport::default());
        assert_eq!(manifest.filters, FilterSupport::default());
        assert_eq!(manifest.dolby_vision, DolbyVisionSupport::default());
        assert!(!manifest.can_transcode());
        assert!(manifest.best_video_encoder(VideoCodec::H264).is_none());
    }

    #[tokio::test]
    async fn probe_is_deterministic() {
        let prober = CapabilityProber::new(
            Arc::new(ToolRegistry::empty()),
            Duration::from_secs(1),
        );
        let a = prober.probe().await;
        let b = prober.probe().await;
        assert_eq!(a.hwaccels, b.hwaccels);
        assert_eq!(a.encoders, b.encoders);
        assert_eq!(a.decoders, b.decoders);
        assert_eq!(a.filters, b.filters);
        assert_eq!(a.dolby_vision, b.dolby_vision);
    }

    #[test]
    fn encoder_preference_order() {
        let manifest = manifest_with(
            EncoderSupport {
                libx264: true,
                h264_vaapi: true,
                h264_nvenc: true,
                ..Default::default()
            },
            FilterSupport::default(),
        );
        assert_eq!(
            manifest.best_video_encoder(VideoCodec::H264),
            Some("h264_nvenc")
        );

        let manifest = manifest_with(
            EncoderSupport {
                libx264: true,
                h264_vaapi: true,
                ..Default::default()
            },
            FilterSupport::default(),
        );
        assert_eq!(
            manifest.best_video_encoder(VideoCodec::H264),
            Some("h264_vaapi")
        );

        let manifest = manifest_with(
            EncoderSupport {
                libx264: true,
                ..Default::default()
            },
            FilterSupport::default(),
        );
        assert_eq!(
            manifest.best_video_encoder(VideoCodec::H264),
            Some("libx264")
        );
    }

    #[test]
    fn tonemap_prefers_gpu() {
        let mut manifest = manifest_with(
            EncoderSupport::default(),
            FilterSupport {
                tonemap_vaapi: true,
                zscale: true,
                tonemap: true,
                ..Default::default()
            },
        );
        manifest.hwaccels.vaapi = true;
        assert!(manifest.best_tonemap_chain().unwrap().contains("tonemap_vaapi"));

        // Without the vaapi accelerator the GPU chain is not usable.
        manifest.hwaccels.vaapi = false;
        assert!(manifest.best_tonemap_chain().unwrap().contains("zscale"));

        manifest.filters.zscale = false;
        assert!(manifest.best_tonemap_chain().is_none());
    }

    #[test]
    fn deinterlace_prefers_bwdif_and_carries_parity() {
        let manifest = manifest_with(
            EncoderSupport::default(),
            FilterSupport {
                bwdif: true,
                yadif: true,
                ..Default::default()
            },
        );
        let chain = manifest.best_deinterlace(FieldOrder::Bff).unwrap();
        assert!(chain.starts_with("bwdif"));
        assert!(chain.contains("parity=bff"));

        let manifest = manifest_with(
            EncoderSupport::default(),
            FilterSupport {
                yadif: true,
                ..Default::default()
            },
        );
        let chain = manifest.best_deinterlace(FieldOrder::Tff).unwrap();
        assert!(chain.starts_with("yadif"));

        assert!(manifest.best_deinterlace(FieldOrder::Progressive).is_none());
    }

    #[test]
    fn can_transcode_requires_baseline_pair() {
        let manifest = manifest_with(
            EncoderSupport {
                libx264: true,
                ..Default::default()
            },
            FilterSupport::default(),
        );
        assert!(!manifest.can_transcode());

        let manifest = manifest_with(
            EncoderSupport {
                libx264: true,
                aac: true,
                ..Default::default()
            },
            FilterSupport::default(),
        );
        assert!(manifest.can_transcode());
    }

    #[test]
    fn manifest_store_swaps_snapshots() {
        let store = ManifestStore::new(CapabilityManifest::default());
        let before = store.get();
        assert!(!before.encoders.libx264);

        let mut updated = CapabilityManifest::default();
        updated.encoders.libx264 = true;
        store.replace(updated);

        assert!(store.get().encoders.libx264);
        // The old snapshot is unaffected: manifests are immutable.
        assert!(!before.encoders.libx264);
    }

    #[test]
    fn manifest_serializes() {
        let manifest = CapabilityManifest::default();
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("\"encoders\""));
        let back: CapabilityManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.encoders, manifest.encoders);
    }
}
