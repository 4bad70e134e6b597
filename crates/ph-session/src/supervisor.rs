//! Encoder subprocess supervision.
//!
//! One *epoch* is one run of ffmpeg for a session, reading the source at a
//! fixed offset and writing segmented HLS output into a fresh
//! epoch-indexed directory. The supervisor starts epochs, tracks the
//! encoder's own progress reporting (`-progress pipe:1`), and tears them
//! down without leaving zombies. Crashes are reported upward via
//! [`EpochState::Crashed`]; retry policy belongs to the session manager.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use ph_av::planner::EncodingPlan;
use ph_av::tools::ToolRegistry;
use ph_core::config::SessionConfig;
use ph_core::{Error, Result, SessionId};

/// How often [`ProcessSupervisor::wait_first_segment`] polls the output dir.
const FIRST_SEGMENT_POLL: Duration = Duration::from_millis(100);

/// Lifecycle state of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochState {
    /// Subprocess spawned, no segment produced yet.
    Starting,
    /// First segment observed; output is being served.
    Running,
    /// Explicitly stopped (seek, session end, reclamation).
    Stopped,
    /// The subprocess exited on its own. Progress is frozen at its last
    /// reported value and the session needs recreation.
    Crashed,
}

/// Handle to one running (or finished) epoch.
///
/// Progress and state are lock-free/cheap to read so heartbeats never
/// block on subprocess I/O.
#[derive(Debug)]
pub struct EpochHandle {
    pub session_id: SessionId,
    pub index: u32,
    /// Source-time offset (seconds) at which this epoch's output begins.
    pub offset: f64,
    pub output_dir: PathBuf,
    /// Encoded source time past `offset`, in milliseconds.
    encoded_ms: AtomicU64,
    state: RwLock<EpochState>,
    /// Set before killing so the monitor task can tell a stop from a crash.
    stopping: AtomicBool,
    child: Mutex<Option<Child>>,
}

impl EpochHandle {
    pub fn state(&self) -> EpochState {
        *self.state.read()
    }

    /// Absolute source time (seconds) this epoch has transcoded up to.
    pub fn progress_secs(&self) -> f64 {
        self.offset + self.encoded_ms.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.output_dir.join("index.m3u8")
    }
}

/// Starts and stops encoder subprocesses for session epochs.
pub struct ProcessSupervisor {
    tools: Arc<ToolRegistry>,
    config: SessionConfig,
}

impl ProcessSupervisor {
    pub fn new(tools: Arc<ToolRegistry>, config: SessionConfig) -> Self {
        Self { tools, config }
    }

    /// Root output directory for one session.
    pub fn session_dir(&self, session_id: SessionId) -> PathBuf {
        self.config.data_dir.join(session_id.to_string())
    }

    /// Spawn the encoder for a new epoch.
    ///
    /// The output directory is created fresh; starting an epoch whose
    /// directory already exists is refused so a superseded epoch's
    /// segments are never overwritten.
    pub async fn start_epoch(
        &self,
        session_id: SessionId,
        index: u32,
        source: &Path,
        offset: f64,
        plan: &EncodingPlan,
    ) -> Result<Arc<EpochHandle>> {
        let output_dir = self.session_dir(session_id).join(format!("epoch-{index}"));

        std::fs::create_dir_all(self.session_dir(session_id))?;
        std::fs::create_dir(&output_dir).map_err(|e| {
            Error::Internal(format!(
                "epoch dir {} already exists or cannot be created: {e}",
                output_dir.display()
            ))
        })?;

        let ffmpeg = self.tools.require("ffmpeg")?;
        let args = build_epoch_args(source, offset, plan, &output_dir);

        tracing::info!(
            session_id = %session_id,
            epoch = index,
            offset,
            encoder = plan.video_encoder.as_deref().unwrap_or("?"),
            "Starting epoch encoder"
        );
        tracing::debug!(?args, "ffmpeg epoch args");

        let mut child = Command::new(&ffmpeg.path)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::tool("ffmpeg", format!("failed to spawn encoder: {e}")))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let handle = Arc::new(EpochHandle {
            session_id,
            index,
            offset,
            output_dir,
            encoded_ms: AtomicU64::new(0),
            state: RwLock::new(EpochState::Starting),
            stopping: AtomicBool::new(false),
            child: Mutex::new(Some(child)),
        });

        if let Some(stderr) = stderr {
            let session = session_id;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(session_id = %session, "encoder: {line}");
                }
            });
        }

        if let Some(stdout) = stdout {
            tokio::spawn(monitor_epoch(Arc::clone(&handle), stdout));
        }

        Ok(handle)
    }

    /// Block until the epoch has produced its playlist and first media
    /// segment, bounded by the configured startup timeout.
    ///
    /// On timeout or crash the epoch is stopped before the error returns,
    /// so the caller never inherits a half-started encoder.
    pub async fn wait_first_segment(&self, epoch: &Arc<EpochHandle>) -> Result<()> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.startup_timeout_secs);

        loop {
            if epoch.state() == EpochState::Crashed {
                return Err(Error::tool(
                    "ffmpeg",
                    format!(
                        "encoder for epoch {} exited before producing output",
                        epoch.index
                    ),
                ));
            }

            if epoch.playlist_path().exists() && has_media_segment(&epoch.output_dir) {
                *epoch.state.write() = EpochState::Running;
                tracing::debug!(
                    session_id = %epoch.session_id,
                    epoch = epoch.index,
                    "First segment ready"
                );
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                self.stop_epoch(epoch).await?;
                return Err(Error::Internal(format!(
                    "epoch {} produced no segment within {}s",
                    epoch.index, self.config.startup_timeout_secs
                )));
            }

            tokio::time::sleep(FIRST_SEGMENT_POLL).await;
        }
    }

    /// Stop the epoch's subprocess and reap it. Idempotent: stopping an
    /// already-stopped (or crashed and reaped) epoch is a no-op.
    pub async fn stop_epoch(&self, epoch: &Arc<EpochHandle>) -> Result<()> {
        epoch.stopping.store(true, Ordering::SeqCst);

        let mut slot = epoch.child.lock().await;
        let Some(mut child) = slot.take() else {
            return Ok(());
        };

        // start_kill tolerates a process that already exited.
        if let Err(e) = child.start_kill() {
            tracing::debug!(session_id = %epoch.session_id, epoch = epoch.index,
                "kill after exit: {e}");
        }
        child
            .wait()
            .await
            .map_err(|e| Error::Internal(format!("failed to reap encoder: {e}")))?;

        *epoch.state.write() = EpochState::Stopped;
        tracing::info!(
            session_id = %epoch.session_id,
            epoch = epoch.index,
            progress = epoch.progress_secs(),
            "Epoch stopped"
        );
        Ok(())
    }

    /// Delete a session's entire output tree (all epochs). Called on
    /// session end; until then a stopped epoch's segments stay servable.
    pub fn remove_session_dir(&self, session_id: SessionId) {
        let dir = self.session_dir(session_id);
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(session_id = %session_id, "Failed to remove {}: {e}", dir.display());
            }
        }
    }
}

/// Reads the encoder's `-progress` stream and watches for unexpected exit.
async fn monitor_epoch(epoch: Arc<EpochHandle>, stdout: tokio::process::ChildStdout) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(ms) = parse_progress_line(&line) {
            epoch.encoded_ms.store(ms, Ordering::Relaxed);
        }
    }

    // Stdout closed: either we are stopping it, or it died on its own.
    if epoch.stopping.load(Ordering::SeqCst) {
        return;
    }

    // Reap the child if stop_epoch has not taken it already.
    let mut slot = epoch.child.lock().await;
    if let Some(mut child) = slot.take() {
        let status = child.wait().await;
        if epoch.stopping.load(Ordering::SeqCst) {
            // stop_epoch lost the race for the child; finish the stop here.
            *epoch.state.write() = EpochState::Stopped;
            return;
        }
        *epoch.state.write() = EpochState::Crashed;
        tracing::error!(
            session_id = %epoch.session_id,
            epoch = epoch.index,
            status = ?status.ok(),
            progress = epoch.progress_secs(),
            "Encoder exited unexpectedly; progress frozen"
        );
    }
}

/// Parse one `-progress pipe:1` line into encoded milliseconds.
///
/// ffmpeg reports `out_time_us` and (despite the name) `out_time_ms` both
/// in microseconds; `out_time=HH:MM:SS.uuuuuu` is the textual fallback.
fn parse_progress_line(line: &str) -> Option<u64> {
    let (key, value) = line.split_once('=')?;
    match key.trim() {
        "out_time_us" | "out_time_ms" => {
            let us: i64 = value.trim().parse().ok()?;
            Some((us.max(0) as u64) / 1000)
        }
        "out_time" => parse_clock_time_ms(value.trim()),
        _ => None,
    }
}

/// Parse `HH:MM:SS.uuuuuu` into milliseconds.
fn parse_clock_time_ms(s: &str) -> Option<u64> {
    let mut parts = s.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || seconds < 0.0 {
        return None;
    }
    Some(hours * 3_600_000 + minutes * 60_000 + (seconds * 1000.0) as u64)
}

/// True if the directory contains at least one fMP4 media segment.
fn has_media_segment(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|e| {
        e.path()
            .extension()
            .map(|ext| ext == "m4s")
            .unwrap_or(false)
    })
}

/// Build the ffmpeg argument list for one epoch.
///
/// `-ss` before `-i` does a fast keyframe seek in the demuxer, which is
/// the only seek strategy that behaves uniformly across source formats.
pub fn build_epoch_args(
    source: &Path,
    offset: f64,
    plan: &EncodingPlan,
    output_dir: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-nostats".into(),
    ];

    if offset > 0.0 {
        args.extend(["-ss".into(), format!("{offset:.3}")]);
    }

    args.extend(["-i".into(), source.to_string_lossy().into_owned()]);

    if let Some(chain) = plan.filter_chain() {
        args.extend(["-vf".into(), chain]);
    }

    let video_encoder = plan.video_encoder.as_deref().unwrap_or("libx264");
    args.extend(["-c:v".into(), video_encoder.into()]);
    if video_encoder.starts_with("lib") {
        // Software encoders: constant quality, speed over compression.
        args.extend([
            "-preset".into(),
            "veryfast".into(),
            "-crf".into(),
            "23".into(),
        ]);
    } else {
        // Hardware encoders use bitrate targeting; no CRF support.
        args.extend([
            "-b:v".into(),
            "8M".into(),
            "-maxrate".into(),
            "12M".into(),
            "-bufsize".into(),
            "24M".into(),
        ]);
    }

    let segment_duration = plan.segment_duration.max(1);
    args.extend([
        "-force_key_frames".into(),
        format!("expr:gte(t,n_forced*{segment_duration})"),
    ]);

    args.extend([
        "-c:a".into(),
        plan.audio_encoder.as_deref().unwrap_or("aac").into(),
        "-b:a".into(),
        "192k".into(),
        "-ac".into(),
        "2".into(),
    ]);

    args.extend([
        "-f".into(),
        "hls".into(),
        "-hls_time".into(),
        segment_duration.to_string(),
        "-hls_segment_type".into(),
        "fmp4".into(),
        "-hls_playlist_type".into(),
        "event".into(),
        "-hls_segment_filename".into(),
        output_dir.join("seg%05d.m4s").to_string_lossy().into_owned(),
        "-hls_fmp4_init_filename".into(),
        "init.mp4".into(),
    ]);

    args.extend(["-progress".into(), "pipe:1".into()]);
    args.push(output_dir.join("index.m3u8").to_string_lossy().into_owned());

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcode_plan() -> EncodingPlan {
        EncodingPlan {
            direct_play: false,
            video_encoder: Some("libx264".into()),
            audio_encoder: Some("aac".into()),
            video_filters: vec!["yadif=mode=send_frame:parity=tff".into()],
            degraded: false,
            segment_duration: 4,
        }
    }

    #[test]
    fn progress_line_microsecond_keys() {
        assert_eq!(parse_progress_line("out_time_us=1500000"), Some(1500));
        assert_eq!(parse_progress_line("out_time_ms=1500000"), Some(1500));
        assert_eq!(parse_progress_line("out_time_us=-1"), Some(0));
    }

    #[test]
    fn progress_line_clock_fallback() {
        assert_eq!(parse_progress_line("out_time=00:30:00.000000"), Some(1_800_000));
        assert_eq!(parse_progress_line("out_time=01:00:01.500000"), Some(3_601_500));
    }

    #[test]
    fn progress_line_ignores_other_keys() {
        assert_eq!(parse_progress_line("frame=120"), None);
        assert_eq!(parse_progress_line("progress=continue"), None);
        assert_eq!(parse_progress_line("not a key value pair"), None);
    }

    #[test]
    fn epoch_args_seek_before_input() {
        let args = build_epoch_args(
            Path::new("/media/movie.mkv"),
            1800.0,
            &transcode_plan(),
            Path::new("/tmp/out/epoch-1"),
        );

        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input, "-ss must precede -i for demuxer-level seeking");
        assert_eq!(args[ss + 1], "1800.000");
    }

    #[test]
    fn epoch_args_zero_offset_has_no_seek() {
        let args = build_epoch_args(
            Path::new("/media/movie.mkv"),
            0.0,
            &transcode_plan(),
            Path::new("/tmp/out/epoch-0"),
        );
        assert!(!args.iter().any(|a| a == "-ss"));
    }

    #[test]
    fn epoch_args_carry_plan_and_progress() {
        let args = build_epoch_args(
            Path::new("/media/movie.mkv"),
            0.0,
            &transcode_plan(),
            Path::new("/tmp/out/epoch-0"),
        );

        let joined = args.join(" ");
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-crf 23"));
        assert!(joined.contains("-c:a aac"));
        assert!(joined.contains("-vf yadif"));
        assert!(joined.contains("-hls_segment_type fmp4"));
        assert!(joined.contains("-progress pipe:1"));
        assert!(joined.ends_with("index.m3u8"));
    }

    #[test]
    fn epoch_args_hardware_encoder_uses_bitrate() {
        let mut plan = transcode_plan();
        plan.video_encoder = Some("h264_nvenc".into());
        let args = build_epoch_args(
            Path::new("/media/movie.mkv"),
            0.0,
            &plan,
            Path::new("/tmp/out/epoch-0"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-b:v 8M"));
        assert!(!joined.contains("-crf"));
    }

    #[test]
    fn clock_time_rejects_garbage() {
        assert_eq!(parse_clock_time_ms("nonsense"), None);
        assert_eq!(parse_clock_time_ms("1:2"), None);
        assert_eq!(parse_clock_time_ms("00:00:05.000000:extra"), None);
    }
}
