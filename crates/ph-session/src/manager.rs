//! Playback session lifecycle.
//!
//! The [`SessionManager`] is the single owner of live sessions. Creating a
//! session plans the transcode and, unless the plan is direct play, starts
//! epoch 0 and blocks until its first segment exists. Seeks either ride
//! the running epoch (the target is within reach of the encoder) or
//! supersede it with a fresh epoch at the target offset. Sessions that
//! stop heartbeating are reclaimed by a background sweep.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;

use ph_av::capabilities::ManifestStore;
use ph_av::planner::{self, EncodingPlan};
use ph_core::config::SessionConfig;
use ph_core::media::{MediaType, PlaybackProfile};
use ph_core::{Error, MediaId, Result, SessionId, UserId};

use crate::catalog::{MediaCatalog, MediaItem};
use crate::supervisor::{EpochHandle, EpochState, ProcessSupervisor};

/// One live playback session.
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub media: MediaItem,
    pub profile: PlaybackProfile,
    pub plan: EncodingPlan,
    pub created_at: DateTime<Utc>,
    state: RwLock<SessionState>,
    /// Serializes epoch-mutating operations (seek, end). Reads of the
    /// current epoch never wait on this.
    transition: Mutex<()>,
}

struct SessionState {
    /// Monotonically increasing; every restart claims the next index even
    /// when the replacement epoch fails to start.
    epoch_index: u32,
    epoch: Option<Arc<EpochHandle>>,
    last_seen: DateTime<Utc>,
}

impl Session {
    pub fn current_epoch(&self) -> Option<Arc<EpochHandle>> {
        self.state.read().epoch.clone()
    }

    pub fn epoch_index(&self) -> u32 {
        self.state.read().epoch_index
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.state.read().last_seen
    }

    fn touch(&self) {
        self.state.write().last_seen = Utc::now();
    }
}

/// Response payload for session creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSession {
    pub session_id: SessionId,
    pub direct_play: bool,
    pub degraded: bool,
    pub epoch_index: u32,
    /// Source-time offset playback starts at (resume position).
    pub start_offset_secs: f64,
    pub duration_secs: f64,
    /// Server-relative URL the client plays: the HLS master playlist for
    /// transcode sessions, the ranged file endpoint for direct play.
    pub stream_url: String,
}

/// Response payload for a heartbeat.
///
/// `session_active: false` is a signal, not an error: the client must
/// recreate its session (server restart, reclamation, or encoder crash).
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatStatus {
    pub session_active: bool,
    /// Absolute source time the encoder has reached, absent for direct
    /// play or inactive sessions.
    pub transcode_progress_secs: Option<f64>,
}

/// Response payload for a seek.
#[derive(Debug, Clone, Serialize)]
pub struct SeekOutcome {
    pub epoch_index: u32,
    /// False when the running epoch already covers (or will shortly cover)
    /// the target and the client can simply jump within the playlist.
    pub restarted: bool,
    /// Source-time offset playback continues at; always the requested
    /// target. For a restart it is also the new epoch's start offset.
    pub epoch_offset: f64,
    /// Encoder progress at the time of the seek, absent for direct play.
    pub transcode_progress_secs: Option<f64>,
}

/// Snapshot of one session for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub media_id: MediaId,
    pub direct_play: bool,
    pub degraded: bool,
    pub epoch_index: u32,
    pub epoch_state: Option<&'static str>,
    pub epoch_offset: Option<f64>,
    pub transcode_progress_secs: Option<f64>,
    pub last_seen: DateTime<Utc>,
}

fn state_name(state: EpochState) -> &'static str {
    match state {
        EpochState::Starting => "starting",
        EpochState::Running => "running",
        EpochState::Stopped => "stopped",
        EpochState::Crashed => "crashed",
    }
}

/// Owns all live sessions and their encoder processes.
pub struct SessionManager {
    sessions: DashMap<SessionId, Arc<Session>>,
    supervisor: ProcessSupervisor,
    catalog: Arc<dyn MediaCatalog>,
    manifests: Arc<ManifestStore>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        supervisor: ProcessSupervisor,
        catalog: Arc<dyn MediaCatalog>,
        manifests: Arc<ManifestStore>,
        config: SessionConfig,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            supervisor,
            catalog,
            manifests,
            config,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn get(&self, session_id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&session_id).map(|s| Arc::clone(s.value()))
    }

    fn require(&self, session_id: SessionId) -> Result<Arc<Session>> {
        self.get(session_id)
            .ok_or_else(|| Error::not_found("session", session_id))
    }

    /// Plan and start playback for one media item.
    ///
    /// For transcode plans this blocks until epoch 0 has produced its
    /// first segment, so a success response means the playlist is
    /// immediately servable.
    ///
    /// # Errors
    ///
    /// [`Error::Planning`] when no usable encoder exists; the session is
    /// not created and nothing is left on disk.
    pub async fn create_session(
        &self,
        user_id: UserId,
        media_type: MediaType,
        media_id: MediaId,
        profile: PlaybackProfile,
        start_offset_secs: f64,
    ) -> Result<CreatedSession> {
        if start_offset_secs < 0.0 || !start_offset_secs.is_finite() {
            return Err(Error::Validation(format!(
                "invalid start offset {start_offset_secs}"
            )));
        }

        let media = self.catalog.lookup(media_type, media_id).await?;
        let manifest = self.manifests.get();
        let plan = planner::plan(
            &manifest,
            &media.source,
            &profile,
            self.config.segment_duration_secs.max(1),
        )?;

        let session_id = SessionId::new();
        let mut epoch = None;

        if !plan.direct_play {
            let handle = self
                .supervisor
                .start_epoch(session_id, 0, &media.source.path, start_offset_secs, &plan)
                .await?;
            if let Err(e) = self.supervisor.wait_first_segment(&handle).await {
                self.supervisor.remove_session_dir(session_id);
                return Err(e);
            }
            epoch = Some(handle);
        }

        let session = Arc::new(Session {
            id: session_id,
            user_id,
            media,
            profile,
            plan: plan.clone(),
            created_at: Utc::now(),
            state: RwLock::new(SessionState {
                epoch_index: 0,
                epoch,
                last_seen: Utc::now(),
            }),
            transition: Mutex::new(()),
        });

        let duration_secs = session.media.source.duration_secs;
        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            media_id = %media_id,
            direct_play = plan.direct_play,
            degraded = plan.degraded,
            start_offset = start_offset_secs,
            "Session created"
        );
        self.sessions.insert(session_id, session);

        let stream_url = if plan.direct_play {
            format!("/api/stream/{session_id}/direct")
        } else {
            format!("/api/stream/{session_id}/master.m3u8")
        };

        Ok(CreatedSession {
            session_id,
            direct_play: plan.direct_play,
            degraded: plan.degraded,
            epoch_index: 0,
            start_offset_secs,
            duration_secs,
            stream_url,
        })
    }

    /// Record client liveness and report whether the session still exists
    /// server-side. Never errors for an unknown session.
    ///
    /// `position_secs` and `is_playing` describe the client's player
    /// state; the streaming core only logs them (watch-state persistence
    /// is a collaborator).
    pub fn heartbeat(
        &self,
        session_id: SessionId,
        position_secs: Option<f64>,
        is_playing: Option<bool>,
    ) -> HeartbeatStatus {
        let Some(session) = self.get(session_id) else {
            return HeartbeatStatus {
                session_active: false,
                transcode_progress_secs: None,
            };
        };

        session.touch();
        if let Some(position) = position_secs {
            tracing::trace!(
                session_id = %session_id,
                position,
                playing = is_playing.unwrap_or(true),
                "Heartbeat"
            );
        }

        match session.current_epoch() {
            Some(epoch) if epoch.state() == EpochState::Crashed => HeartbeatStatus {
                session_active: false,
                transcode_progress_secs: Some(epoch.progress_secs()),
            },
            Some(epoch) => HeartbeatStatus {
                session_active: true,
                transcode_progress_secs: Some(epoch.progress_secs()),
            },
            // Direct play has no encoder to report on.
            None if session.plan.direct_play => HeartbeatStatus {
                session_active: true,
                transcode_progress_secs: None,
            },
            None => HeartbeatStatus {
                session_active: false,
                transcode_progress_secs: None,
            },
        }
    }

    /// Move playback to `position_secs` of source time.
    ///
    /// If the running epoch already covers the target, or the target lies
    /// within `seek_ahead_secs` past the encoder's current position, no
    /// restart happens. Otherwise the current epoch is stopped and a new
    /// one starts at the target; its first segment is awaited before
    /// returning so the new playlist is servable immediately.
    pub async fn seek(&self, session_id: SessionId, position_secs: f64) -> Result<SeekOutcome> {
        // A vanished session (restart, reclamation) is a 409: the client
        // must recreate rather than retry the seek.
        let session = self.get(session_id).ok_or_else(|| {
            Error::SessionNotLive(format!("session {session_id} is gone; recreate it"))
        })?;

        if position_secs < 0.0 || !position_secs.is_finite() {
            return Err(Error::Validation(format!(
                "invalid seek position {position_secs}"
            )));
        }
        if session.plan.direct_play {
            // Direct play seeks happen client-side via byte ranges.
            session.touch();
            return Ok(SeekOutcome {
                epoch_index: session.epoch_index(),
                restarted: false,
                epoch_offset: position_secs,
                transcode_progress_secs: None,
            });
        }

        let _guard = session.transition.lock().await;

        // end_session removes from the map before taking this lock; a
        // session that vanished while we waited must not get a fresh
        // encoder that teardown can no longer reach.
        if !self.sessions.contains_key(&session_id) {
            return Err(Error::SessionNotLive(format!(
                "session {session_id} ended during seek"
            )));
        }
        session.touch();

        let current = session.current_epoch();
        if let Some(epoch) = &current {
            if epoch.state() == EpochState::Running
                && position_secs >= epoch.offset
                && position_secs <= epoch.progress_secs() + self.config.seek_ahead_secs as f64
            {
                tracing::debug!(
                    session_id = %session_id,
                    position = position_secs,
                    epoch = epoch.index,
                    "Seek served by running epoch"
                );
                return Ok(SeekOutcome {
                    epoch_index: epoch.index,
                    restarted: false,
                    epoch_offset: position_secs,
                    transcode_progress_secs: Some(epoch.progress_secs()),
                });
            }
        }

        if let Some(epoch) = &current {
            self.supervisor.stop_epoch(epoch).await?;
        }

        // Claim the next index before spawning so a failed start can never
        // reuse a superseded epoch's directory. The stopped epoch stays
        // published until the replacement is ready, so heartbeats landing
        // mid-seek still see a live session.
        let next_index = {
            let mut state = session.state.write();
            state.epoch_index += 1;
            state.epoch_index
        };

        let handle = self
            .supervisor
            .start_epoch(
                session_id,
                next_index,
                &session.media.source.path,
                position_secs,
                &session.plan,
            )
            .await?;
        self.supervisor.wait_first_segment(&handle).await?;

        session.state.write().epoch = Some(Arc::clone(&handle));
        tracing::info!(
            session_id = %session_id,
            epoch = next_index,
            position = position_secs,
            "Seek restarted encoder"
        );

        Ok(SeekOutcome {
            epoch_index: next_index,
            restarted: true,
            epoch_offset: position_secs,
            transcode_progress_secs: Some(handle.progress_secs()),
        })
    }

    /// Absolute source time transcoded so far, `None` when unknown
    /// (no such session, or a direct play session with no encoder).
    pub fn transcoded_time(&self, session_id: SessionId) -> Option<f64> {
        self.get(session_id)?
            .current_epoch()
            .map(|epoch| epoch.progress_secs())
    }

    /// Snapshot a session for the status endpoint.
    pub fn status(&self, session_id: SessionId) -> Result<SessionStatus> {
        let session = self.require(session_id)?;
        let epoch = session.current_epoch();

        Ok(SessionStatus {
            session_id,
            media_id: session.media.id,
            direct_play: session.plan.direct_play,
            degraded: session.plan.degraded,
            epoch_index: session.epoch_index(),
            epoch_state: epoch.as_ref().map(|e| state_name(e.state())),
            epoch_offset: epoch.as_ref().map(|e| e.offset),
            transcode_progress_secs: epoch.as_ref().map(|e| e.progress_secs()),
            last_seen: session.last_seen(),
        })
    }

    /// Resolve a segment request to a file path.
    ///
    /// # Errors
    ///
    /// [`Error::Gone`] for a superseded epoch; the client must switch to
    /// the current playlist rather than retry.
    pub fn segment_path(
        &self,
        session_id: SessionId,
        epoch_index: u32,
        filename: &str,
    ) -> Result<std::path::PathBuf> {
        let session = self.require(session_id)?;
        let epoch = session.current_epoch().ok_or_else(|| {
            Error::SessionNotLive(format!("session {session_id} has no running encoder"))
        })?;

        if epoch_index < epoch.index {
            return Err(Error::gone(format!(
                "epoch {epoch_index} superseded by epoch {}",
                epoch.index
            )));
        }
        if epoch_index > epoch.index {
            return Err(Error::not_found(
                "epoch",
                format!("{session_id}/{epoch_index}"),
            ));
        }

        Ok(epoch.output_dir.join(filename))
    }

    /// Tear down a session. Idempotent; ending an unknown session is Ok.
    pub async fn end_session(&self, session_id: SessionId) -> Result<()> {
        let Some((_, session)) = self.sessions.remove(&session_id) else {
            return Ok(());
        };

        let _guard = session.transition.lock().await;
        if let Some(epoch) = session.current_epoch() {
            self.supervisor.stop_epoch(&epoch).await?;
        }
        self.supervisor.remove_session_dir(session_id);

        tracing::info!(session_id = %session_id, "Session ended");
        Ok(())
    }

    /// End every session whose last heartbeat is older than the timeout.
    /// Returns the number reclaimed.
    pub async fn reclaim_stale(&self) -> usize {
        let cutoff =
            Utc::now() - chrono::Duration::seconds(self.config.heartbeat_timeout_secs as i64);

        let stale: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().last_seen() < cutoff)
            .map(|entry| *entry.key())
            .collect();

        let mut reclaimed = 0;
        for session_id in stale {
            tracing::info!(session_id = %session_id, "Reclaiming stale session");
            if let Err(e) = self.end_session(session_id).await {
                tracing::warn!(session_id = %session_id, "Reclaim failed: {e}");
            } else {
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// End all sessions. Called on server shutdown.
    pub async fn shutdown(&self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for session_id in ids {
            if let Err(e) = self.end_session(session_id).await {
                tracing::warn!(session_id = %session_id, "Shutdown teardown failed: {e}");
            }
        }
    }
}

/// Spawn the periodic reclamation sweep.
pub fn start_sweep_task(manager: Arc<SessionManager>) -> tokio::task::JoinHandle<()> {
    let interval_secs = manager.config.sweep_interval_secs.max(1);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reclaimed = manager.reclaim_stale().await;
            if reclaimed > 0 {
                tracing::info!(reclaimed, "Session sweep reclaimed stale sessions");
            }
        }
    })
}
