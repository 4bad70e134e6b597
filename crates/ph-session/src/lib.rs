//! Streaming session engine.
//!
//! [`SessionManager`] owns the per-playback state machine; each transcoding
//! session runs one encoder subprocess per *epoch* under the
//! [`ProcessSupervisor`], and a server-side seek supersedes the current
//! epoch with a new one at the requested source offset. The media library
//! itself is a collaborator behind the [`MediaCatalog`] trait.

pub mod catalog;
pub mod manager;
pub mod supervisor;

pub use catalog::{InMemoryCatalog, MediaCatalog, MediaItem};
pub use manager::{
    start_sweep_task, CreatedSession, HeartbeatStatus, SeekOutcome, Session, SessionManager,
    SessionStatus,
};
pub use supervisor::{EpochHandle, EpochState, ProcessSupervisor};
