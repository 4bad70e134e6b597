//! Unified error type for the playhead streaming core.
//!
//! All crates funnel their failures into [`Error`], which carries enough
//! context for the HTTP layer to derive a status code via
//! [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes in playhead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "media", "session").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The caller does not own the session it is operating on.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No usable encoder exists for the requested plan. This is fatal for
    /// the playback attempt and must never degrade into serving an
    /// unplayable source directly.
    #[error("Planning error: {0}")]
    Planning(String),

    /// The session is gone from memory (server restart or reclamation).
    /// Clients receiving this must recreate the session.
    #[error("Session not live: {0}")]
    SessionNotLive(String),

    /// The resource belonged to a superseded epoch and will not return.
    #[error("Gone: {0}")]
    Gone(String),

    /// An external tool (ffmpeg, ffprobe, dovi_tool) failed.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Media probing failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Forbidden(_) => 403,
            Error::Validation(_) => 400,
            Error::Planning(_) => 422,
            Error::SessionNotLive(_) => 409,
            Error::Gone(_) => 410,
            Error::Tool { .. } => 502,
            Error::Probe(_) => 422,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Gone`].
    pub fn gone(what: impl Into<String>) -> Self {
        Error::Gone(what.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
