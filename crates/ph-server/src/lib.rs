//! HTTP surface for the playhead streaming core.
//!
//! Thin Axum layer over [`ph_session::SessionManager`] and the capability
//! manifest: session lifecycle under `/api/playback`, HLS output under
//! `/api/stream`, capabilities under `/api/capabilities`.

pub mod context;
pub mod error;
pub mod router;
pub mod routes;

pub use context::AppContext;
pub use error::AppError;
pub use router::build_router;
