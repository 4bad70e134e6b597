//! Shared application context.

use std::sync::Arc;

use ph_av::capabilities::ManifestStore;
use ph_av::tools::ToolRegistry;
use ph_core::config::Config;
use ph_session::SessionManager;

/// State shared by all request handlers via Axum state.
///
/// Cheaply cloneable; every field is an `Arc`.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub tools: Arc<ToolRegistry>,
    pub manifests: Arc<ManifestStore>,
    pub sessions: Arc<SessionManager>,
}
