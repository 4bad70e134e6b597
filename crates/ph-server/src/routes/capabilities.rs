//! Capability manifest endpoints.

use std::time::Duration;

use axum::extract::State;
use axum::Json;

use ph_av::capabilities::{CapabilityManifest, CapabilityProber};

use crate::context::AppContext;

/// GET /api/capabilities
///
/// Returns the current manifest snapshot. Flags here were proven by real
/// tool invocations at probe time, never assumed from version strings.
pub async fn get_capabilities(State(ctx): State<AppContext>) -> Json<CapabilityManifest> {
    Json((*ctx.manifests.get()).clone())
}

/// POST /api/capabilities/refresh
///
/// Runs a fresh probe and atomically swaps the manifest. Sessions created
/// before the swap keep the plan they were built with.
pub async fn refresh_capabilities(State(ctx): State<AppContext>) -> Json<CapabilityManifest> {
    let prober = CapabilityProber::new(
        ctx.tools.clone(),
        Duration::from_secs(ctx.config.probe.test_timeout_secs),
    );
    let manifest = prober.probe().await;
    ctx.manifests.replace(manifest.clone());
    tracing::info!(
        duration_ms = manifest.probe_duration_ms,
        "Capability manifest refreshed"
    );
    Json(manifest)
}
