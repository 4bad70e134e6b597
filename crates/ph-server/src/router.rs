//! Axum router construction.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Capabilities
        .route("/capabilities", get(routes::capabilities::get_capabilities))
        .route(
            "/capabilities/refresh",
            post(routes::capabilities::refresh_capabilities),
        )
        // Playback sessions
        .route(
            "/playback/sessions",
            post(routes::playback::create_session),
        )
        .route(
            "/playback/sessions/{id}",
            get(routes::playback::session_status).delete(routes::playback::end_session),
        )
        .route(
            "/playback/sessions/{id}/heartbeat",
            post(routes::playback::heartbeat),
        )
        .route("/playback/sessions/{id}/seek", post(routes::playback::seek))
        .route(
            "/playback/sessions/{id}/progress",
            get(routes::playback::progress),
        )
        // Streaming
        .route(
            "/stream/{session_id}/master.m3u8",
            get(routes::stream::master_playlist),
        )
        .route(
            "/stream/{session_id}/direct",
            get(routes::stream::direct_stream),
        )
        .route(
            "/stream/{session_id}/{epoch}/index.m3u8",
            get(routes::stream::epoch_playlist),
        )
        .route(
            "/stream/{session_id}/{epoch}/{segment}",
            get(routes::stream::segment),
        );

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
