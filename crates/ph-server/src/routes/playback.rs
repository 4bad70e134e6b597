//! Playback session lifecycle endpoints.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use ph_core::media::{MediaType, PlaybackProfile};
use ph_core::{Error, MediaId, SessionId, UserId};
use ph_session::Session;

use crate::context::AppContext;
use crate::error::AppError;

use super::request_user;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub media_type: MediaType,
    pub media_id: MediaId,
    pub profile: PlaybackProfile,
    #[serde(default)]
    pub start_offset_secs: f64,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub position_secs: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct HeartbeatRequest {
    pub position_secs: Option<f64>,
    pub is_playing: Option<bool>,
}

fn parse_session_id(raw: &str) -> Result<SessionId, AppError> {
    raw.parse()
        .map_err(|_| Error::Validation(format!("invalid session id '{raw}'")).into())
}

/// Sessions are private to their creator.
fn check_owner(session: &Session, user_id: UserId) -> Result<(), AppError> {
    if session.user_id != user_id {
        return Err(Error::Forbidden("session belongs to another user".into()).into());
    }
    Ok(())
}

fn owned_session(
    ctx: &AppContext,
    session_id: SessionId,
    user_id: UserId,
) -> Result<std::sync::Arc<Session>, AppError> {
    let session = ctx
        .sessions
        .get(session_id)
        .ok_or_else(|| Error::not_found("session", session_id))?;
    check_owner(&session, user_id)?;
    Ok(session)
}

/// POST /api/playback/sessions
pub async fn create_session(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = request_user(&headers);
    let created = ctx
        .sessions
        .create_session(
            user_id,
            req.media_type,
            req.media_id,
            req.profile,
            req.start_offset_secs,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/playback/sessions/{id}
pub async fn session_status(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session_id = parse_session_id(&id)?;
    owned_session(&ctx, session_id, request_user(&headers))?;
    Ok(Json(ctx.sessions.status(session_id)?))
}

/// POST /api/playback/sessions/{id}/heartbeat
///
/// Always 200. `session_active: false` in the body tells the client to
/// recreate its session; an unknown id is not an error here.
pub async fn heartbeat(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<HeartbeatRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let session_id = parse_session_id(&id)?;
    if let Some(session) = ctx.sessions.get(session_id) {
        check_owner(&session, request_user(&headers))?;
    }
    let req = body.map(|Json(req)| req).unwrap_or_default();
    Ok(Json(
        ctx.sessions
            .heartbeat(session_id, req.position_secs, req.is_playing),
    ))
}

/// GET /api/playback/sessions/{id}/progress
///
/// Lightweight poll for how far the encoder has gotten, for clients that
/// want to pace buffering without pulling the full status document.
pub async fn progress(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session_id = parse_session_id(&id)?;
    owned_session(&ctx, session_id, request_user(&headers))?;
    let transcoded = ctx.sessions.transcoded_time(session_id);
    Ok(Json(
        serde_json::json!({ "transcode_progress_secs": transcoded }),
    ))
}

/// POST /api/playback/sessions/{id}/seek
pub async fn seek(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<SeekRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session_id = parse_session_id(&id)?;
    owned_session(&ctx, session_id, request_user(&headers))?;
    Ok(Json(ctx.sessions.seek(session_id, req.position_secs).await?))
}

/// DELETE /api/playback/sessions/{id}
pub async fn end_session(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session_id = parse_session_id(&id)?;
    if let Some(session) = ctx.sessions.get(session_id) {
        check_owner(&session, request_user(&headers))?;
    }
    ctx.sessions.end_session(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
