//! HLS and direct-play streaming endpoints.
//!
//! Playlists and segments come straight off disk from the session's
//! current epoch directory. Requests naming a superseded epoch answer
//! 410 Gone so clients re-fetch the master playlist instead of retrying.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use tokio_util::io::ReaderStream;

use ph_core::{Error, SessionId};

use crate::context::AppContext;
use crate::error::AppError;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

fn parse_session_id(raw: &str) -> Result<SessionId, AppError> {
    raw.parse()
        .map_err(|_| Error::Validation(format!("invalid session id '{raw}'")).into())
}

/// Render the master playlist for a session pointing at one epoch.
///
/// Clients re-fetch this after any response that signals an epoch change
/// (seek response, 410 on a segment), which re-points them at the new
/// media playlist.
fn render_master_playlist(epoch_index: u32) -> String {
    format!(
        "#EXTM3U\n\
         #EXT-X-VERSION:7\n\
         #EXT-X-STREAM-INF:BANDWIDTH=12000000\n\
         {epoch_index}/index.m3u8\n"
    )
}

/// Reject anything that could escape the epoch directory.
fn validate_segment_name(name: &str) -> Result<(), AppError> {
    let traversal = name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.');
    let known_kind = name.ends_with(".m4s") || name == "init.mp4";
    if traversal || !known_kind {
        return Err(Error::Validation(format!("invalid segment name '{name}'")).into());
    }
    Ok(())
}

/// GET /api/stream/{session_id}/master.m3u8
pub async fn master_playlist(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session_id = parse_session_id(&id)?;
    let session = ctx
        .sessions
        .get(session_id)
        .ok_or_else(|| Error::not_found("session", session_id))?;

    if session.plan.direct_play {
        return Err(Error::Validation(
            "direct play sessions stream the source file, not HLS".into(),
        )
        .into());
    }

    let epoch = session.current_epoch().ok_or_else(|| {
        Error::SessionNotLive(format!("session {session_id} has no running encoder"))
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE.as_str(), PLAYLIST_CONTENT_TYPE)],
        render_master_playlist(epoch.index),
    ))
}

/// GET /api/stream/{session_id}/{epoch}/index.m3u8
pub async fn epoch_playlist(
    State(ctx): State<AppContext>,
    Path((id, epoch_index)): Path<(String, u32)>,
) -> Result<impl IntoResponse, AppError> {
    let session_id = parse_session_id(&id)?;
    let path = ctx
        .sessions
        .segment_path(session_id, epoch_index, "index.m3u8")?;

    let playlist = tokio::fs::read_to_string(&path)
        .await
        .map_err(|_| Error::not_found("playlist", format!("{session_id}/{epoch_index}")))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE.as_str(), PLAYLIST_CONTENT_TYPE)],
        playlist,
    ))
}

/// GET /api/stream/{session_id}/{epoch}/{segment}
///
/// Serves `init.mp4` and `segNNNNN.m4s` files. A segment the encoder has
/// not written yet is a plain 404; clients retry off the playlist.
pub async fn segment(
    State(ctx): State<AppContext>,
    Path((id, epoch_index, name)): Path<(String, u32, String)>,
) -> Result<impl IntoResponse, AppError> {
    let session_id = parse_session_id(&id)?;
    validate_segment_name(&name)?;

    let path = ctx.sessions.segment_path(session_id, epoch_index, &name)?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| Error::not_found("segment", &name))?;

    let content_type = if name == "init.mp4" {
        "video/mp4"
    } else {
        "video/iso.segment"
    };

    let body = Body::from_stream(ReaderStream::with_capacity(file, 64 * 1024));
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE.as_str(), content_type)],
        body,
    ))
}

/// GET /api/stream/{session_id}/direct
///
/// Serves the source file with Range support for direct-play sessions.
pub async fn direct_stream(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let session_id = parse_session_id(&id)?;
    let session = ctx
        .sessions
        .get(session_id)
        .ok_or_else(|| Error::not_found("session", session_id))?;

    if !session.plan.direct_play {
        return Err(Error::Validation("session is not direct play".into()).into());
    }

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    Ok(super::streaming_helpers::serve_media_file(
        &session.media.source.path,
        &session.media.source.container,
        range.as_deref(),
    )
    .await?)
}
