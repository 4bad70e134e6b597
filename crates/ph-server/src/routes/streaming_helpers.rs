//! Range parsing and chunked file serving for direct play.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

const CHUNK_SIZE: usize = 64 * 1024;

/// Parse a `Range: bytes=START-END` header into `(start, Option<end>)`.
/// Open-ended ranges (`bytes=500-`) yield `None` for the end.
pub fn parse_range_header(value: &str) -> Option<(u64, Option<u64>)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end = match end.trim() {
        "" => None,
        e => Some(e.parse().ok()?),
    };
    Some((start, end))
}

/// MIME type for the containers the catalog hands us.
pub fn container_content_type(container: &str) -> &'static str {
    match container {
        "mp4" | "m4v" | "mov" => "video/mp4",
        "matroska" | "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mpegts" | "ts" => "video/mp2t",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

/// Serve a media file in bounded chunks, honoring an optional Range
/// request. Memory stays constant regardless of file size.
pub async fn serve_media_file(
    path: &std::path::Path,
    container: &str,
    range_header: Option<&str>,
) -> Result<Response, ph_core::Error> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| ph_core::Error::not_found("file", path.display()))?;
    let file_size = metadata.len();
    let content_type = container_content_type(container);

    let Some((start, end_opt)) = range_header.and_then(parse_range_header) else {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|_| ph_core::Error::not_found("file", path.display()))?;
        let body = Body::from_stream(ReaderStream::with_capacity(file, CHUNK_SIZE));
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE.as_str(), content_type.to_string()),
                (header::CONTENT_LENGTH.as_str(), file_size.to_string()),
                (header::ACCEPT_RANGES.as_str(), "bytes".to_string()),
            ],
            body,
        )
            .into_response());
    };

    let end = end_opt.unwrap_or(file_size.saturating_sub(1)).min(file_size.saturating_sub(1));
    if file_size == 0 || start > end || start >= file_size {
        return Ok((
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE.as_str(), format!("bytes */{file_size}"))],
            Body::empty(),
        )
            .into_response());
    }

    let length = end - start + 1;
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|_| ph_core::Error::not_found("file", path.display()))?;
    file.seek(std::io::SeekFrom::Start(start))
        .await
        .map_err(|e| ph_core::Error::Internal(format!("seek failed: {e}")))?;

    let body = Body::from_stream(ReaderStream::with_capacity(file.take(length), CHUNK_SIZE));
    Ok((
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_TYPE.as_str(), content_type.to_string()),
            (
                header::CONTENT_RANGE.as_str(),
                format!("bytes {start}-{end}/{file_size}"),
            ),
            (header::CONTENT_LENGTH.as_str(), length.to_string()),
            (header::ACCEPT_RANGES.as_str(), "bytes".to_string()),
        ],
        body,
    )
        .into_response())
}
