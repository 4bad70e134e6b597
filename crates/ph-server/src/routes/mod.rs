//! Route handlers for the HTTP API.

pub mod capabilities;
pub mod health;
pub mod playback;
pub mod stream;
pub mod streaming_helpers;

use axum::http::HeaderMap;
use ph_core::UserId;

/// Well-known user ID for requests carrying no identity.
const ANONYMOUS_USER_ID: UserId = UserId::nil();

/// Resolve the requesting user from the `X-User-Id` header.
///
/// Identity comes from a fronting auth layer; an absent or malformed
/// header falls back to the anonymous user rather than failing, so the
/// server remains usable without one.
pub(crate) fn request_user(headers: &HeaderMap) -> UserId {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(ANONYMOUS_USER_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_header_is_anonymous() {
        assert_eq!(request_user(&HeaderMap::new()), ANONYMOUS_USER_ID);
    }

    #[test]
    fn malformed_header_is_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", "not-a-uuid".parse().unwrap());
        assert_eq!(request_user(&headers), ANONYMOUS_USER_ID);
    }

    #[test]
    fn valid_header_is_parsed() {
        let user = UserId::new();
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", user.to_string().parse().unwrap());
        assert_eq!(request_user(&headers), user);
    }
}
