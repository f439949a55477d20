//! Token check for `/api/*`.
//!
//! The token is taken from `Authorization: Bearer <token>` or, for browser
//! `EventSource` and WebSocket clients that cannot set headers, from the
//! `auth_token` cookie. Whether it is valid is up to the configured
//! [`TokenVerifier`].

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use hostctl_core::TokenVerifier;

pub const AUTH_COOKIE: &str = "auth_token";

/// Auth middleware. Responds 401 with `WWW-Authenticate: Bearer` on failure.
pub async fn require_token(
    State(verifier): State<Arc<dyn TokenVerifier>>,
    req: Request,
    next: Next,
) -> Response {
    let authorized = presented_token(req.headers()).is_some_and(|token| verifier.verify(token));
    if authorized {
        return next.run(req).await;
    }

    tracing::warn!(
        path = %req.uri().path(),
        "Unauthorized API request - missing or invalid token"
    );
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
    )
        .into_response()
}

/// Bearer header first, then the cookie.
pub fn presented_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_COOKIE)
        .map(|(_, value)| value)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("auth_token=zzz"));
        assert_eq!(presented_token(&headers), Some("abc"));
    }

    #[test]
    fn cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; auth_token=t0k; lang=en"),
        );
        assert_eq!(presented_token(&headers), Some("t0k"));
    }

    #[test]
    fn missing_or_empty_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        headers.insert(header::COOKIE, HeaderValue::from_static("auth_token="));
        assert_eq!(presented_token(&headers), None);
    }
}
