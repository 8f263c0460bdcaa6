// SPDX-License-Identifier: MIT OR Apache-2.0
//! API-key gate for the Docker control endpoints.

use axum::http::{HeaderMap, StatusCode};
use subtle::ConstantTimeEq;
use tracing::warn;

/// Header carrying the internal API key.
pub const API_KEY_HEADER: &str = "x-internal-api-key";

/// Verify the API key on a protected request.
///
/// Missing header is `401`, mismatch is `403`. The comparison is
/// constant-time so the key cannot be recovered byte-by-byte from
/// response timing.
pub fn verify_api_key(headers: &HeaderMap, expected: &str) -> Result<(), (StatusCode, String)> {
    let Some(provided) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) else {
        warn!("request without authentication");
        return Err((
            StatusCode::UNAUTHORIZED,
            format!("Missing {API_KEY_HEADER} header"),
        ));
    };

    if provided.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        warn!("request with invalid API key");
        Err((StatusCode::FORBIDDEN, "Invalid API key".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(key: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(key) = key {
            headers.insert(API_KEY_HEADER, HeaderValue::from_str(key).unwrap());
        }
        headers
    }

    #[test]
    fn missing_key_is_401() {
        let err = verify_api_key(&headers_with(None), "secret").unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn wrong_key_is_403() {
        let err = verify_api_key(&headers_with(Some("nope")), "secret").unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);
    }

    #[test]
    fn matching_key_passes() {
        assert!(verify_api_key(&headers_with(Some("secret")), "secret").is_ok());
    }

    #[test]
    fn length_mismatch_rejected() {
        assert!(verify_api_key(&headers_with(Some("secre")), "secret").is_err());
        assert!(verify_api_key(&headers_with(Some("secrets")), "secret").is_err());
    }
}
