//! Bearer token authentication for the admin surface.
//!
//! Behavior:
//! - Token configured: requires `Authorization: Bearer <token>` header
//! - Token not configured: only accepts requests from loopback addresses

use std::net::SocketAddr;

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

/// Check if a request is authorized against an optional token.
///
/// - If token is `Some`: requires matching `Authorization: Bearer <token>` header (constant-time via SHA-256)
/// - If token is `None`: only allows requests from loopback addresses
pub fn is_authorized(token: &Option<String>, addr: &SocketAddr, headers: &HeaderMap) -> bool {
    match token {
        Some(expected) => headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|provided| {
                let a = Sha256::digest(provided.as_bytes());
                let b = Sha256::digest(expected.as_bytes());
                a == b
            }),
        None => addr.ip().is_loopback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {token}").parse().unwrap());
        headers
    }

    #[test]
    fn no_token_allows_loopback_only() {
        let headers = HeaderMap::new();
        assert!(is_authorized(&None, &addr("127.0.0.1:9999"), &headers));
        assert!(is_authorized(&None, &addr("[::1]:9999"), &headers));
        assert!(!is_authorized(&None, &addr("10.0.0.7:9999"), &headers));
    }

    #[test]
    fn token_must_match_bearer_header() {
        let token = Some("sekrit".to_string());
        let remote = addr("10.0.0.7:9999");
        assert!(is_authorized(&token, &remote, &bearer("sekrit")));
        assert!(!is_authorized(&token, &remote, &bearer("wrong")));
        assert!(!is_authorized(&token, &remote, &HeaderMap::new()));
    }

    #[test]
    fn token_overrides_loopback_exemption() {
        let token = Some("sekrit".to_string());
        assert!(!is_authorized(
            &token,
            &addr("127.0.0.1:9999"),
            &HeaderMap::new()
        ));
    }
}
