//! Bearer-token auth for the admin surface.

use axum::http::{header::AUTHORIZATION, HeaderMap};

/// Constant-time string comparison to prevent timing side-channel attacks.
/// The length check leaks length information, but for fixed-format bearer
/// tokens this is acceptable — the critical protection is against
/// byte-by-byte guessing.
pub fn ct_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// True when the request carries the expected token. An empty configured
/// token locks every mutating route rather than opening them.
pub fn authorized(headers: &HeaderMap, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    match bearer_token(headers) {
        Some(token) => ct_eq(token, expected),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn ct_eq_matches_exactly() {
        assert!(ct_eq("secret-token", "secret-token"));
        assert!(!ct_eq("secret-token", "secret-tokeX"));
        assert!(!ct_eq("secret", "secret-token"));
        assert!(ct_eq("", ""));
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn authorized_requires_bearer_scheme_and_match() {
        assert!(authorized(&headers_with("Bearer tok"), "tok"));
        assert!(!authorized(&headers_with("Bearer wrong"), "tok"));
        assert!(!authorized(&headers_with("Basic tok"), "tok"));
        assert!(!authorized(&HeaderMap::new(), "tok"));
    }

    #[test]
    fn empty_configured_token_denies_everything() {
        assert!(!authorized(&headers_with("Bearer "), ""));
        assert!(!authorized(&HeaderMap::new(), ""));
    }
}
