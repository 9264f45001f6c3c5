//! Bearer credential helpers.
//!
//! Tokens are verified by the identity provider, never locally. The only
//! local inspection is [`peek_claims`], which reads the expiry and session id
//! from the unverified payload: an expired `exp` lets us reject early, and the
//! session id is used for logging. Nothing read here can grant access.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::constants::MAX_TOKEN_LENGTH;

/// Claims read from an unverified token payload. Deliberately has no role field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UnverifiedClaims {
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl UnverifiedClaims {
    /// True only when an `exp` claim is present and already in the past
    pub fn is_expired_at(&self, now_unix: i64) -> bool {
        matches!(self.exp, Some(exp) if exp <= now_unix)
    }
}

/// Extracts bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let (scheme, token) = auth_header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Cheap shape check done before any network call
pub fn is_plausible_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_TOKEN_LENGTH
        && token.is_ascii()
        && !token.chars().any(|c| c.is_control() || c.is_whitespace())
}

/// Reads `exp` and `session_id` from a JWT-shaped token without verifying it.
/// Returns `None` for opaque or malformed tokens.
pub fn peek_claims(token: &str) -> Option<UnverifiedClaims> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Short, non-reversible token id for logs
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().take(6).map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn jwt_with(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{}.{}.signature", header, body)
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer_token("bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("Basic dXNlcjpwdw=="), None);
        assert_eq!(extract_bearer_token("abc"), None);
    }

    #[test]
    fn test_plausible_token() {
        assert!(is_plausible_token("abc.def.ghi"));
        assert!(!is_plausible_token(""));
        assert!(!is_plausible_token("abc\u{0000}def"));
        assert!(!is_plausible_token("tok\u{FFFD}n"));
        assert!(!is_plausible_token("tok\u{e9}n"));
        assert!(!is_plausible_token(&"a".repeat(MAX_TOKEN_LENGTH + 1)));
    }

    #[test]
    fn test_peek_claims_ignores_role() {
        let token = jwt_with(json!({
            "sub": "u1",
            "exp": 100,
            "session_id": "sess-1",
            "role": "admin",
            "user_metadata": {"role": "admin"}
        }));
        let claims = peek_claims(&token).unwrap();
        assert_eq!(claims.exp, Some(100));
        assert_eq!(claims.session_id.as_deref(), Some("sess-1"));
        assert!(claims.is_expired_at(100));
        assert!(!claims.is_expired_at(99));
    }

    #[test]
    fn test_peek_claims_opaque_token() {
        assert!(peek_claims("opaque-token").is_none());
        assert!(peek_claims("a.b").is_none());
        assert!(peek_claims("a.!!!.c").is_none());
        assert!(!UnverifiedClaims::default().is_expired_at(i64::MAX));
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        assert_eq!(fingerprint("token"), fingerprint("token"));
        assert_ne!(fingerprint("token"), fingerprint("token2"));
        assert_eq!(fingerprint("token").len(), 12);
    }
}
