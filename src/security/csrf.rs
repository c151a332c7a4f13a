//! Stateless CSRF tokens.
//!
//! A token binds a session identity and an expiry under an HMAC keyed with
//! the server secret, so verification recomputes and compares instead of
//! consulting a store. Identity falls back to the client address when the
//! request carries no session.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// Paths that never require a token: auth (the upstream provider owns it),
/// health probes, and token issuance itself.
pub const EXEMPT_PREFIXES: &[&str] = &["/api/auth", "/health", "/api/csrf"];

pub const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CsrfRejection {
    #[error("CSRF token missing")]
    Missing,
    #[error("CSRF validation failed")]
    Invalid,
    #[error("CSRF token expired")]
    Expired,
}

pub struct CsrfGuard {
    secret: Vec<u8>,
    token_ttl: Duration,
}

impl CsrfGuard {
    pub fn new(secret: impl Into<Vec<u8>>, token_ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            token_ttl,
        }
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Issue a token for `identity`, valid for the configured window.
    pub fn issue(&self, identity: &str) -> String {
        let expiry = OffsetDateTime::now_utc().unix_timestamp() + self.token_ttl.as_secs() as i64;
        let mac = self.mac_for(identity, expiry);
        format!(
            "{expiry}.{}.{}",
            URL_SAFE_NO_PAD.encode(identity),
            hex::encode(mac)
        )
    }

    /// Verify `token` against `identity`. Pure function of its inputs plus
    /// the server secret; no token store involved.
    pub fn verify(&self, token: &str, identity: &str) -> Result<(), CsrfRejection> {
        let mut parts = token.splitn(3, '.');
        let expiry: i64 = parts
            .next()
            .and_then(|raw| raw.parse().ok())
            .ok_or(CsrfRejection::Invalid)?;
        // The embedded identity is informational; the MAC check below is
        // what actually binds the token to the caller's identity.
        let _embedded = parts.next().ok_or(CsrfRejection::Invalid)?;
        let mac_hex = parts.next().ok_or(CsrfRejection::Invalid)?;
        let presented = hex::decode(mac_hex).map_err(|_| CsrfRejection::Invalid)?;

        let expected = self.mac_for(identity, expiry);
        if expected.ct_eq(&presented).unwrap_u8() == 0 {
            return Err(CsrfRejection::Invalid);
        }

        if expiry <= OffsetDateTime::now_utc().unix_timestamp() {
            return Err(CsrfRejection::Expired);
        }

        Ok(())
    }

    fn mac_for(&self, identity: &str, expiry: i64) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(identity.as_bytes());
        mac.update(b"|");
        mac.update(expiry.to_string().as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

/// Only state-changing methods carry CSRF risk.
pub fn is_protected_method(method: &axum::http::Method) -> bool {
    matches!(
        *method,
        axum::http::Method::POST
            | axum::http::Method::PUT
            | axum::http::Method::PATCH
            | axum::http::Method::DELETE
    )
}

pub fn is_exempt_path(path: &str) -> bool {
    EXEMPT_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> CsrfGuard {
        CsrfGuard::new(*b"0123456789abcdef0123456789abcdef", Duration::from_secs(3600))
    }

    #[test]
    fn verify_accepts_a_freshly_issued_token() {
        let guard = guard();
        let token = guard.issue("user-123");
        assert_eq!(guard.verify(&token, "user-123"), Ok(()));
    }

    #[test]
    fn verify_rejects_a_different_identity() {
        let guard = guard();
        let token = guard.issue("user-123");
        assert_eq!(guard.verify(&token, "user-456"), Err(CsrfRejection::Invalid));
    }

    #[test]
    fn verify_rejects_an_expired_token() {
        let guard = CsrfGuard::new(*b"0123456789abcdef0123456789abcdef", Duration::ZERO);
        let token = guard.issue("user-123");
        assert_eq!(guard.verify(&token, "user-123"), Err(CsrfRejection::Expired));
    }

    #[test]
    fn verify_rejects_tampered_tokens() {
        let guard = guard();
        let token = guard.issue("user-123");

        // Shift the expiry forward without re-signing.
        let mut parts: Vec<&str> = token.splitn(3, '.').collect();
        let bumped = format!("{}", parts[0].parse::<i64>().expect("expiry") + 9999);
        parts[0] = &bumped;
        let forged = parts.join(".");

        assert_eq!(guard.verify(&forged, "user-123"), Err(CsrfRejection::Invalid));
        assert_eq!(guard.verify("garbage", "user-123"), Err(CsrfRejection::Invalid));
    }

    #[test]
    fn method_and_path_exemptions() {
        use axum::http::Method;

        assert!(is_protected_method(&Method::POST));
        assert!(is_protected_method(&Method::DELETE));
        assert!(!is_protected_method(&Method::GET));
        assert!(!is_protected_method(&Method::HEAD));

        assert!(is_exempt_path("/api/auth/login"));
        assert!(is_exempt_path("/health"));
        assert!(is_exempt_path("/api/csrf"));
        assert!(!is_exempt_path("/api/products"));
    }
}
