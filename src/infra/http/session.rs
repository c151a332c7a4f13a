//! Session consumption.
//!
//! Authentication is owned by an upstream provider; this service only
//! consumes the identity it injects as headers. Requests without a valid
//! pair of headers proceed anonymously and are scoped accordingly.

use std::net::SocketAddr;
use std::str::FromStr;

use axum::body::Body;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{HeaderMap, Request, request::Parts};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::domain::types::Role;
use crate::security::rate_limit::client_identity;

use super::envelope::ApiFailure;

pub const SESSION_USER_HEADER: &str = "x-session-user";
pub const SESSION_ROLE_HEADER: &str = "x-session-role";

#[derive(Debug, Clone, Copy)]
pub struct SessionContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl SessionContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn actor_label(&self) -> String {
        format!("{}:{}", self.role, self.user_id)
    }
}

/// Extractor wrapper: `CurrentSession(None)` for anonymous requests.
#[derive(Debug, Clone, Copy)]
pub struct CurrentSession(pub Option<SessionContext>);

impl<S: Send + Sync> FromRequestParts<S> for CurrentSession {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<SessionContext>().copied()))
    }
}

fn parse_session(headers: &HeaderMap) -> Option<SessionContext> {
    let user_id = headers
        .get(SESSION_USER_HEADER)?
        .to_str()
        .ok()
        .and_then(|raw| Uuid::parse_str(raw).ok())?;
    let role = headers
        .get(SESSION_ROLE_HEADER)?
        .to_str()
        .ok()
        .and_then(|raw| Role::from_str(raw).ok())?;
    Some(SessionContext { user_id, role })
}

/// Middleware: materialize the session context once so downstream middleware
/// and handlers agree on the caller's identity.
pub async fn attach_session(mut request: Request<Body>, next: Next) -> Response {
    if let Some(session) = parse_session(request.headers()) {
        request.extensions_mut().insert(session);
    }
    next.run(request).await
}

/// CSRF and rate-limit identity: the session user when present, otherwise
/// the client address.
pub fn request_identity(
    session: Option<&SessionContext>,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> String {
    match session {
        Some(session) => session.user_id.to_string(),
        None => client_identity(headers, peer),
    }
}

pub fn require_session(
    source: &'static str,
    session: Option<SessionContext>,
) -> Result<SessionContext, ApiFailure> {
    session.ok_or_else(|| ApiFailure::unauthorized(source))
}

/// Admins pass every role gate.
pub fn require_role(
    source: &'static str,
    session: Option<SessionContext>,
    role: Role,
) -> Result<SessionContext, ApiFailure> {
    let session = require_session(source, session)?;
    if session.role == role || session.is_admin() {
        Ok(session)
    } else {
        Err(ApiFailure::forbidden(source))
    }
}

pub fn peer_of(request: &Request<Body>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers_for(user: &str, role: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_USER_HEADER, HeaderValue::from_str(user).expect("value"));
        headers.insert(SESSION_ROLE_HEADER, HeaderValue::from_str(role).expect("value"));
        headers
    }

    #[test]
    fn valid_headers_yield_a_session() {
        let id = Uuid::new_v4();
        let session = parse_session(&headers_for(&id.to_string(), "farmer")).expect("session");
        assert_eq!(session.user_id, id);
        assert_eq!(session.role, Role::Farmer);
    }

    #[test]
    fn malformed_headers_stay_anonymous() {
        assert!(parse_session(&HeaderMap::new()).is_none());
        assert!(parse_session(&headers_for("not-a-uuid", "farmer")).is_none());
        assert!(parse_session(&headers_for(&Uuid::new_v4().to_string(), "root")).is_none());
    }

    #[test]
    fn identity_falls_back_to_the_client_address() {
        let session = SessionContext {
            user_id: Uuid::new_v4(),
            role: Role::Customer,
        };
        let identity = request_identity(Some(&session), &HeaderMap::new(), None);
        assert_eq!(identity, session.user_id.to_string());

        let peer: SocketAddr = "192.0.2.7:1234".parse().expect("addr");
        assert_eq!(
            request_identity(None, &HeaderMap::new(), Some(peer)),
            "192.0.2.7"
        );
    }

    #[test]
    fn role_gate_lets_admins_through() {
        let admin = SessionContext {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        let customer = SessionContext {
            user_id: Uuid::new_v4(),
            role: Role::Customer,
        };

        assert!(require_role("test", Some(admin), Role::Farmer).is_ok());
        assert!(require_role("test", Some(customer), Role::Farmer).is_err());
        assert!(require_role("test", None, Role::Customer).is_err());
    }
}
