//! Cross-cutting middleware: request context, response logging, rate
//! limiting, and CSRF enforcement. Per request the chain runs strictly
//! rate-limit → CSRF → version-resolve → handler.

use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::body::Body;
use metrics::counter;
use time::OffsetDateTime;
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;
use crate::security::csrf::{CSRF_HEADER, CsrfRejection, is_exempt_path, is_protected_method};
use crate::security::rate_limit::RateLimitDecision;

use super::api::ApiState;
use super::envelope::{ApiFailure, ErrorCode};
use super::session::{SessionContext, peer_of, request_identity};

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let actor = request
        .extensions()
        .get::<SessionContext>()
        .map(SessionContext::actor_label);
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "verdura::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                actor = actor.as_deref().unwrap_or(""),
                "request failed",
            );
        } else {
            warn!(
                target = "verdura::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                actor = actor.as_deref().unwrap_or(""),
                "client request error",
            );
        }
    }

    response
}

/// Rate limiting, first in the chain. Scope and ceiling come from the path
/// policy; identity prefers the session user so authenticated callers get
/// per-user limits.
pub async fn rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let (scope, policy) = state.policies.for_path(&path);

    let session = request.extensions().get::<SessionContext>();
    let identity = request_identity(session, request.headers(), peer_of(&request));

    let decision = state.limiter.check(scope, &identity, policy).await;

    if !decision.allowed {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut response = ApiFailure::rate_limited(
            "infra::http::rate_limit",
            decision.retry_after_secs(now),
        );
        apply_rate_limit_headers(&mut response, decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(&mut response, decision);
    response
}

fn apply_rate_limit_headers(response: &mut Response, decision: RateLimitDecision) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert(RATE_LIMIT_LIMIT_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert(RATE_LIMIT_REMAINING_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.reset_at.to_string()) {
        headers.insert(RATE_LIMIT_RESET_HEADER, value);
    }
}

/// CSRF enforcement for state-changing methods. Rejections are security
/// events: logged with path, method, and originating address under a
/// dedicated target, apart from ordinary request warnings.
pub async fn csrf_protect(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if !is_protected_method(request.method()) || is_exempt_path(path) {
        return next.run(request).await;
    }

    let session = request.extensions().get::<SessionContext>();
    let identity = request_identity(session, request.headers(), peer_of(&request));
    let origin = peer_of(&request)
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let token = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok());

    let rejection = match token {
        None => Some((CsrfRejection::Missing, ErrorCode::CsrfTokenMissing)),
        Some(token) => match state.csrf.verify(token, &identity) {
            Ok(()) => None,
            Err(err) => Some((err, ErrorCode::CsrfValidationFailed)),
        },
    };

    if let Some((rejection, code)) = rejection {
        counter!("verdura_csrf_rejected_total").increment(1);
        warn!(
            target: "verdura::security::csrf",
            path,
            method = %request.method(),
            origin = %origin,
            reason = %rejection,
            "CSRF rejection"
        );
        return ApiFailure::new("infra::http::csrf", code, rejection.to_string())
            .into_response();
    }

    next.run(request).await
}
