//! Uniform response envelope and the error-code taxonomy.
//!
//! Success bodies are `{success: true, data, message?, meta?}`; failures are
//! `{success: false, error: {code, message, details?, field?}}`. The code
//! set is closed and maps deterministically onto HTTP statuses. Outside
//! development, internal detail is replaced by a generic message before it
//! reaches the wire; diagnostics travel in the response-extension
//! [`ErrorReport`] and surface only in logs.

use std::sync::OnceLock;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::orders::OrderError;
use crate::application::repos::RepoError;
use crate::application::trash::TrashError;
use crate::config::RuntimeEnv;

static RUNTIME_ENV: OnceLock<RuntimeEnv> = OnceLock::new();

/// Record the runtime environment once at startup. Unset (as in most tests)
/// behaves as production: nothing internal leaks by default.
pub fn configure_runtime(env: RuntimeEnv) {
    let _ = RUNTIME_ENV.set(env);
}

fn runtime_env() -> RuntimeEnv {
    RUNTIME_ENV.get().copied().unwrap_or(RuntimeEnv::Production)
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
            meta: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn created(self) -> Response {
        (StatusCode::CREATED, Json(self)).into_response()
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Closed error taxonomy. The status map is exhaustive by construction;
/// `InternalError` is the 500 fallback for anything unforeseen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    CsrfTokenMissing,
    CsrfValidationFailed,
    ValidationError,
    BadRequest,
    UnsupportedApiVersion,
    NotFound,
    Conflict,
    RateLimited,
    VersionNotImplemented,
    DatabaseError,
    InternalError,
    ExternalServiceError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::CsrfTokenMissing => "csrf_token_missing",
            Self::CsrfValidationFailed => "csrf_validation_failed",
            Self::ValidationError => "validation_error",
            Self::BadRequest => "bad_request",
            Self::UnsupportedApiVersion => "unsupported_api_version",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::RateLimited => "rate_limited",
            Self::VersionNotImplemented => "version_not_implemented",
            Self::DatabaseError => "database_error",
            Self::InternalError => "internal_error",
            Self::ExternalServiceError => "external_service_error",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::CsrfTokenMissing | Self::CsrfValidationFailed => {
                StatusCode::FORBIDDEN
            }
            Self::ValidationError | Self::BadRequest | Self::UnsupportedApiVersion => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::VersionNotImplemented => StatusCode::NOT_IMPLEMENTED,
            Self::DatabaseError | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ExternalServiceError => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn is_server_fault(self) -> bool {
        self.status().is_server_error()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

#[derive(Debug, Serialize)]
struct FailureEnvelope {
    success: bool,
    error: ErrorBody,
}

#[derive(Debug)]
pub struct ApiFailure {
    source: &'static str,
    code: ErrorCode,
    message: String,
    details: Option<String>,
    field: Option<String>,
}

impl ApiFailure {
    pub fn new(source: &'static str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            source,
            code,
            message: message.into(),
            details: None,
            field: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn unauthorized(source: &'static str) -> Self {
        Self::new(source, ErrorCode::Unauthorized, "Authentication required")
    }

    pub fn forbidden(source: &'static str) -> Self {
        Self::new(source, ErrorCode::Forbidden, "Insufficient permissions")
    }

    pub fn not_found(source: &'static str, message: &'static str) -> Self {
        Self::new(source, ErrorCode::NotFound, message)
    }

    pub fn validation(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(source, ErrorCode::ValidationError, message)
    }

    pub fn bad_request(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(source, ErrorCode::BadRequest, message)
    }

    pub fn rate_limited(source: &'static str, retry_after: u64) -> Response {
        let failure = Self::new(source, ErrorCode::RateLimited, "Rate limit exceeded")
            .with_details(format!("Retry after {retry_after} seconds"));
        let mut response = failure.into_response();
        if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, value);
        }
        response
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = self.code.status();
        let detail_for_log = self
            .details
            .clone()
            .unwrap_or_else(|| self.message.clone());

        let (message, details) =
            if self.code.is_server_fault() && !runtime_env().is_development() {
                ("An internal error occurred".to_string(), None)
            } else {
                (self.message, self.details)
            };

        let body = FailureEnvelope {
            success: false,
            error: ErrorBody {
                code: self.code.as_str(),
                message,
                details,
                field: self.field,
            },
        };

        let mut response = (status, Json(body)).into_response();
        ErrorReport::from_message(
            self.source,
            status,
            format!("{}: {detail_for_log}", self.code.as_str()),
        )
        .attach(&mut response);
        response
    }
}

/// Map a repository error to a consistent API failure.
pub fn repo_error_to_api(source: &'static str, err: RepoError) -> ApiFailure {
    match err {
        RepoError::NotFound => ApiFailure::not_found(source, "Resource not found"),
        RepoError::Duplicate { constraint } => {
            ApiFailure::new(source, ErrorCode::Conflict, "Duplicate record")
                .with_details(constraint)
        }
        RepoError::InvalidInput { message } => ApiFailure::validation(source, message),
        RepoError::Timeout => {
            ApiFailure::new(source, ErrorCode::DatabaseError, "Database timeout")
        }
        RepoError::Persistence(message) => {
            ApiFailure::new(source, ErrorCode::DatabaseError, "Database error")
                .with_details(message)
        }
    }
}

pub fn order_error_to_api(source: &'static str, err: OrderError) -> ApiFailure {
    match err {
        OrderError::Repo(err) => repo_error_to_api(source, err),
        OrderError::NotFound => ApiFailure::not_found(source, "Order not found"),
        OrderError::ProductNotFound => ApiFailure::not_found(source, "Product not found"),
        OrderError::Validation(message) => ApiFailure::validation(source, message),
        OrderError::IllegalTransition { from, to } => {
            ApiFailure::new(source, ErrorCode::Conflict, "Illegal status transition")
                .with_details(format!("{from} -> {to}"))
                .with_field("status")
        }
    }
}

pub fn trash_error_to_api(source: &'static str, err: TrashError) -> ApiFailure {
    match err {
        TrashError::Repo(err) => repo_error_to_api(source, err),
        TrashError::Validation(message) => ApiFailure::validation(source, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_maps_to_its_status_class() {
        let cases = [
            (ErrorCode::Unauthorized, 401),
            (ErrorCode::Forbidden, 403),
            (ErrorCode::CsrfTokenMissing, 403),
            (ErrorCode::CsrfValidationFailed, 403),
            (ErrorCode::ValidationError, 400),
            (ErrorCode::BadRequest, 400),
            (ErrorCode::UnsupportedApiVersion, 400),
            (ErrorCode::NotFound, 404),
            (ErrorCode::Conflict, 409),
            (ErrorCode::RateLimited, 429),
            (ErrorCode::VersionNotImplemented, 501),
            (ErrorCode::DatabaseError, 500),
            (ErrorCode::InternalError, 500),
            (ErrorCode::ExternalServiceError, 503),
        ];
        for (code, status) in cases {
            assert_eq!(code.status().as_u16(), status, "{}", code.as_str());
        }
    }

    #[test]
    fn server_faults_are_scrubbed_outside_development() {
        // RUNTIME_ENV is unset in tests, which reads as production.
        let failure = ApiFailure::new(
            "test",
            ErrorCode::DatabaseError,
            "connection refused on 10.0.0.5:5432",
        );
        let response = failure.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        // The detail survives for logging even though the body is generic.
        assert!(report.messages[0].contains("connection refused"));
    }

    #[test]
    fn client_faults_keep_their_message() {
        let failure = ApiFailure::validation("test", "quantity must be at least 1");
        let response = failure.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let response = ApiFailure::rate_limited("test", 42);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(axum::http::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("42")
        );
    }
}
