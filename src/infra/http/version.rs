//! API version negotiation and dispatch.
//!
//! Precedence: `X-API-Version` > `Accept-Version` > `?version=` > a `/v{n}/`
//! path segment > default-to-current. A recognized source carrying an
//! unsupported value is an error, not a fall-through.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use time::{Date, OffsetDateTime};

use super::envelope::{ApiFailure, ErrorCode};

pub const VERSION_HEADER: &str = "x-api-version";
pub const ALT_VERSION_HEADER: &str = "accept-version";
pub const CURRENT_VERSION_HEADER: &str = "x-api-current-version";
pub const SUPPORTED_VERSIONS_HEADER: &str = "x-api-supported-versions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApiVersion {
    V1,
    V2,
}

pub const CURRENT: ApiVersion = ApiVersion::V2;
pub const SUPPORTED: &[ApiVersion] = &[ApiVersion::V1, ApiVersion::V2];

impl ApiVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

impl Display for ApiVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiVersion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(Self::V1),
            "v2" | "2" => Ok(Self::V2),
            _ => Err(()),
        }
    }
}

pub fn supported_list() -> String {
    SUPPORTED
        .iter()
        .map(|v| v.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The negotiated version, inserted as a request extension by
/// [`resolve_api_version`].
#[derive(Debug, Clone, Copy)]
pub struct ResolvedVersion(pub ApiVersion);

/// Resolve the requested version from headers, query string, and path.
/// Returns the offending raw value when a source names an unknown version.
pub fn resolve_version(
    headers: &HeaderMap,
    query: Option<&str>,
    path: &str,
) -> Result<ApiVersion, String> {
    for header in [VERSION_HEADER, ALT_VERSION_HEADER] {
        if let Some(value) = headers.get(header) {
            let raw = value.to_str().unwrap_or_default();
            return ApiVersion::from_str(raw).map_err(|_| raw.to_string());
        }
    }

    if let Some(raw) = query_version(query) {
        return ApiVersion::from_str(raw).map_err(|_| raw.to_string());
    }

    if let Some(raw) = path_version(path) {
        return ApiVersion::from_str(raw).map_err(|_| raw.to_string());
    }

    Ok(CURRENT)
}

fn query_version(query: Option<&str>) -> Option<&str> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("version="))
}

fn path_version(path: &str) -> Option<&str> {
    path.split('/').find(|segment| {
        segment.len() >= 2
            && segment.starts_with('v')
            && segment[1..].bytes().all(|b| b.is_ascii_digit())
    })
}

/// Middleware: negotiate the version before the handler runs and annotate
/// the response afterwards, whatever the outcome was.
pub async fn resolve_api_version(request: Request<Body>, next: Next) -> Response {
    let version = match resolve_version(
        request.headers(),
        request.uri().query(),
        request.uri().path(),
    ) {
        Ok(version) => version,
        Err(raw) => {
            let mut response = ApiFailure::new(
                "infra::http::version",
                ErrorCode::UnsupportedApiVersion,
                "Unsupported API version",
            )
            .with_details(format!(
                "`{raw}` is not supported; supported versions: {}",
                supported_list()
            ))
            .into_response();
            annotate(response.headers_mut(), CURRENT);
            return response;
        }
    };

    let mut request = request;
    request.extensions_mut().insert(ResolvedVersion(version));
    let mut response = next.run(request).await;
    annotate(response.headers_mut(), version);
    response
}

fn annotate(headers: &mut HeaderMap, resolved: ApiVersion) {
    headers.insert(VERSION_HEADER, HeaderValue::from_static(resolved.as_str()));
    headers.insert(
        CURRENT_VERSION_HEADER,
        HeaderValue::from_static(CURRENT.as_str()),
    );
    if let Ok(value) = HeaderValue::from_str(&supported_list()) {
        headers.insert(SUPPORTED_VERSIONS_HEADER, value);
    }
}

/// Per-endpoint dispatch table. Endpoints register a handler value per
/// version they implement; a resolved version without an entry yields the
/// 501 rejection listing what the endpoint does support.
pub struct VersionMap<T> {
    entries: Vec<(ApiVersion, T)>,
}

impl<T> VersionMap<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, version: ApiVersion, value: T) -> Self {
        self.entries.retain(|(existing, _)| *existing != version);
        self.entries.push((version, value));
        self
    }

    pub fn get(&self, version: ApiVersion) -> Option<&T> {
        self.entries
            .iter()
            .find(|(candidate, _)| *candidate == version)
            .map(|(_, value)| value)
    }

    pub fn supported(&self) -> String {
        let mut versions: Vec<ApiVersion> =
            self.entries.iter().map(|(version, _)| *version).collect();
        versions.sort();
        versions
            .iter()
            .map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Look up the handler value for `version`, or produce the structured
    /// 501 rejection for this endpoint.
    pub fn dispatch(&self, version: ApiVersion, source: &'static str) -> Result<&T, ApiFailure> {
        self.get(version).ok_or_else(|| {
            ApiFailure::new(
                source,
                ErrorCode::VersionNotImplemented,
                "Endpoint not implemented for this API version",
            )
            .with_details(format!(
                "requested {version}; this endpoint supports: {}",
                self.supported()
            ))
        })
    }
}

impl<T> Default for VersionMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Deprecation metadata for responses served by a sunsetting version.
/// Annotation only; dispatch behavior is unchanged.
#[derive(Debug, Clone, Copy)]
pub struct Deprecation {
    pub deprecated_since: Date,
    pub sunset: Date,
    pub note: &'static str,
}

impl Deprecation {
    pub fn remaining_days(&self, now: OffsetDateTime) -> i64 {
        (self.sunset - now.date()).whole_days().max(0)
    }

    pub fn meta(&self, now: OffsetDateTime) -> serde_json::Value {
        serde_json::json!({
            "deprecated_since": self.deprecated_since.to_string(),
            "sunset": self.sunset.to_string(),
            "remaining_days": self.remaining_days(now),
            "note": self.note,
        })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn header_beats_query_beats_path() {
        let mut headers = HeaderMap::new();
        headers.insert(VERSION_HEADER, HeaderValue::from_static("v1"));

        let resolved = resolve_version(&headers, Some("version=v2"), "/v2/products");
        assert_eq!(resolved, Ok(ApiVersion::V1));

        let resolved = resolve_version(&HeaderMap::new(), Some("version=v2"), "/v1/products");
        assert_eq!(resolved, Ok(ApiVersion::V2));

        let resolved = resolve_version(&HeaderMap::new(), None, "/api/v1/products");
        assert_eq!(resolved, Ok(ApiVersion::V1));
    }

    #[test]
    fn alternate_header_is_second_in_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(ALT_VERSION_HEADER, HeaderValue::from_static("v1"));
        headers.insert(VERSION_HEADER, HeaderValue::from_static("v2"));

        assert_eq!(resolve_version(&headers, None, "/"), Ok(ApiVersion::V2));

        let mut headers = HeaderMap::new();
        headers.insert(ALT_VERSION_HEADER, HeaderValue::from_static("v1"));
        assert_eq!(resolve_version(&headers, None, "/"), Ok(ApiVersion::V1));
    }

    #[test]
    fn absent_sources_default_to_current() {
        assert_eq!(
            resolve_version(&HeaderMap::new(), None, "/api/products"),
            Ok(CURRENT)
        );
    }

    #[test]
    fn unknown_versions_error_instead_of_falling_through() {
        let mut headers = HeaderMap::new();
        headers.insert(VERSION_HEADER, HeaderValue::from_static("v9"));
        assert_eq!(
            resolve_version(&headers, Some("version=v2"), "/"),
            Err("v9".to_string())
        );
    }

    #[test]
    fn version_map_dispatches_and_rejects() {
        let map = VersionMap::new()
            .with(ApiVersion::V2, "modern")
            .with(ApiVersion::V1, "legacy");

        assert_eq!(map.dispatch(ApiVersion::V1, "test").ok(), Some(&"legacy"));

        let only_v2: VersionMap<&str> = VersionMap::new().with(ApiVersion::V2, "modern");
        let failure = only_v2.dispatch(ApiVersion::V1, "test").unwrap_err();
        assert_eq!(failure.code(), ErrorCode::VersionNotImplemented);
    }

    #[test]
    fn deprecation_counts_remaining_days() {
        let deprecation = Deprecation {
            deprecated_since: date!(2025 - 01 - 01),
            sunset: date!(2025 - 12 - 31),
            note: "migrate to v2",
        };
        let now = date!(2025 - 12 - 01).midnight().assume_utc();
        assert_eq!(deprecation.remaining_days(now), 30);

        let past_sunset = date!(2026 - 06 - 01).midnight().assume_utc();
        assert_eq!(deprecation.remaining_days(past_sunset), 0);
    }
}
