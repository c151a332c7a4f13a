//! Health endpoint: database, cache, memory, and uptime checks.
//!
//! A dead database makes the process unhealthy (503). A dead distributed
//! cache tier only degrades it (200): the tiered cache serves local-only.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::cache::TierHealth;

use super::api::ApiState;
use super::envelope::ApiResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct DatabaseCheck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MemoryCheck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rss_bytes: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub database: DatabaseCheck,
    pub cache: TierHealth,
    pub memory: MemoryCheck,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: HealthChecks,
}

pub async fn health(State(state): State<ApiState>) -> Response {
    let db_started = Instant::now();
    let database = match state.db.health_check().await {
        Ok(()) => DatabaseCheck {
            ok: true,
            latency_ms: Some(db_started.elapsed().as_millis() as u64),
            error: None,
        },
        Err(err) => DatabaseCheck {
            ok: false,
            latency_ms: None,
            error: Some(err.to_string()),
        },
    };

    let cache = state.cache.health().await;
    let memory = memory_check();
    let uptime_seconds = state.started_at.elapsed().as_secs();

    let status = if !database.ok {
        HealthStatus::Unhealthy
    } else if !cache.healthy {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    let report = HealthReport {
        status,
        checks: HealthChecks {
            database,
            cache,
            memory,
            uptime_seconds,
        },
    };

    let http_status = match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(ApiResponse::ok(report))).into_response()
}

/// Best-effort resident set size from procfs; absent on platforms without
/// it, which still counts as ok.
fn memory_check() -> MemoryCheck {
    let rss_bytes = std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|statm| {
            statm
                .split_whitespace()
                .nth(1)
                .and_then(|pages| pages.parse::<u64>().ok())
        })
        .map(|pages| pages * 4096);
    MemoryCheck {
        ok: true,
        rss_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_check_reports_rss_on_linux() {
        let check = memory_check();
        assert!(check.ok);
        if let Some(rss) = check.rss_bytes {
            assert!(rss > 0);
        }
    }
}
