//! Trash administration handlers (admin only).

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};

use time::OffsetDateTime;

use crate::domain::soft_delete::{Entity, deleted_for};
use crate::domain::types::Role;
use crate::infra::http::envelope::{ApiFailure, ApiResponse, trash_error_to_api};
use crate::infra::http::session::{CurrentSession, require_role};

use super::models::*;
use super::state::ApiState;

const SOURCE: &str = "infra::http::api::trash";

fn parse_entity(raw: &str) -> Result<Entity, ApiFailure> {
    let entity = Entity::from_str(raw).map_err(|_| {
        ApiFailure::validation(SOURCE, format!("unknown entity `{raw}`")).with_field("entity")
    })?;
    if !entity.supports_soft_delete() {
        return Err(
            ApiFailure::validation(SOURCE, format!("entity `{entity}` does not soft-delete"))
                .with_field("entity"),
        );
    }
    Ok(entity)
}

pub async fn list_trash(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Path(entity): Path<String>,
    Query(query): Query<TrashListQuery>,
) -> Result<Response, ApiFailure> {
    require_role(SOURCE, session, Role::Admin)?;
    let entity = parse_entity(&entity)?;

    let entries = state
        .trash
        .list(entity, clamp_limit(query.limit))
        .await
        .map_err(|err| trash_error_to_api(SOURCE, err))?;

    let now = OffsetDateTime::now_utc();
    let entries: Vec<serde_json::Value> = entries
        .into_iter()
        .map(|entry| {
            let age = deleted_for(Some(entry.deleted_at), now)
                .map(|age| age.whole_seconds())
                .unwrap_or(0);
            serde_json::json!({
                "id": entry.id,
                "label": entry.label,
                "deleted_at": entry.deleted_at,
                "in_trash_seconds": age,
            })
        })
        .collect();
    Ok(ApiResponse::ok(entries).into_response())
}

pub async fn restore(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Path(entity): Path<String>,
    Json(payload): Json<TrashActionRequest>,
) -> Result<Response, ApiFailure> {
    require_role(SOURCE, session, Role::Admin)?;
    let entity = parse_entity(&entity)?;

    let restored = state
        .trash
        .restore(entity, &payload.ids)
        .await
        .map_err(|err| trash_error_to_api(SOURCE, err))?;
    Ok(ApiResponse::ok(serde_json::json!({ "restored": restored })).into_response())
}

pub async fn hard_delete(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Path(entity): Path<String>,
    Json(payload): Json<TrashActionRequest>,
) -> Result<Response, ApiFailure> {
    let session = require_role(SOURCE, session, Role::Admin)?;
    let entity = parse_entity(&entity)?;

    let removed = state
        .trash
        .hard_delete(entity, &payload.ids, &session.actor_label())
        .await
        .map_err(|err| trash_error_to_api(SOURCE, err))?;
    Ok(ApiResponse::ok(serde_json::json!({ "removed": removed }))
        .with_message("Records permanently removed")
        .into_response())
}
