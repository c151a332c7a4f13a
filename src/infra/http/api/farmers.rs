//! Farmer profile handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::application::repos::{CreateFarmerParams, UpdateFarmerParams};
use crate::domain::soft_delete::Entity;
use crate::domain::types::Role;
use crate::infra::db::filter::{Filter, FilterValue};
use crate::infra::db::soft_delete::DeleteRequest;
use crate::infra::http::envelope::{ApiFailure, ApiResponse, repo_error_to_api};
use crate::infra::http::session::{CurrentSession, require_role};

use super::models::*;
use super::state::ApiState;

const SOURCE: &str = "infra::http::api::farmers";

pub async fn list_farmers(
    State(state): State<ApiState>,
    Query(query): Query<FarmerListQuery>,
) -> Result<Response, ApiFailure> {
    let farmers = state
        .farmers
        .list_farmers(query.region.as_deref(), clamp_limit(query.limit))
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;
    Ok(ApiResponse::ok(farmers).into_response())
}

pub async fn get_farmer(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiFailure> {
    match state
        .farmers
        .find_farmer(id)
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?
    {
        Some(farmer) => Ok(ApiResponse::ok(farmer).into_response()),
        None => Err(ApiFailure::not_found(SOURCE, "Farmer not found")),
    }
}

pub async fn create_farmer(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Json(payload): Json<CreateFarmerRequest>,
) -> Result<Response, ApiFailure> {
    require_role(SOURCE, session, Role::Admin)?;

    if payload.farm_name.trim().is_empty() {
        return Err(ApiFailure::validation(SOURCE, "farm name is required").with_field("farm_name"));
    }

    let farmer = state
        .farmers
        .create_farmer(CreateFarmerParams {
            user_id: payload.user_id,
            farm_name: payload.farm_name,
            region: payload.region,
            bio: payload.bio,
            certified_organic: payload.certified_organic,
        })
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;
    Ok(ApiResponse::ok(farmer).created())
}

pub async fn update_farmer(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateFarmerRequest>,
) -> Result<Response, ApiFailure> {
    require_role(SOURCE, session, Role::Farmer)?;

    let farmer = state
        .farmers
        .update_farmer(UpdateFarmerParams {
            id,
            farm_name: payload.farm_name,
            region: payload.region,
            bio: payload.bio,
            certified_organic: payload.certified_organic,
        })
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;
    Ok(ApiResponse::ok(farmer).into_response())
}

pub async fn delete_farmer(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiFailure> {
    require_role(SOURCE, session, Role::Admin)?;

    let affected = state
        .trash
        .store()
        .delete(DeleteRequest {
            entity: Entity::Farmers,
            filter: Filter::new().eq("id", FilterValue::Uuid(id)),
        })
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;
    if affected == 0 {
        return Err(ApiFailure::not_found(SOURCE, "Farmer not found"));
    }

    Ok(ApiResponse::ok(serde_json::json!({ "deleted": affected }))
        .with_message("Farmer moved to trash")
        .into_response())
}
