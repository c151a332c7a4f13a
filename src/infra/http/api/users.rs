//! User administration handlers (admin only).

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::application::repos::{CreateUserParams, UpdateUserParams};
use crate::domain::soft_delete::Entity;
use crate::domain::types::Role;
use crate::infra::db::filter::{Filter, FilterValue};
use crate::infra::db::soft_delete::DeleteRequest;
use crate::infra::http::envelope::{ApiFailure, ApiResponse, repo_error_to_api};
use crate::infra::http::session::{CurrentSession, require_role};

use super::models::*;
use super::state::ApiState;

const SOURCE: &str = "infra::http::api::users";

pub async fn list_users(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Query(query): Query<UserListQuery>,
) -> Result<Response, ApiFailure> {
    require_role(SOURCE, session, Role::Admin)?;

    let users = state
        .users
        .list_users(query.role, clamp_limit(query.limit))
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;
    Ok(ApiResponse::ok(users).into_response())
}

pub async fn get_user(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiFailure> {
    require_role(SOURCE, session, Role::Admin)?;

    match state
        .users
        .find_user(id)
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?
    {
        Some(user) => Ok(ApiResponse::ok(user).into_response()),
        None => Err(ApiFailure::not_found(SOURCE, "User not found")),
    }
}

pub async fn create_user(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Response, ApiFailure> {
    require_role(SOURCE, session, Role::Admin)?;

    if !payload.email.contains('@') {
        return Err(ApiFailure::validation(SOURCE, "invalid email address").with_field("email"));
    }

    let user = state
        .users
        .create_user(CreateUserParams {
            email: payload.email,
            name: payload.name,
            role: payload.role,
        })
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;
    Ok(ApiResponse::ok(user).created())
}

pub async fn update_user(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Response, ApiFailure> {
    require_role(SOURCE, session, Role::Admin)?;

    let user = state
        .users
        .update_user(UpdateUserParams {
            id,
            email: payload.email,
            name: payload.name,
            role: payload.role,
        })
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;
    Ok(ApiResponse::ok(user).into_response())
}

pub async fn delete_user(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiFailure> {
    let session = require_role(SOURCE, session, Role::Admin)?;
    if session.user_id == id {
        return Err(ApiFailure::validation(SOURCE, "cannot delete your own account"));
    }

    let affected = state
        .trash
        .store()
        .delete(DeleteRequest {
            entity: Entity::Users,
            filter: Filter::new().eq("id", FilterValue::Uuid(id)),
        })
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;
    if affected == 0 {
        return Err(ApiFailure::not_found(SOURCE, "User not found"));
    }

    Ok(ApiResponse::ok(serde_json::json!({ "deleted": affected }))
        .with_message("User moved to trash")
        .into_response())
}
