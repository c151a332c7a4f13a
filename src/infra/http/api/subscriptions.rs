//! Produce subscription handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::application::repos::CreateSubscriptionParams;
use crate::domain::soft_delete::Entity;
use crate::domain::types::SubscriptionStatus;
use crate::infra::db::filter::{Filter, FilterValue};
use crate::infra::db::soft_delete::DeleteRequest;
use crate::infra::http::envelope::{ApiFailure, ApiResponse, repo_error_to_api};
use crate::infra::http::session::{CurrentSession, require_session};

use super::models::*;
use super::state::ApiState;

const SOURCE: &str = "infra::http::api::subscriptions";

pub async fn create_subscription(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> Result<Response, ApiFailure> {
    let session = require_session(SOURCE, session)?;

    let subscription = state
        .subscriptions
        .create_subscription(CreateSubscriptionParams {
            customer_id: session.user_id,
            product_id: payload.product_id,
            cadence: payload.cadence,
            next_delivery_on: payload.next_delivery_on,
        })
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;
    Ok(ApiResponse::ok(subscription).created())
}

pub async fn get_subscription(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiFailure> {
    let session = require_session(SOURCE, session)?;

    let subscription = state
        .subscriptions
        .find_subscription(id)
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?
        .ok_or_else(|| ApiFailure::not_found(SOURCE, "Subscription not found"))?;

    if !session.is_admin() && subscription.customer_id != session.user_id {
        return Err(ApiFailure::forbidden(SOURCE));
    }
    Ok(ApiResponse::ok(subscription).into_response())
}

pub async fn list_subscriptions(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Query(query): Query<SubscriptionListQuery>,
) -> Result<Response, ApiFailure> {
    let session = require_session(SOURCE, session)?;

    let customer_id = if session.is_admin() {
        query.customer_id
    } else {
        Some(session.user_id)
    };

    let subscriptions = state
        .subscriptions
        .list_subscriptions(customer_id, query.status, clamp_limit(query.limit))
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;
    Ok(ApiResponse::ok(subscriptions).into_response())
}

async fn set_status(
    state: &ApiState,
    session: Option<crate::infra::http::session::SessionContext>,
    id: Uuid,
    status: SubscriptionStatus,
) -> Result<Response, ApiFailure> {
    let session = require_session(SOURCE, session)?;

    let subscription = state
        .subscriptions
        .find_subscription(id)
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?
        .ok_or_else(|| ApiFailure::not_found(SOURCE, "Subscription not found"))?;
    if !session.is_admin() && subscription.customer_id != session.user_id {
        return Err(ApiFailure::forbidden(SOURCE));
    }

    let updated = state
        .subscriptions
        .update_subscription_status(id, status)
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;
    Ok(ApiResponse::ok(updated).into_response())
}

pub async fn pause_subscription(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiFailure> {
    set_status(&state, session, id, SubscriptionStatus::Paused).await
}

pub async fn resume_subscription(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiFailure> {
    set_status(&state, session, id, SubscriptionStatus::Active).await
}

pub async fn delete_subscription(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiFailure> {
    let session = require_session(SOURCE, session)?;

    let subscription = state
        .subscriptions
        .find_subscription(id)
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?
        .ok_or_else(|| ApiFailure::not_found(SOURCE, "Subscription not found"))?;
    if !session.is_admin() && subscription.customer_id != session.user_id {
        return Err(ApiFailure::forbidden(SOURCE));
    }

    let affected = state
        .trash
        .store()
        .delete(DeleteRequest {
            entity: Entity::Subscriptions,
            filter: Filter::new().eq("id", FilterValue::Uuid(id)),
        })
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;

    Ok(ApiResponse::ok(serde_json::json!({ "deleted": affected }))
        .with_message("Subscription moved to trash")
        .into_response())
}
