//! Order handlers. The status-transition endpoint exists only in v2; v1
//! callers get the structured 501 naming what the endpoint supports.

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::application::orders::PlaceOrderCommand;
use crate::domain::types::Role;
use crate::infra::http::envelope::{ApiFailure, ApiResponse, order_error_to_api};
use crate::infra::http::session::{CurrentSession, require_role, require_session};
use crate::infra::http::version::{ApiVersion, ResolvedVersion, VersionMap};

use super::models::*;
use super::state::ApiState;

const SOURCE: &str = "infra::http::api::orders";

pub async fn place_order(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<Response, ApiFailure> {
    let session = require_session(SOURCE, session)?;

    let order = state
        .orders
        .place(PlaceOrderCommand {
            customer_id: session.user_id,
            product_id: payload.product_id,
            quantity: payload.quantity,
        })
        .await
        .map_err(|err| order_error_to_api(SOURCE, err))?;
    Ok(ApiResponse::ok(order).created())
}

pub async fn get_order(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiFailure> {
    let session = require_session(SOURCE, session)?;

    let order = state
        .orders
        .get(id)
        .await
        .map_err(|err| order_error_to_api(SOURCE, err))?
        .ok_or_else(|| ApiFailure::not_found(SOURCE, "Order not found"))?;

    // Customers only see their own orders.
    if !session.is_admin() && order.customer_id != session.user_id {
        return Err(ApiFailure::forbidden(SOURCE));
    }
    Ok(ApiResponse::ok(order).into_response())
}

pub async fn list_orders(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Query(query): Query<OrderListQuery>,
) -> Result<Response, ApiFailure> {
    let session = require_session(SOURCE, session)?;

    // Non-admins are pinned to their own orders regardless of the query.
    let customer_id = if session.is_admin() {
        query.customer_id
    } else {
        Some(session.user_id)
    };

    let orders = state
        .orders
        .list(customer_id, query.status, clamp_limit(query.limit))
        .await
        .map_err(|err| order_error_to_api(SOURCE, err))?;
    Ok(ApiResponse::ok(orders).into_response())
}

pub async fn update_order_status(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Extension(ResolvedVersion(version)): Extension<ResolvedVersion>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OrderStatusRequest>,
) -> Result<Response, ApiFailure> {
    require_role(SOURCE, session, Role::Admin)?;

    // Status transitions shipped in v2; the v1 surface never had them.
    let versions: VersionMap<()> = VersionMap::new().with(ApiVersion::V2, ());
    versions.dispatch(version, SOURCE)?;

    let order = state
        .orders
        .transition(id, payload.status)
        .await
        .map_err(|err| order_error_to_api(SOURCE, err))?;
    Ok(ApiResponse::ok(order).into_response())
}
