//! Product handlers. Listing is version-dispatched: v2 wraps the page in
//! pagination meta, v1 returns the bare array and carries deprecation
//! annotations until its sunset.

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::response::{IntoResponse, Response};
use time::OffsetDateTime;
use time::macros::date;
use uuid::Uuid;

use crate::application::repos::{
    CreateProductParams, ProductQueryFilter, UpdateProductParams,
};
use crate::domain::types::Role;
use crate::infra::http::envelope::{ApiFailure, ApiResponse, repo_error_to_api};
use crate::infra::http::session::{CurrentSession, require_role};
use crate::infra::http::version::{ApiVersion, Deprecation, ResolvedVersion, VersionMap};

use super::models::*;
use super::state::ApiState;

const SOURCE: &str = "infra::http::api::products";

const V1_DEPRECATION: Deprecation = Deprecation {
    deprecated_since: date!(2026 - 01 - 15),
    sunset: date!(2026 - 12 - 31),
    note: "v1 product listings return a bare array; migrate to v2 pagination",
};

/// Listing styles per version; the map is the endpoint's dispatch table.
#[derive(Clone, Copy)]
enum ListStyle {
    Bare,
    Paginated,
}

fn list_styles() -> VersionMap<ListStyle> {
    VersionMap::new()
        .with(ApiVersion::V1, ListStyle::Bare)
        .with(ApiVersion::V2, ListStyle::Paginated)
}

pub async fn list_products(
    State(state): State<ApiState>,
    Extension(ResolvedVersion(version)): Extension<ResolvedVersion>,
    Query(query): Query<ProductListQuery>,
) -> Result<Response, ApiFailure> {
    let style = *list_styles().dispatch(version, SOURCE)?;

    let filter = ProductQueryFilter {
        farmer_id: query.farmer_id,
        category: query.category,
        in_stock_only: query.in_stock,
        trashed_only: false,
    };
    let limit = clamp_limit(query.limit);
    let offset = query.offset.unwrap_or(0).max(0);

    let products = state
        .catalog
        .list(&filter, limit, offset)
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;

    match style {
        ListStyle::Bare => {
            let now = OffsetDateTime::now_utc();
            Ok(ApiResponse::ok(products)
                .with_meta(serde_json::json!({ "deprecation": V1_DEPRECATION.meta(now) }))
                .into_response())
        }
        ListStyle::Paginated => {
            let total = state
                .catalog
                .count(&filter)
                .await
                .map_err(|err| repo_error_to_api(SOURCE, err))?;
            Ok(ApiResponse::ok(products)
                .with_meta(serde_json::json!({
                    "total": total,
                    "limit": limit,
                    "offset": offset,
                }))
                .into_response())
        }
    }
}

pub async fn get_product(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiFailure> {
    let product = state
        .catalog
        .get(id)
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;

    match product {
        Some(product) => Ok(ApiResponse::ok(product).into_response()),
        None => Err(ApiFailure::not_found(SOURCE, "Product not found")),
    }
}

pub async fn search_products(
    State(state): State<ApiState>,
    Query(query): Query<ProductSearchQuery>,
) -> Result<Response, ApiFailure> {
    let term = query.q.trim();
    if term.is_empty() {
        return Err(ApiFailure::validation(SOURCE, "search term is required").with_field("q"));
    }

    let products = state
        .catalog
        .search(term, clamp_limit(query.limit))
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;
    Ok(ApiResponse::ok(products).into_response())
}

pub async fn create_product(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Json(payload): Json<CreateProductRequest>,
) -> Result<Response, ApiFailure> {
    require_role(SOURCE, session, Role::Farmer)?;

    if payload.price_cents <= 0 {
        return Err(
            ApiFailure::validation(SOURCE, "price must be positive").with_field("price_cents")
        );
    }
    if payload.stock < 0 {
        return Err(ApiFailure::validation(SOURCE, "stock cannot be negative").with_field("stock"));
    }

    let product = state
        .catalog
        .create(CreateProductParams {
            farmer_id: payload.farmer_id,
            name: payload.name,
            slug: payload.slug,
            description: payload.description,
            price_cents: payload.price_cents,
            unit: payload.unit,
            stock: payload.stock,
            category: payload.category,
        })
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;

    Ok(ApiResponse::ok(product).created())
}

pub async fn update_product(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<Response, ApiFailure> {
    require_role(SOURCE, session, Role::Farmer)?;

    let product = state
        .catalog
        .update(UpdateProductParams {
            id,
            name: payload.name,
            description: payload.description,
            price_cents: payload.price_cents,
            unit: payload.unit,
            stock: payload.stock,
            category: payload.category,
        })
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;

    Ok(ApiResponse::ok(product).into_response())
}

pub async fn delete_product(
    State(state): State<ApiState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiFailure> {
    require_role(SOURCE, session, Role::Farmer)?;

    let affected = state
        .catalog
        .delete(id)
        .await
        .map_err(|err| repo_error_to_api(SOURCE, err))?;
    if affected == 0 {
        return Err(ApiFailure::not_found(SOURCE, "Product not found"));
    }

    Ok(ApiResponse::ok(serde_json::json!({ "deleted": affected }))
        .with_message("Product moved to trash")
        .into_response())
}
