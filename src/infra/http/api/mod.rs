mod csrf;
mod farmers;
mod models;
mod orders;
mod products;
mod state;
mod subscriptions;
mod trash;
mod users;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::infra::http::{health, middleware, session, version};

/// Build the storefront API router. Per request the wrapped chain runs
/// request-context → session → rate-limit → CSRF → version-resolve →
/// handler, with response logging outermost.
pub fn build_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/csrf", get(csrf::issue_token))
        .route(
            "/api/products",
            get(products::list_products).post(products::create_product),
        )
        .route("/api/products/search", get(products::search_products))
        .route(
            "/api/products/{id}",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/api/farmers",
            get(farmers::list_farmers).post(farmers::create_farmer),
        )
        .route(
            "/api/farmers/{id}",
            get(farmers::get_farmer)
                .put(farmers::update_farmer)
                .delete(farmers::delete_farmer),
        )
        .route(
            "/api/orders",
            get(orders::list_orders).post(orders::place_order),
        )
        .route("/api/orders/{id}", get(orders::get_order))
        .route("/api/orders/{id}/status", post(orders::update_order_status))
        .route(
            "/api/subscriptions",
            get(subscriptions::list_subscriptions).post(subscriptions::create_subscription),
        )
        .route(
            "/api/subscriptions/{id}",
            get(subscriptions::get_subscription).delete(subscriptions::delete_subscription),
        )
        .route(
            "/api/subscriptions/{id}/pause",
            post(subscriptions::pause_subscription),
        )
        .route(
            "/api/subscriptions/{id}/resume",
            post(subscriptions::resume_subscription),
        )
        .route("/api/trash/{entity}", get(trash::list_trash))
        .route("/api/trash/{entity}/restore", post(trash::restore))
        .route("/api/trash/{entity}/hard-delete", post(trash::hard_delete))
        .with_state(state.clone())
        .layer(axum_middleware::from_fn(version::resolve_api_version))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::csrf_protect,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::rate_limit,
        ))
        .layer(axum_middleware::from_fn(session::attach_session))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .layer(axum_middleware::from_fn(middleware::log_responses))
}
