use std::sync::Arc;
use std::time::Instant;

use crate::application::catalog::ProductCatalogService;
use crate::application::orders::OrderService;
use crate::application::repos::{FarmersRepo, SubscriptionsRepo, UsersRepo};
use crate::application::trash::TrashService;
use crate::cache::TieredCache;
use crate::infra::db::PgStore;
use crate::security::csrf::CsrfGuard;
use crate::security::rate_limit::{PolicySet, RateLimiter};

#[derive(Clone)]
pub struct ApiState {
    pub users: Arc<dyn UsersRepo>,
    pub farmers: Arc<dyn FarmersRepo>,
    pub subscriptions: Arc<dyn SubscriptionsRepo>,
    pub catalog: Arc<ProductCatalogService>,
    pub orders: Arc<OrderService>,
    pub trash: Arc<TrashService>,
    pub csrf: Arc<CsrfGuard>,
    pub limiter: Arc<RateLimiter>,
    pub policies: Arc<PolicySet>,
    pub db: Arc<PgStore>,
    pub cache: Arc<TieredCache>,
    pub started_at: Instant,
}
