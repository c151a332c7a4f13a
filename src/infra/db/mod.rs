//! Postgres-backed repository implementations.
//!
//! All queries are built at runtime with bound parameters; reads against
//! soft-deleting entities are routed through [`soft_delete::scoped_read`].

mod farmers;
pub mod filter;
mod orders;
mod products;
pub mod soft_delete;
mod subscriptions;
mod users;
mod util;

pub use soft_delete::{SoftDeleteStore, TrashEntry};
pub use util::map_sqlx_error;

use std::sync::Arc;
use std::time::Duration;

use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};

#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_handle(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    /// Pool that defers connecting until first use. Used by tooling and
    /// tests that exercise paths which never reach the database.
    pub fn connect_lazy(url: &str, acquire_timeout: Duration) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .acquire_timeout(acquire_timeout)
            .connect_lazy(url)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}
