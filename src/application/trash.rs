//! Trash administration over the soft-delete store: listing, restore,
//! hard delete, and the retention purge.

use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::domain::soft_delete::Entity;
use crate::infra::db::filter::Filter;
use crate::infra::db::{SoftDeleteStore, TrashEntry};

use super::repos::RepoError;

#[derive(Debug, Error)]
pub enum TrashError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("{0}")]
    Validation(String),
}

#[derive(Clone)]
pub struct TrashService {
    store: SoftDeleteStore,
    retention: Duration,
}

impl TrashService {
    pub fn new(store: SoftDeleteStore, retention: Duration) -> Self {
        Self { store, retention }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Direct access for delete endpoints that route through the interceptor.
    pub fn store(&self) -> &SoftDeleteStore {
        &self.store
    }

    pub async fn list(&self, entity: Entity, limit: i64) -> Result<Vec<TrashEntry>, TrashError> {
        Ok(self.store.list_trash(entity, limit).await?)
    }

    pub async fn restore(&self, entity: Entity, ids: &[Uuid]) -> Result<u64, TrashError> {
        if ids.is_empty() {
            return Err(TrashError::Validation("no ids to restore".to_string()));
        }
        let filter = Filter::new().any_of("id", ids.to_vec());
        Ok(self.store.restore(entity, filter).await?)
    }

    pub async fn hard_delete(
        &self,
        entity: Entity,
        ids: &[Uuid],
        actor: &str,
    ) -> Result<u64, TrashError> {
        if ids.is_empty() {
            return Err(TrashError::Validation(
                "hard delete requires explicit ids".to_string(),
            ));
        }
        let filter = Filter::new().any_of("id", ids.to_vec());
        Ok(self.store.hard_delete(entity, filter, actor).await?)
    }

    /// Purge every declared entity, concurrently. Per-entity failures are
    /// reported but do not stop the other entities.
    pub async fn purge_all(&self) -> Vec<(Entity, Result<u64, RepoError>)> {
        let results = join_all(Entity::soft_deletable().map(|entity| {
            let store = self.store.clone();
            let retention = self.retention;
            async move { (entity, store.purge(entity, retention).await) }
        }))
        .await;

        for (entity, result) in &results {
            if let Ok(purged) = result
                && *purged > 0
            {
                info!(
                    target: "verdura::trash",
                    entity = %entity,
                    purged,
                    "Purged expired trash"
                );
            }
        }

        results
    }
}
