//! Product catalog service: cache-aside reads over the products repository,
//! with invalidation on every write.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::cache::{TieredCache, keys};
use crate::domain::entities::ProductRecord;
use crate::domain::soft_delete::Entity;
use crate::infra::db::filter::{Filter, FilterValue};
use crate::infra::db::soft_delete::DeleteRequest;
use crate::infra::db::SoftDeleteStore;

use super::repos::{
    CreateProductParams, ProductQueryFilter, ProductsRepo, RepoError, UpdateProductParams,
};

#[derive(Clone)]
pub struct ProductCatalogService {
    repo: Arc<dyn ProductsRepo>,
    store: SoftDeleteStore,
    cache: Arc<TieredCache>,
}

impl ProductCatalogService {
    pub fn new(
        repo: Arc<dyn ProductsRepo>,
        store: SoftDeleteStore,
        cache: Arc<TieredCache>,
    ) -> Self {
        Self { repo, store, cache }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ProductRecord>, RepoError> {
        let repo = self.repo.clone();
        self.cache
            .get_or_fetch(&keys::product(id), None, || async move {
                repo.find_product(id).await
            })
            .await
    }

    pub async fn list(
        &self,
        filter: &ProductQueryFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProductRecord>, RepoError> {
        // Trash views are administrative and low-volume; bypass the cache so
        // restores show up immediately.
        if filter.trashed_only {
            return self.repo.list_products(filter, limit, offset).await;
        }

        let key = keys::product_list(keys::hash_of(&(filter, limit, offset)));
        let repo = self.repo.clone();
        let filter = filter.clone();
        self.cache
            .get_or_fetch(&key, None, || async move {
                repo.list_products(&filter, limit, offset).await
            })
            .await
    }

    pub async fn count(&self, filter: &ProductQueryFilter) -> Result<u64, RepoError> {
        self.repo.count_products(filter).await
    }

    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<ProductRecord>, RepoError> {
        self.repo.search_products(query, limit).await
    }

    pub async fn create(&self, params: CreateProductParams) -> Result<ProductRecord, RepoError> {
        let record = self.repo.create_product(params).await?;
        self.invalidate_lists().await;
        Ok(record)
    }

    pub async fn update(&self, params: UpdateProductParams) -> Result<ProductRecord, RepoError> {
        let id = params.id;
        let record = self.repo.update_product(params).await?;
        self.cache.delete(&keys::product(id)).await;
        self.invalidate_lists().await;
        Ok(record)
    }

    /// Delete through the soft-delete interceptor; the row survives with a
    /// trash timestamp and drops out of cached reads.
    pub async fn delete(&self, id: Uuid) -> Result<u64, RepoError> {
        let affected = self
            .store
            .delete(DeleteRequest {
                entity: Entity::Products,
                filter: Filter::new().eq("id", FilterValue::Uuid(id)),
            })
            .await?;
        self.cache.delete(&keys::product(id)).await;
        self.invalidate_lists().await;
        Ok(affected)
    }

    async fn invalidate_lists(&self) {
        debug!(target: "verdura::catalog", "Invalidating product cache keys");
        self.cache.invalidate(keys::PRODUCT_PATTERN).await;
    }
}
