use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    CreateProductParams, ProductQueryFilter, ProductsRepo, RepoError, UpdateProductParams,
};
use crate::domain::entities::ProductRecord;
use crate::domain::soft_delete::Entity;

use super::PgStore;
use super::filter::{DeletedAtClause, Filter, FilterValue};
use super::soft_delete::{FindQuery, scoped_read};
use super::util::map_sqlx_error;

const PRODUCT_COLUMNS: &str = "id, farmer_id, name, slug, description, price_cents, unit, \
     stock, category, deleted_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    farmer_id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    price_cents: i64,
    unit: String,
    stock: i32,
    category: String,
    deleted_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ProductRow> for ProductRecord {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            farmer_id: row.farmer_id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            price_cents: row.price_cents,
            unit: row.unit,
            stock: row.stock,
            category: row.category,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn query_filter_to_filter(filter: &ProductQueryFilter) -> Filter {
    let mut out = Filter::new();
    if let Some(farmer_id) = filter.farmer_id {
        out = out.eq("farmer_id", FilterValue::Uuid(farmer_id));
    }
    if let Some(category) = filter.category.as_ref() {
        out = out.eq("category", FilterValue::Text(category.clone()));
    }
    if filter.trashed_only {
        out = out.with_deleted_at(DeletedAtClause::NotNull);
    }
    out
}

#[async_trait]
impl ProductsRepo for PgStore {
    async fn create_product(
        &self,
        params: CreateProductParams,
    ) -> Result<ProductRecord, RepoError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let mut qb = QueryBuilder::new(
            "INSERT INTO products (id, farmer_id, name, slug, description, price_cents, \
             unit, stock, category, deleted_at, created_at, updated_at) VALUES (",
        );
        let mut values = qb.separated(", ");
        values.push_bind(id);
        values.push_bind(params.farmer_id);
        values.push_bind(params.name);
        values.push_bind(params.slug);
        values.push_bind(params.description);
        values.push_bind(params.price_cents);
        values.push_bind(params.unit);
        values.push_bind(params.stock);
        values.push_bind(params.category);
        values.push("NULL");
        values.push_bind(now);
        values.push_bind(now);
        qb.push(") RETURNING ");
        qb.push(PRODUCT_COLUMNS);

        let row = qb
            .build_query_as::<ProductRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_product(
        &self,
        params: UpdateProductParams,
    ) -> Result<ProductRecord, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE products SET name = ");
        qb.push_bind(params.name);
        qb.push(", description = ");
        qb.push_bind(params.description);
        qb.push(", price_cents = ");
        qb.push_bind(params.price_cents);
        qb.push(", unit = ");
        qb.push_bind(params.unit);
        qb.push(", stock = ");
        qb.push_bind(params.stock);
        qb.push(", category = ");
        qb.push_bind(params.category);
        qb.push(", updated_at = now() WHERE id = ");
        qb.push_bind(params.id);
        qb.push(" AND deleted_at IS NULL RETURNING ");
        qb.push(PRODUCT_COLUMNS);

        let row = qb
            .build_query_as::<ProductRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;
        Ok(row.into())
    }

    async fn find_product(&self, id: Uuid) -> Result<Option<ProductRecord>, RepoError> {
        let query = scoped_read(FindQuery {
            entity: Entity::Products,
            filter: Filter::new().eq("id", FilterValue::Uuid(id)),
        });

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(PRODUCT_COLUMNS);
        qb.push(" FROM products");
        query.filter.push_where(&mut qb);

        let row = qb
            .build_query_as::<ProductRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn list_products(
        &self,
        filter: &ProductQueryFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProductRecord>, RepoError> {
        let query = scoped_read(FindQuery {
            entity: Entity::Products,
            filter: query_filter_to_filter(filter),
        });

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(PRODUCT_COLUMNS);
        qb.push(" FROM products");
        query.filter.push_where(&mut qb);
        if filter.in_stock_only {
            qb.push(" AND stock > 0");
        }
        qb.push(" ORDER BY name ASC, id ASC LIMIT ");
        qb.push_bind(limit.clamp(1, 200));
        qb.push(" OFFSET ");
        qb.push_bind(offset.max(0));

        let rows = qb
            .build_query_as::<ProductRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_products(&self, filter: &ProductQueryFilter) -> Result<u64, RepoError> {
        let query = scoped_read(FindQuery {
            entity: Entity::Products,
            filter: query_filter_to_filter(filter),
        });

        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM products");
        query.filter.push_where(&mut qb);
        if filter.in_stock_only {
            qb.push(" AND stock > 0");
        }

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        u64::try_from(count)
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }

    async fn search_products(
        &self,
        query_text: &str,
        limit: i64,
    ) -> Result<Vec<ProductRecord>, RepoError> {
        let pattern = format!("%{query_text}%");

        let query = scoped_read(FindQuery {
            entity: Entity::Products,
            filter: Filter::new(),
        });

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(PRODUCT_COLUMNS);
        qb.push(" FROM products");
        query.filter.push_where(&mut qb);
        qb.push(" AND (name ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR category ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR COALESCE(description, '') ILIKE ");
        qb.push_bind(pattern);
        qb.push(") ORDER BY name ASC LIMIT ");
        qb.push_bind(limit.clamp(1, 100));

        let rows = qb
            .build_query_as::<ProductRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn adjust_stock(&self, id: Uuid, delta: i32) -> Result<ProductRecord, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE products SET stock = stock + ");
        qb.push_bind(delta);
        qb.push(", updated_at = now() WHERE id = ");
        qb.push_bind(id);
        qb.push(" AND deleted_at IS NULL AND stock + ");
        qb.push_bind(delta);
        qb.push(" >= 0 RETURNING ");
        qb.push(PRODUCT_COLUMNS);

        let row = qb
            .build_query_as::<ProductRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| RepoError::invalid_input("product missing or insufficient stock"))?;
        Ok(row.into())
    }
}
