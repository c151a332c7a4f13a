use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    CreateFarmerParams, FarmersRepo, RepoError, UpdateFarmerParams,
};
use crate::domain::entities::FarmerRecord;
use crate::domain::soft_delete::Entity;

use super::PgStore;
use super::filter::{Filter, FilterValue};
use super::soft_delete::{FindQuery, scoped_read};
use super::util::map_sqlx_error;

const FARMER_COLUMNS: &str =
    "id, user_id, farm_name, region, bio, certified_organic, deleted_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct FarmerRow {
    id: Uuid,
    user_id: Uuid,
    farm_name: String,
    region: String,
    bio: Option<String>,
    certified_organic: bool,
    deleted_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<FarmerRow> for FarmerRecord {
    fn from(row: FarmerRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            farm_name: row.farm_name,
            region: row.region,
            bio: row.bio,
            certified_organic: row.certified_organic,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl FarmersRepo for PgStore {
    async fn create_farmer(&self, params: CreateFarmerParams) -> Result<FarmerRecord, RepoError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let mut qb = QueryBuilder::new(
            "INSERT INTO farmers (id, user_id, farm_name, region, bio, certified_organic, \
             deleted_at, created_at, updated_at) VALUES (",
        );
        let mut values = qb.separated(", ");
        values.push_bind(id);
        values.push_bind(params.user_id);
        values.push_bind(params.farm_name);
        values.push_bind(params.region);
        values.push_bind(params.bio);
        values.push_bind(params.certified_organic);
        values.push("NULL");
        values.push_bind(now);
        values.push_bind(now);
        qb.push(") RETURNING ");
        qb.push(FARMER_COLUMNS);

        let row = qb
            .build_query_as::<FarmerRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_farmer(&self, params: UpdateFarmerParams) -> Result<FarmerRecord, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE farmers SET farm_name = ");
        qb.push_bind(params.farm_name);
        qb.push(", region = ");
        qb.push_bind(params.region);
        qb.push(", bio = ");
        qb.push_bind(params.bio);
        qb.push(", certified_organic = ");
        qb.push_bind(params.certified_organic);
        qb.push(", updated_at = now() WHERE id = ");
        qb.push_bind(params.id);
        qb.push(" AND deleted_at IS NULL RETURNING ");
        qb.push(FARMER_COLUMNS);

        let row = qb
            .build_query_as::<FarmerRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;
        Ok(row.into())
    }

    async fn find_farmer(&self, id: Uuid) -> Result<Option<FarmerRecord>, RepoError> {
        let query = scoped_read(FindQuery {
            entity: Entity::Farmers,
            filter: Filter::new().eq("id", FilterValue::Uuid(id)),
        });

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(FARMER_COLUMNS);
        qb.push(" FROM farmers");
        query.filter.push_where(&mut qb);

        let row = qb
            .build_query_as::<FarmerRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn find_farmer_by_user(&self, user_id: Uuid) -> Result<Option<FarmerRecord>, RepoError> {
        let query = scoped_read(FindQuery {
            entity: Entity::Farmers,
            filter: Filter::new().eq("user_id", FilterValue::Uuid(user_id)),
        });

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(FARMER_COLUMNS);
        qb.push(" FROM farmers");
        query.filter.push_where(&mut qb);

        let row = qb
            .build_query_as::<FarmerRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn list_farmers(
        &self,
        region: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FarmerRecord>, RepoError> {
        let mut filter = Filter::new();
        if let Some(region) = region {
            filter = filter.eq("region", FilterValue::Text(region.to_string()));
        }
        let query = scoped_read(FindQuery {
            entity: Entity::Farmers,
            filter,
        });

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(FARMER_COLUMNS);
        qb.push(" FROM farmers");
        query.filter.push_where(&mut qb);
        qb.push(" ORDER BY farm_name ASC, id ASC LIMIT ");
        qb.push_bind(limit.clamp(1, 200));

        let rows = qb
            .build_query_as::<FarmerRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
