use std::str::FromStr;

use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CreateSubscriptionParams, RepoError, SubscriptionsRepo};
use crate::domain::entities::SubscriptionRecord;
use crate::domain::soft_delete::Entity;
use crate::domain::types::{SubscriptionCadence, SubscriptionStatus};

use super::PgStore;
use super::filter::{Filter, FilterValue};
use super::soft_delete::{FindQuery, scoped_read};
use super::util::map_sqlx_error;

const SUBSCRIPTION_COLUMNS: &str = "id, customer_id, product_id, cadence, status, \
     next_delivery_on, deleted_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    customer_id: Uuid,
    product_id: Uuid,
    cadence: String,
    status: String,
    next_delivery_on: Option<time::Date>,
    deleted_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

fn record_from_row(row: SubscriptionRow) -> Result<SubscriptionRecord, RepoError> {
    let cadence = SubscriptionCadence::from_str(&row.cadence).map_err(|_| {
        RepoError::from_persistence(format!("unknown cadence `{}`", row.cadence))
    })?;
    let status = SubscriptionStatus::from_str(&row.status).map_err(|_| {
        RepoError::from_persistence(format!("unknown subscription status `{}`", row.status))
    })?;
    Ok(SubscriptionRecord {
        id: row.id,
        customer_id: row.customer_id,
        product_id: row.product_id,
        cadence,
        status,
        next_delivery_on: row.next_delivery_on,
        deleted_at: row.deleted_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[async_trait]
impl SubscriptionsRepo for PgStore {
    async fn create_subscription(
        &self,
        params: CreateSubscriptionParams,
    ) -> Result<SubscriptionRecord, RepoError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let mut qb = QueryBuilder::new(
            "INSERT INTO subscriptions (id, customer_id, product_id, cadence, status, \
             next_delivery_on, deleted_at, created_at, updated_at) VALUES (",
        );
        let mut values = qb.separated(", ");
        values.push_bind(id);
        values.push_bind(params.customer_id);
        values.push_bind(params.product_id);
        values.push_bind(params.cadence.as_str());
        values.push_bind(SubscriptionStatus::Active.as_str());
        values.push_bind(params.next_delivery_on);
        values.push("NULL");
        values.push_bind(now);
        values.push_bind(now);
        qb.push(") RETURNING ");
        qb.push(SUBSCRIPTION_COLUMNS);

        let row = qb
            .build_query_as::<SubscriptionRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        record_from_row(row)
    }

    async fn find_subscription(
        &self,
        id: Uuid,
    ) -> Result<Option<SubscriptionRecord>, RepoError> {
        let query = scoped_read(FindQuery {
            entity: Entity::Subscriptions,
            filter: Filter::new().eq("id", FilterValue::Uuid(id)),
        });

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(SUBSCRIPTION_COLUMNS);
        qb.push(" FROM subscriptions");
        query.filter.push_where(&mut qb);

        let row = qb
            .build_query_as::<SubscriptionRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.map(record_from_row).transpose()
    }

    async fn list_subscriptions(
        &self,
        customer_id: Option<Uuid>,
        status: Option<SubscriptionStatus>,
        limit: i64,
    ) -> Result<Vec<SubscriptionRecord>, RepoError> {
        let mut filter = Filter::new();
        if let Some(customer_id) = customer_id {
            filter = filter.eq("customer_id", FilterValue::Uuid(customer_id));
        }
        if let Some(status) = status {
            filter = filter.eq("status", FilterValue::Text(status.as_str().to_string()));
        }
        let query = scoped_read(FindQuery {
            entity: Entity::Subscriptions,
            filter,
        });

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(SUBSCRIPTION_COLUMNS);
        qb.push(" FROM subscriptions");
        query.filter.push_where(&mut qb);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(limit.clamp(1, 200));

        let rows = qb
            .build_query_as::<SubscriptionRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(record_from_row).collect()
    }

    async fn update_subscription_status(
        &self,
        id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<SubscriptionRecord, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE subscriptions SET status = ");
        qb.push_bind(status.as_str());
        qb.push(", updated_at = now() WHERE id = ");
        qb.push_bind(id);
        qb.push(" AND deleted_at IS NULL RETURNING ");
        qb.push(SUBSCRIPTION_COLUMNS);

        let row = qb
            .build_query_as::<SubscriptionRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;
        record_from_row(row)
    }
}
