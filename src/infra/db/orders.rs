//! Orders persistence. Orders are outside the declared soft-delete set, so
//! reads here are deliberately unscoped.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CreateOrderParams, OrdersRepo, RepoError};
use crate::domain::entities::OrderRecord;
use crate::domain::types::OrderStatus;

use super::PgStore;
use super::util::map_sqlx_error;

const ORDER_COLUMNS: &str =
    "id, customer_id, product_id, quantity, total_cents, status, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    customer_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    total_cents: i64,
    status: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

fn record_from_row(row: OrderRow) -> Result<OrderRecord, RepoError> {
    let status = OrderStatus::from_str(&row.status)
        .map_err(|_| RepoError::from_persistence(format!("unknown order status `{}`", row.status)))?;
    Ok(OrderRecord {
        id: row.id,
        customer_id: row.customer_id,
        product_id: row.product_id,
        quantity: row.quantity,
        total_cents: row.total_cents,
        status,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[async_trait]
impl OrdersRepo for PgStore {
    async fn create_order(&self, params: CreateOrderParams) -> Result<OrderRecord, RepoError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let mut qb = QueryBuilder::new(
            "INSERT INTO orders (id, customer_id, product_id, quantity, total_cents, status, \
             created_at, updated_at) VALUES (",
        );
        let mut values = qb.separated(", ");
        values.push_bind(id);
        values.push_bind(params.customer_id);
        values.push_bind(params.product_id);
        values.push_bind(params.quantity);
        values.push_bind(params.total_cents);
        values.push_bind(OrderStatus::Pending.as_str());
        values.push_bind(now);
        values.push_bind(now);
        qb.push(") RETURNING ");
        qb.push(ORDER_COLUMNS);

        let row = qb
            .build_query_as::<OrderRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        record_from_row(row)
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<OrderRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(ORDER_COLUMNS);
        qb.push(" FROM orders WHERE id = ");
        qb.push_bind(id);

        let row = qb
            .build_query_as::<OrderRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.map(record_from_row).transpose()
    }

    async fn list_orders(
        &self,
        customer_id: Option<Uuid>,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<OrderRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(ORDER_COLUMNS);
        qb.push(" FROM orders WHERE 1=1");
        if let Some(customer_id) = customer_id {
            qb.push(" AND customer_id = ");
            qb.push_bind(customer_id);
        }
        if let Some(status) = status {
            qb.push(" AND status = ");
            qb.push_bind(status.as_str());
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(limit.clamp(1, 200));

        let rows = qb
            .build_query_as::<OrderRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(record_from_row).collect()
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        updated_at: OffsetDateTime,
    ) -> Result<OrderRecord, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE orders SET status = ");
        qb.push_bind(status.as_str());
        qb.push(", updated_at = ");
        qb.push_bind(updated_at);
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" RETURNING ");
        qb.push(ORDER_COLUMNS);

        let row = qb
            .build_query_as::<OrderRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;
        record_from_row(row)
    }
}
