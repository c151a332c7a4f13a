//! Order placement and fulfilment transitions.

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::entities::OrderRecord;
use crate::domain::types::OrderStatus;

use super::repos::{CreateOrderParams, OrdersRepo, ProductsRepo, RepoError};

#[derive(Debug, Error)]
pub enum OrderError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("order not found")]
    NotFound,
    #[error("product not found")]
    ProductNotFound,
    #[error("{0}")]
    Validation(String),
    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },
}

#[derive(Debug, Clone)]
pub struct PlaceOrderCommand {
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrdersRepo>,
    products: Arc<dyn ProductsRepo>,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrdersRepo>, products: Arc<dyn ProductsRepo>) -> Self {
        Self { orders, products }
    }

    pub async fn place(&self, cmd: PlaceOrderCommand) -> Result<OrderRecord, OrderError> {
        if cmd.quantity < 1 {
            return Err(OrderError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        let product = self
            .products
            .find_product(cmd.product_id)
            .await?
            .ok_or(OrderError::ProductNotFound)?;
        if product.stock < cmd.quantity {
            return Err(OrderError::Validation(format!(
                "only {} of `{}` in stock",
                product.stock, product.name
            )));
        }

        // Reserve stock first; the conditional update refuses to go negative
        // under concurrent orders.
        self.products
            .adjust_stock(cmd.product_id, -cmd.quantity)
            .await
            .map_err(|err| match err {
                RepoError::InvalidInput { .. } => {
                    OrderError::Validation("product sold out".to_string())
                }
                other => OrderError::Repo(other),
            })?;

        let total_cents = product.price_cents * i64::from(cmd.quantity);
        let order = self
            .orders
            .create_order(CreateOrderParams {
                customer_id: cmd.customer_id,
                product_id: cmd.product_id,
                quantity: cmd.quantity,
                total_cents,
            })
            .await?;

        info!(
            target: "verdura::orders",
            order_id = %order.id,
            product_id = %cmd.product_id,
            quantity = cmd.quantity,
            total_cents,
            "Order placed"
        );
        Ok(order)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<OrderRecord>, OrderError> {
        Ok(self.orders.find_order(id).await?)
    }

    pub async fn list(
        &self,
        customer_id: Option<Uuid>,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<OrderRecord>, OrderError> {
        Ok(self.orders.list_orders(customer_id, status, limit).await?)
    }

    pub async fn transition(
        &self,
        id: Uuid,
        next: OrderStatus,
    ) -> Result<OrderRecord, OrderError> {
        let order = self.orders.find_order(id).await?.ok_or(OrderError::NotFound)?;
        if !order.status.can_transition_to(next) {
            return Err(OrderError::IllegalTransition {
                from: order.status,
                to: next,
            });
        }

        let updated = self
            .orders
            .update_order_status(id, next, OffsetDateTime::now_utc())
            .await?;

        // Cancellation returns the reserved stock; a failure here is logged
        // and left to reconciliation rather than failing the cancellation.
        if next == OrderStatus::Cancelled
            && let Err(err) = self
                .products
                .adjust_stock(order.product_id, order.quantity)
                .await
        {
            warn!(
                target: "verdura::orders",
                order_id = %id,
                product_id = %order.product_id,
                error = %err,
                "Failed to restock after cancellation"
            );
        }

        Ok(updated)
    }
}
