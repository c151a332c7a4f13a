//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{
    FarmerRecord, OrderRecord, ProductRecord, SubscriptionRecord, UserRecord,
};
use crate::domain::types::{OrderStatus, Role, SubscriptionCadence, SubscriptionStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Hash)]
pub struct ProductQueryFilter {
    pub farmer_id: Option<Uuid>,
    pub category: Option<String>,
    pub in_stock_only: bool,
    /// When set, include trashed rows instead of live ones.
    pub trashed_only: bool,
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub email: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct UpdateUserParams {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct CreateFarmerParams {
    pub user_id: Uuid,
    pub farm_name: String,
    pub region: String,
    pub bio: Option<String>,
    pub certified_organic: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateFarmerParams {
    pub id: Uuid,
    pub farm_name: String,
    pub region: String,
    pub bio: Option<String>,
    pub certified_organic: bool,
}

#[derive(Debug, Clone)]
pub struct CreateProductParams {
    pub farmer_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub unit: String,
    pub stock: i32,
    pub category: String,
}

#[derive(Debug, Clone)]
pub struct UpdateProductParams {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub unit: String,
    pub stock: i32,
    pub category: String,
}

#[derive(Debug, Clone)]
pub struct CreateOrderParams {
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub total_cents: i64,
}

#[derive(Debug, Clone)]
pub struct CreateSubscriptionParams {
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub cadence: SubscriptionCadence,
    pub next_delivery_on: Option<time::Date>,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;
    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError>;
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;
    async fn list_users(&self, role: Option<Role>, limit: i64) -> Result<Vec<UserRecord>, RepoError>;
}

#[async_trait]
pub trait FarmersRepo: Send + Sync {
    async fn create_farmer(&self, params: CreateFarmerParams) -> Result<FarmerRecord, RepoError>;
    async fn update_farmer(&self, params: UpdateFarmerParams) -> Result<FarmerRecord, RepoError>;
    async fn find_farmer(&self, id: Uuid) -> Result<Option<FarmerRecord>, RepoError>;
    async fn find_farmer_by_user(&self, user_id: Uuid) -> Result<Option<FarmerRecord>, RepoError>;
    async fn list_farmers(&self, region: Option<&str>, limit: i64)
    -> Result<Vec<FarmerRecord>, RepoError>;
}

#[async_trait]
pub trait ProductsRepo: Send + Sync {
    async fn create_product(&self, params: CreateProductParams)
    -> Result<ProductRecord, RepoError>;
    async fn update_product(&self, params: UpdateProductParams)
    -> Result<ProductRecord, RepoError>;
    async fn find_product(&self, id: Uuid) -> Result<Option<ProductRecord>, RepoError>;
    async fn list_products(
        &self,
        filter: &ProductQueryFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProductRecord>, RepoError>;
    async fn count_products(&self, filter: &ProductQueryFilter) -> Result<u64, RepoError>;
    async fn search_products(&self, query: &str, limit: i64)
    -> Result<Vec<ProductRecord>, RepoError>;
    async fn adjust_stock(&self, id: Uuid, delta: i32) -> Result<ProductRecord, RepoError>;
}

#[async_trait]
pub trait OrdersRepo: Send + Sync {
    async fn create_order(&self, params: CreateOrderParams) -> Result<OrderRecord, RepoError>;
    async fn find_order(&self, id: Uuid) -> Result<Option<OrderRecord>, RepoError>;
    async fn list_orders(
        &self,
        customer_id: Option<Uuid>,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<OrderRecord>, RepoError>;
    async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        updated_at: OffsetDateTime,
    ) -> Result<OrderRecord, RepoError>;
}

#[async_trait]
pub trait SubscriptionsRepo: Send + Sync {
    async fn create_subscription(
        &self,
        params: CreateSubscriptionParams,
    ) -> Result<SubscriptionRecord, RepoError>;
    async fn find_subscription(&self, id: Uuid) -> Result<Option<SubscriptionRecord>, RepoError>;
    async fn list_subscriptions(
        &self,
        customer_id: Option<Uuid>,
        status: Option<SubscriptionStatus>,
        limit: i64,
    ) -> Result<Vec<SubscriptionRecord>, RepoError>;
    async fn update_subscription_status(
        &self,
        id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<SubscriptionRecord, RepoError>;
}
