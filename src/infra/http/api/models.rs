//! Request payloads and query parameters for the JSON API.

use serde::Deserialize;
use uuid::Uuid;

use crate::domain::types::{OrderStatus, Role, SubscriptionCadence, SubscriptionStatus};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFarmerRequest {
    pub user_id: Uuid,
    pub farm_name: String,
    pub region: String,
    pub bio: Option<String>,
    #[serde(default)]
    pub certified_organic: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFarmerRequest {
    pub farm_name: String,
    pub region: String,
    pub bio: Option<String>,
    #[serde(default)]
    pub certified_organic: bool,
}

#[derive(Debug, Deserialize)]
pub struct FarmerListQuery {
    pub region: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub farmer_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub unit: String,
    pub stock: i32,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub unit: String,
    pub stock: i32,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub farmer_id: Option<Uuid>,
    pub category: Option<String>,
    #[serde(default)]
    pub in_stock: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ProductSearchQuery {
    pub q: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub customer_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub product_id: Uuid,
    pub cadence: SubscriptionCadence,
    pub next_delivery_on: Option<time::Date>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionListQuery {
    pub customer_id: Option<Uuid>,
    pub status: Option<SubscriptionStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TrashListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TrashActionRequest {
    pub ids: Vec<Uuid>,
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}
