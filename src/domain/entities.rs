//! Persistent business records.
//!
//! Records carrying a `deleted_at` column participate in soft deletion; see
//! [`crate::domain::soft_delete`] for the declared set.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{
    OrderStatus, Role, SubscriptionCadence, SubscriptionStatus,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub deleted_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmerRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub farm_name: String,
    pub region: String,
    pub bio: Option<String>,
    pub certified_organic: bool,
    pub deleted_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub unit: String,
    pub stock: i32,
    pub category: String,
    pub deleted_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ProductRecord {
    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// Orders are financial records; they never enter the trash and are not part
/// of the declared soft-delete set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub cadence: SubscriptionCadence,
    pub status: SubscriptionStatus,
    pub next_delivery_on: Option<time::Date>,
    pub deleted_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
