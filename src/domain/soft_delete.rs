//! The declared soft-delete set and trash introspection helpers.
//!
//! Soft deletion is declared per entity as a closed set of variants rather
//! than free-form type names, so a table outside the set cannot be routed
//! through the trash by a typo.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use time::{Duration, OffsetDateTime};

/// Every table the storefront persists, whether or not it soft-deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Users,
    Farmers,
    Products,
    Orders,
    Subscriptions,
}

impl Entity {
    pub fn table(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Farmers => "farmers",
            Self::Products => "products",
            Self::Orders => "orders",
            Self::Subscriptions => "subscriptions",
        }
    }

    /// Column shown as the human label in trash listings.
    pub fn label_column(self) -> &'static str {
        match self {
            Self::Users => "email",
            Self::Farmers => "farm_name",
            Self::Products => "name",
            Self::Orders => "id::text",
            Self::Subscriptions => "id::text",
        }
    }

    /// Whether deletes against this entity are rewritten into timestamped
    /// updates. Orders are financial records and stay out of the trash.
    pub fn supports_soft_delete(self) -> bool {
        !matches!(self, Self::Orders)
    }

    pub fn all() -> &'static [Entity] {
        &[
            Self::Users,
            Self::Farmers,
            Self::Products,
            Self::Orders,
            Self::Subscriptions,
        ]
    }

    /// The declared soft-delete set.
    pub fn soft_deletable() -> impl Iterator<Item = Entity> {
        Self::all()
            .iter()
            .copied()
            .filter(|entity| entity.supports_soft_delete())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Farmers => "farmers",
            Self::Products => "products",
            Self::Orders => "orders",
            Self::Subscriptions => "subscriptions",
        }
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Entity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" => Ok(Self::Users),
            "farmers" => Ok(Self::Farmers),
            "products" => Ok(Self::Products),
            "orders" => Ok(Self::Orders),
            "subscriptions" => Ok(Self::Subscriptions),
            _ => Err(()),
        }
    }
}

/// `deleted_at` is the single source of truth for trash membership.
pub fn is_soft_deleted(deleted_at: Option<OffsetDateTime>) -> bool {
    deleted_at.is_some()
}

/// How long a record has been in the trash, or `None` for live records.
/// Clock skew can place `deleted_at` slightly in the future; that reads as a
/// zero duration rather than a negative one.
pub fn deleted_for(
    deleted_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> Option<Duration> {
    deleted_at.map(|at| (now - at).max(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_are_excluded_from_the_declared_set() {
        assert!(!Entity::Orders.supports_soft_delete());
        let declared: Vec<Entity> = Entity::soft_deletable().collect();
        assert_eq!(
            declared,
            vec![
                Entity::Users,
                Entity::Farmers,
                Entity::Products,
                Entity::Subscriptions
            ]
        );
    }

    #[test]
    fn introspection_follows_deleted_at() {
        let now = OffsetDateTime::now_utc();
        assert!(!is_soft_deleted(None));
        assert!(is_soft_deleted(Some(now)));

        assert_eq!(deleted_for(None, now), None);
        let age = deleted_for(Some(now - Duration::hours(2)), now).expect("deleted record");
        assert_eq!(age.whole_hours(), 2);

        // deleted_at in the future clamps to zero
        let skewed = deleted_for(Some(now + Duration::minutes(5)), now).expect("deleted record");
        assert_eq!(skewed, Duration::ZERO);
    }

    #[test]
    fn entity_round_trips_through_str() {
        for entity in Entity::all() {
            assert_eq!(Entity::from_str(entity.as_str()), Ok(*entity));
        }
        assert!(Entity::from_str("invoices").is_err());
    }
}
