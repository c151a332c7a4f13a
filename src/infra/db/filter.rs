//! Typed where-filters for the generic persistence paths.
//!
//! Columns are static strings chosen by code and values are always bound as
//! query parameters, so no user input ever reaches the SQL text.

use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum FilterValue {
    Uuid(Uuid),
    Text(String),
    Int(i64),
    Bool(bool),
}

#[derive(Debug, Clone)]
pub enum Condition {
    Eq {
        column: &'static str,
        value: FilterValue,
    },
    AnyOf {
        column: &'static str,
        ids: Vec<Uuid>,
    },
    OlderThan {
        column: &'static str,
        cutoff: OffsetDateTime,
    },
}

/// The `deleted_at` clause is tracked apart from ordinary conditions because
/// the soft-delete read scoping needs to distinguish "caller said nothing"
/// from "caller explicitly asked for live rows" from "caller wants the trash".
/// The first two render identically; only the third survives scoping as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeletedAtClause {
    #[default]
    Unspecified,
    Null,
    NotNull,
}

#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Vec<Condition>,
    deleted_at: DeletedAtClause,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &'static str, value: FilterValue) -> Self {
        self.conditions.push(Condition::Eq { column, value });
        self
    }

    pub fn any_of(mut self, column: &'static str, ids: Vec<Uuid>) -> Self {
        self.conditions.push(Condition::AnyOf { column, ids });
        self
    }

    pub fn older_than(mut self, column: &'static str, cutoff: OffsetDateTime) -> Self {
        self.conditions.push(Condition::OlderThan { column, cutoff });
        self
    }

    pub fn with_deleted_at(mut self, clause: DeletedAtClause) -> Self {
        self.deleted_at = clause;
        self
    }

    pub fn deleted_at(&self) -> DeletedAtClause {
        self.deleted_at
    }

    /// True when the filter carries no row-selecting conditions. The
    /// `deleted_at` clause alone does not count: "everything in the trash"
    /// is still "everything" as far as destructive operations are concerned.
    pub fn is_unconstrained(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Render ` WHERE ...` with every value bound. Renders nothing when
    /// there is nothing to constrain.
    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        let mut separated = false;
        let mut lead = |qb: &mut QueryBuilder<'_, Postgres>, separated: &mut bool| {
            qb.push(if *separated { " AND " } else { " WHERE " });
            *separated = true;
        };

        for condition in &self.conditions {
            lead(qb, &mut separated);
            match condition {
                Condition::Eq { column, value } => {
                    qb.push(*column);
                    qb.push(" = ");
                    match value {
                        FilterValue::Uuid(v) => qb.push_bind(*v),
                        FilterValue::Text(v) => qb.push_bind(v.clone()),
                        FilterValue::Int(v) => qb.push_bind(*v),
                        FilterValue::Bool(v) => qb.push_bind(*v),
                    };
                }
                Condition::AnyOf { column, ids } => {
                    qb.push(*column);
                    qb.push(" = ANY(");
                    qb.push_bind(ids.clone());
                    qb.push(")");
                }
                Condition::OlderThan { column, cutoff } => {
                    qb.push(*column);
                    qb.push(" < ");
                    qb.push_bind(*cutoff);
                }
            }
        }

        match self.deleted_at {
            DeletedAtClause::Unspecified => {}
            DeletedAtClause::Null => {
                lead(qb, &mut separated);
                qb.push("deleted_at IS NULL");
            }
            DeletedAtClause::NotNull => {
                lead(qb, &mut separated);
                qb.push("deleted_at IS NOT NULL");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_bound_conditions() {
        let id = Uuid::new_v4();
        let filter = Filter::new()
            .eq("farmer_id", FilterValue::Uuid(id))
            .eq("category", FilterValue::Text("vegetables".into()))
            .with_deleted_at(DeletedAtClause::Null);

        let mut qb = QueryBuilder::new("SELECT id FROM products");
        filter.push_where(&mut qb);
        let sql = qb.sql();

        assert!(sql.contains("WHERE farmer_id = $1"));
        assert!(sql.contains("AND category = $2"));
        assert!(sql.ends_with("AND deleted_at IS NULL"));
        // No literal values in the SQL text.
        assert!(!sql.contains("vegetables"));
    }

    #[test]
    fn renders_trash_clause() {
        let filter = Filter::new().with_deleted_at(DeletedAtClause::NotNull);
        let mut qb = QueryBuilder::new("SELECT count(*) FROM products");
        filter.push_where(&mut qb);
        assert!(qb.sql().ends_with(" WHERE deleted_at IS NOT NULL"));
    }

    #[test]
    fn unspecified_clause_renders_nothing() {
        let filter = Filter::new();
        let mut qb = QueryBuilder::new("SELECT id FROM orders");
        filter.push_where(&mut qb);
        assert_eq!(qb.sql(), "SELECT id FROM orders");
        assert!(filter.is_unconstrained());
    }

    #[test]
    fn deleted_at_alone_is_still_unconstrained() {
        let filter = Filter::new().with_deleted_at(DeletedAtClause::NotNull);
        assert!(filter.is_unconstrained());

        let filter = filter.any_of("id", vec![Uuid::new_v4()]);
        assert!(!filter.is_unconstrained());
    }
}
