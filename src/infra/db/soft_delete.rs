//! Soft-delete interception for the declared entity set.
//!
//! Two responsibilities: deletes against a declared entity are rewritten into
//! timestamped updates, and reads against a declared entity are scoped to
//! live rows unless the caller already said otherwise. Both are expressed as
//! decorator functions that take a request description and return a new one,
//! so each rewrite is testable without a database.

use std::sync::Arc;
use std::time::Duration;

use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::domain::soft_delete::Entity;

use super::filter::{DeletedAtClause, Filter};
use super::util::map_sqlx_error;

#[derive(Debug, Clone)]
pub struct FindQuery {
    pub entity: Entity,
    pub filter: Filter,
}

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub entity: Entity,
    pub filter: Filter,
}

/// A delete that was rewritten into an update of `deleted_at`.
#[derive(Debug, Clone)]
pub struct MarkRequest {
    pub entity: Entity,
    pub filter: Filter,
    pub deleted_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub enum DeletePlan {
    Mark(MarkRequest),
    Hard(DeleteRequest),
}

/// Scope a read to live rows for declared entities. An absent clause gets
/// the default live filter; an explicit clause — either form — is preserved.
pub fn scoped_read(query: FindQuery) -> FindQuery {
    let FindQuery { entity, filter } = query;
    let filter = if entity.supports_soft_delete() {
        match filter.deleted_at() {
            DeletedAtClause::Unspecified => filter.with_deleted_at(DeletedAtClause::Null),
            DeletedAtClause::Null | DeletedAtClause::NotNull => filter,
        }
    } else {
        filter
    };
    FindQuery { entity, filter }
}

/// Rewrite a delete into a mark for declared entities; undeclared entities
/// keep their physical delete. The mark only touches live rows so repeated
/// deletes do not refresh trash timestamps.
pub fn rewrite_delete(request: DeleteRequest, now: OffsetDateTime) -> DeletePlan {
    if !request.entity.supports_soft_delete() {
        return DeletePlan::Hard(request);
    }
    let filter = match request.filter.deleted_at() {
        DeletedAtClause::Unspecified => request.filter.with_deleted_at(DeletedAtClause::Null),
        _ => request.filter,
    };
    DeletePlan::Mark(MarkRequest {
        entity: request.entity,
        filter,
        deleted_at: Some(now),
    })
}

/// A restore is the inverse mark: `deleted_at` back to NULL, applied to
/// trashed rows only.
pub fn restore_request(entity: Entity, filter: Filter) -> MarkRequest {
    MarkRequest {
        entity,
        filter: filter.with_deleted_at(DeletedAtClause::NotNull),
        deleted_at: None,
    }
}

/// Row shape for trash listings, independent of the underlying entity.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct TrashEntry {
    pub id: Uuid,
    pub label: String,
    pub deleted_at: OffsetDateTime,
}

/// Executes the request descriptions produced by the decorators above.
#[derive(Clone)]
pub struct SoftDeleteStore {
    pool: Arc<PgPool>,
}

impl SoftDeleteStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Delete through the interceptor: declared entities are marked, the
    /// rest are physically removed. Returns affected row count.
    pub async fn delete(&self, request: DeleteRequest) -> Result<u64, RepoError> {
        match rewrite_delete(request, OffsetDateTime::now_utc()) {
            DeletePlan::Mark(mark) => self.execute_mark(mark).await,
            DeletePlan::Hard(hard) => self.execute_hard(hard).await,
        }
    }

    pub async fn restore(&self, entity: Entity, filter: Filter) -> Result<u64, RepoError> {
        if !entity.supports_soft_delete() {
            return Err(RepoError::invalid_input(format!(
                "entity `{entity}` does not soft-delete"
            )));
        }
        let restored = self.execute_mark(restore_request(entity, filter)).await?;
        info!(
            target: "verdura::trash",
            entity = %entity,
            restored,
            "Restored records from trash"
        );
        Ok(restored)
    }

    /// Physically remove rows. Criteria are always bound parameters and an
    /// unconstrained filter is rejected before any query is issued. This is
    /// irreversible, so it carries actor context at warning level.
    pub async fn hard_delete(
        &self,
        entity: Entity,
        filter: Filter,
        actor: &str,
    ) -> Result<u64, RepoError> {
        if filter.is_unconstrained() {
            return Err(RepoError::invalid_input(
                "hard delete requires a non-empty filter",
            ));
        }

        let removed = self
            .execute_hard(DeleteRequest { entity, filter })
            .await?;
        warn!(
            target: "verdura::trash",
            entity = %entity,
            removed,
            actor,
            "Hard delete executed"
        );
        Ok(removed)
    }

    /// Maintenance path: physically remove records trashed longer than the
    /// retention window. Not part of the request path.
    pub async fn purge(&self, entity: Entity, retention: Duration) -> Result<u64, RepoError> {
        if !entity.supports_soft_delete() {
            return Ok(0);
        }
        let cutoff = OffsetDateTime::now_utc() - retention;
        let filter = Filter::new()
            .older_than("deleted_at", cutoff)
            .with_deleted_at(DeletedAtClause::NotNull);
        self.execute_hard(DeleteRequest { entity, filter }).await
    }

    pub async fn list_trash(
        &self,
        entity: Entity,
        limit: i64,
    ) -> Result<Vec<TrashEntry>, RepoError> {
        if !entity.supports_soft_delete() {
            return Err(RepoError::invalid_input(format!(
                "entity `{entity}` does not soft-delete"
            )));
        }

        let mut qb = QueryBuilder::new("SELECT id, ");
        qb.push(entity.label_column());
        qb.push(" AS label, deleted_at FROM ");
        qb.push(entity.table());
        Filter::new()
            .with_deleted_at(DeletedAtClause::NotNull)
            .push_where(&mut qb);
        qb.push(" ORDER BY deleted_at DESC LIMIT ");
        qb.push_bind(limit.clamp(1, 500));

        qb.build_query_as::<TrashEntry>()
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(map_sqlx_error)
    }

    /// Count through the read scoping, so declared entities count live rows
    /// unless the filter says otherwise.
    pub async fn count(&self, query: FindQuery) -> Result<u64, RepoError> {
        let query = scoped_read(query);
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM ");
        qb.push(query.entity.table());
        query.filter.push_where(&mut qb);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool.as_ref())
            .await
            .map_err(map_sqlx_error)?;
        u64::try_from(count)
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }

    async fn execute_mark(&self, mark: MarkRequest) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE ");
        qb.push(mark.entity.table());
        qb.push(" SET deleted_at = ");
        qb.push_bind(mark.deleted_at);
        qb.push(", updated_at = now()");
        mark.filter.push_where(&mut qb);

        let result = qb
            .build()
            .execute(self.pool.as_ref())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn execute_hard(&self, request: DeleteRequest) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("DELETE FROM ");
        qb.push(request.entity.table());
        request.filter.push_where(&mut qb);

        let result = qb
            .build()
            .execute(self.pool.as_ref())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use sqlx::postgres::PgPoolOptions;

    use crate::infra::db::filter::FilterValue;

    use super::*;

    fn offline_store() -> SoftDeleteStore {
        // A lazy pool never connects; the refusal under test happens first.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://verdura@localhost/verdura")
            .expect("lazy pool");
        SoftDeleteStore::new(Arc::new(pool))
    }

    #[test]
    fn absent_clause_gets_the_live_filter() {
        let query = scoped_read(FindQuery {
            entity: Entity::Products,
            filter: Filter::new(),
        });
        assert_eq!(query.filter.deleted_at(), DeletedAtClause::Null);
    }

    #[test]
    fn explicit_null_clause_is_kept() {
        let query = scoped_read(FindQuery {
            entity: Entity::Products,
            filter: Filter::new().with_deleted_at(DeletedAtClause::Null),
        });
        assert_eq!(query.filter.deleted_at(), DeletedAtClause::Null);
    }

    #[test]
    fn explicit_trash_clause_is_never_overwritten() {
        let query = scoped_read(FindQuery {
            entity: Entity::Products,
            filter: Filter::new().with_deleted_at(DeletedAtClause::NotNull),
        });
        assert_eq!(query.filter.deleted_at(), DeletedAtClause::NotNull);
    }

    #[test]
    fn undeclared_entities_read_unscoped() {
        let query = scoped_read(FindQuery {
            entity: Entity::Orders,
            filter: Filter::new(),
        });
        assert_eq!(query.filter.deleted_at(), DeletedAtClause::Unspecified);
    }

    #[test]
    fn declared_deletes_become_marks_on_live_rows() {
        let now = OffsetDateTime::now_utc();
        let plan = rewrite_delete(
            DeleteRequest {
                entity: Entity::Products,
                filter: Filter::new().eq("id", FilterValue::Uuid(Uuid::new_v4())),
            },
            now,
        );

        match plan {
            DeletePlan::Mark(mark) => {
                assert_eq!(mark.deleted_at, Some(now));
                assert_eq!(mark.filter.deleted_at(), DeletedAtClause::Null);
            }
            DeletePlan::Hard(_) => panic!("declared entity must not hard delete"),
        }
    }

    #[test]
    fn undeclared_deletes_stay_physical() {
        let plan = rewrite_delete(
            DeleteRequest {
                entity: Entity::Orders,
                filter: Filter::new().eq("id", FilterValue::Uuid(Uuid::new_v4())),
            },
            OffsetDateTime::now_utc(),
        );
        assert!(matches!(plan, DeletePlan::Hard(_)));
    }

    #[test]
    fn restore_targets_trashed_rows() {
        let mark = restore_request(Entity::Users, Filter::new());
        assert_eq!(mark.deleted_at, None);
        assert_eq!(mark.filter.deleted_at(), DeletedAtClause::NotNull);
    }

    #[tokio::test]
    async fn hard_delete_refuses_an_empty_filter_before_any_query() {
        let store = offline_store();
        let err = store
            .hard_delete(Entity::Products, Filter::new(), "admin:test")
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidInput { .. }));

        // Even an explicit trash clause is not enough to scope destruction.
        let err = store
            .hard_delete(
                Entity::Products,
                Filter::new().with_deleted_at(DeletedAtClause::NotNull),
                "admin:test",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidInput { .. }));
    }
}
