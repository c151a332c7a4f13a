use std::str::FromStr;

use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CreateUserParams, RepoError, UpdateUserParams, UsersRepo};
use crate::domain::entities::UserRecord;
use crate::domain::soft_delete::Entity;
use crate::domain::types::Role;

use super::PgStore;
use super::filter::{Filter, FilterValue};
use super::soft_delete::{FindQuery, scoped_read};
use super::util::map_sqlx_error;

const USER_COLUMNS: &str = "id, email, name, role, deleted_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    role: String,
    deleted_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

fn record_from_row(row: UserRow) -> Result<UserRecord, RepoError> {
    let role = Role::from_str(&row.role)
        .map_err(|_| RepoError::from_persistence(format!("unknown role `{}`", row.role)))?;
    Ok(UserRecord {
        id: row.id,
        email: row.email,
        name: row.name,
        role,
        deleted_at: row.deleted_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[async_trait]
impl UsersRepo for PgStore {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let mut qb = QueryBuilder::new(
            "INSERT INTO users (id, email, name, role, deleted_at, created_at, updated_at) VALUES (",
        );
        let mut values = qb.separated(", ");
        values.push_bind(id);
        values.push_bind(params.email);
        values.push_bind(params.name);
        values.push_bind(params.role.as_str());
        values.push("NULL");
        values.push_bind(now);
        values.push_bind(now);
        qb.push(") RETURNING ");
        qb.push(USER_COLUMNS);

        let row = qb
            .build_query_as::<UserRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        record_from_row(row)
    }

    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE users SET email = ");
        qb.push_bind(params.email);
        qb.push(", name = ");
        qb.push_bind(params.name);
        qb.push(", role = ");
        qb.push_bind(params.role.as_str());
        qb.push(", updated_at = now() WHERE id = ");
        qb.push_bind(params.id);
        qb.push(" AND deleted_at IS NULL RETURNING ");
        qb.push(USER_COLUMNS);

        let row = qb
            .build_query_as::<UserRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;
        record_from_row(row)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        let query = scoped_read(FindQuery {
            entity: Entity::Users,
            filter: Filter::new().eq("id", FilterValue::Uuid(id)),
        });

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(USER_COLUMNS);
        qb.push(" FROM users");
        query.filter.push_where(&mut qb);

        let row = qb
            .build_query_as::<UserRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.map(record_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let query = scoped_read(FindQuery {
            entity: Entity::Users,
            filter: Filter::new().eq("email", FilterValue::Text(email.to_string())),
        });

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(USER_COLUMNS);
        qb.push(" FROM users");
        query.filter.push_where(&mut qb);

        let row = qb
            .build_query_as::<UserRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.map(record_from_row).transpose()
    }

    async fn list_users(
        &self,
        role: Option<Role>,
        limit: i64,
    ) -> Result<Vec<UserRecord>, RepoError> {
        let mut filter = Filter::new();
        if let Some(role) = role {
            filter = filter.eq("role", FilterValue::Text(role.as_str().to_string()));
        }
        let query = scoped_read(FindQuery {
            entity: Entity::Users,
            filter,
        });

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(USER_COLUMNS);
        qb.push(" FROM users");
        query.filter.push_where(&mut qb);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(limit.clamp(1, 200));

        let rows = qb
            .build_query_as::<UserRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(record_from_row).collect()
    }
}
