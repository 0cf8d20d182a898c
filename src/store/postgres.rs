use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use tracing::debug;

use super::{
    NewRecord, NewUser, Record, RecordChanges, RecordQuery, RecordStore, StoreError, StoreResult,
    Token, TokenStore, User, UserStore,
};

const USER_COLUMNS: &str = "id, email, password_hash, created_at";
const RECORD_COLUMNS: &str =
    "id, environment, level, message, origin, date, is_archived, events, user_id";

/// PostgreSQL-backed store. Cascades are enforced by the schema.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    created_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TokenRow {
    key: String,
    user_id: i64,
}

impl From<TokenRow> for Token {
    fn from(r: TokenRow) -> Self {
        Self {
            key: r.key,
            user_id: r.user_id,
        }
    }
}

#[derive(Debug, FromRow)]
struct RecordRow {
    id: i64,
    environment: String,
    level: String,
    message: String,
    origin: String,
    date: OffsetDateTime,
    is_archived: bool,
    events: Option<i32>,
    user_id: i64,
}

impl TryFrom<RecordRow> for Record {
    type Error = StoreError;

    fn try_from(r: RecordRow) -> Result<Self, Self::Error> {
        let level = r
            .level
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("record {}: level {:?}", r.id, r.level)))?;
        let origin = r
            .origin
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("record {}: origin {:?}", r.id, r.origin)))?;
        Ok(Self {
            id: r.id,
            environment: r.environment,
            level,
            message: r.message,
            origin,
            date: r.date,
            is_archived: r.is_archived,
            events: r.events,
            user_id: r.user_id,
        })
    }
}

/// Maps constraint violations onto the store's own error kinds.
fn map_db_error(e: sqlx::Error, entity: &'static str) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Conflict { entity };
        }
        if db.is_foreign_key_violation() {
            return StoreError::MissingReference { entity: "user" };
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl UserStore for PgStore {
    async fn create(&self, new: NewUser) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (email, password_hash) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        ))
        .bind(&new.email)
        .bind(&new.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_db_error(e, "user"))?;
        Ok(row.into())
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        debug!(user_id = id, rows = result.rows_affected(), "user delete");
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn get_or_create(&self, user_id: i64, candidate_key: &str) -> StoreResult<Token> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            INSERT INTO auth_tokens (key, user_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING key, user_id
            "#,
        )
        .bind(candidate_key)
        .bind(user_id)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_db_error(e, "token"))?;
        Ok(row.into())
    }

    async fn find_user(&self, key: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.email, u.password_hash, u.created_at
              FROM auth_tokens t
              JOIN users u ON u.id = t.user_id
             WHERE t.key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn create(&self, new: NewRecord) -> StoreResult<Record> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            r#"
            INSERT INTO records (environment, level, message, origin, date, is_archived, events, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(&new.environment)
        .bind(new.level.as_str())
        .bind(&new.message)
        .bind(new.origin.to_string())
        .bind(new.date)
        .bind(new.is_archived)
        .bind(new.events)
        .bind(new.user_id)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_db_error(e, "record"))?;
        row.try_into()
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<Option<Record>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, query: &RecordQuery) -> StoreResult<Vec<Record>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {RECORD_COLUMNS} FROM records WHERE TRUE"));
        if let Some(v) = &query.environment {
            qb.push(" AND environment = ").push_bind(v.clone());
        }
        if let Some(v) = query.level {
            qb.push(" AND level = ").push_bind(v.as_str());
        }
        if let Some(v) = &query.message {
            qb.push(" AND message = ").push_bind(v.clone());
        }
        if let Some(v) = query.origin {
            qb.push(" AND origin = ").push_bind(v.to_string());
        }
        if let Some(v) = query.user_id {
            qb.push(" AND user_id = ").push_bind(v);
        }
        if let Some(v) = &query.search {
            qb.push(" AND strpos(lower(message), lower(")
                .push_bind(v.clone())
                .push(")) > 0");
        }
        qb.push(" ORDER BY id");
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        qb.push(" OFFSET ").push_bind(query.offset);

        let rows = qb
            .build_query_as::<RecordRow>()
            .fetch_all(&self.db)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update(&self, id: i64, changes: RecordChanges) -> StoreResult<Option<Record>> {
        if changes.is_empty() {
            return RecordStore::get_by_id(self, id).await;
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE records SET ");
        {
            let mut set = qb.separated(", ");
            if let Some(v) = changes.environment {
                set.push("environment = ").push_bind_unseparated(v);
            }
            if let Some(v) = changes.level {
                set.push("level = ").push_bind_unseparated(v.as_str());
            }
            if let Some(v) = changes.message {
                set.push("message = ").push_bind_unseparated(v);
            }
            if let Some(v) = changes.origin {
                set.push("origin = ").push_bind_unseparated(v.to_string());
            }
            if let Some(v) = changes.date {
                set.push("date = ").push_bind_unseparated(v);
            }
            if let Some(v) = changes.is_archived {
                set.push("is_archived = ").push_bind_unseparated(v);
            }
            if let Some(v) = changes.events {
                set.push("events = ").push_bind_unseparated(v);
            }
            if let Some(v) = changes.user_id {
                set.push("user_id = ").push_bind_unseparated(v);
            }
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(format!(" RETURNING {RECORD_COLUMNS}"));

        let row = qb
            .build_query_as::<RecordRow>()
            .fetch_optional(&self.db)
            .await
            .map_err(|e| map_db_error(e, "record"))?;
        row.map(TryInto::try_into).transpose()
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM records WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
