//! Repository interfaces over users, tokens and records.
//!
//! Handlers and services only see these traits; `postgres` backs them with
//! sqlx and `memory` keeps everything in process for development and tests.

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod postgres;
mod types;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use types::{
    Level, NewRecord, NewUser, Record, RecordChanges, RecordQuery, Token, UnknownLevel, User,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated (e.g. duplicate email).
    #[error("{entity} already exists")]
    Conflict { entity: &'static str },

    /// A foreign key points at a row that does not exist.
    #[error("referenced {entity} does not exist")]
    MissingReference { entity: &'static str },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the email is taken.
    async fn create(&self, new: NewUser) -> StoreResult<User>;
    async fn get_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    async fn get_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn list(&self) -> StoreResult<Vec<User>>;
    /// Removes the user together with their token and records.
    /// Returns `false` when no such user existed.
    async fn delete(&self, id: i64) -> StoreResult<bool>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Returns the user's token, minting `candidate_key` if none exists yet.
    async fn get_or_create(&self, user_id: i64, candidate_key: &str) -> StoreResult<Token>;
    async fn find_user(&self, key: &str) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fails with `MissingReference` when `new.user_id` is unknown.
    async fn create(&self, new: NewRecord) -> StoreResult<Record>;
    async fn get_by_id(&self, id: i64) -> StoreResult<Option<Record>>;
    async fn list(&self, query: &RecordQuery) -> StoreResult<Vec<Record>>;
    /// `Ok(None)` when the record does not exist; `MissingReference` when
    /// the new `user_id` is unknown.
    async fn update(&self, id: i64, changes: RecordChanges) -> StoreResult<Option<Record>>;
    async fn delete(&self, id: i64) -> StoreResult<bool>;
}
