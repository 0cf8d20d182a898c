//! `PgStore` against a real database. Needs `DATABASE_URL` pointing at a
//! Postgres server where the test user may create databases:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/logbook cargo test --features postgres-tests
//! ```
#![cfg(feature = "postgres-tests")]

use std::{net::Ipv4Addr, sync::Arc};

use logbook::{
    config::AppConfig,
    state::AppState,
    store::{Level, NewRecord, NewUser, PgStore, RecordChanges, RecordQuery, StoreError},
};
use sqlx::PgPool;
use time::macros::datetime;

fn state(pool: PgPool) -> AppState {
    AppState::from_store(Arc::new(AppConfig::default()), Arc::new(PgStore::new(pool)))
}

fn new_user(email: &str) -> NewUser {
    NewUser {
        email: email.into(),
        password_hash: "$argon2id$stub".into(),
    }
}

fn new_record(user_id: i64, level: Level, message: &str) -> NewRecord {
    NewRecord {
        environment: "production".into(),
        level,
        message: message.into(),
        origin: Ipv4Addr::new(192, 168, 0, 4),
        date: datetime!(2020-07-19 19:05:00.123456 UTC),
        is_archived: false,
        events: Some(7),
        user_id,
    }
}

#[sqlx::test]
async fn duplicate_email_is_a_conflict(pool: PgPool) {
    let s = state(pool);
    s.users.create(new_user("a@example.com")).await.unwrap();
    let err = s.users.create(new_user("a@example.com")).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }), "{err:?}");
}

#[sqlx::test]
async fn token_upsert_keeps_the_first_key(pool: PgPool) {
    let s = state(pool);
    let user = s.users.create(new_user("a@example.com")).await.unwrap();

    let first = s.tokens.get_or_create(user.id, "k1").await.unwrap();
    let second = s.tokens.get_or_create(user.id, "k2").await.unwrap();
    assert_eq!(first.key, "k1");
    assert_eq!(second.key, "k1");

    let found = s.tokens.find_user("k1").await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert!(s.tokens.find_user("k2").await.unwrap().is_none());

    let other = s.users.create(new_user("b@example.com")).await.unwrap();
    let err = s.tokens.get_or_create(other.id, "k1").await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }), "{err:?}");
}

#[sqlx::test]
async fn records_need_an_existing_owner(pool: PgPool) {
    let s = state(pool);
    let err = s
        .records
        .create(new_record(99999, Level::Info, "orphan"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingReference { .. }), "{err:?}");
}

#[sqlx::test]
async fn record_round_trip_keeps_microseconds(pool: PgPool) {
    let s = state(pool);
    let user = s.users.create(new_user("a@example.com")).await.unwrap();
    let created = s
        .records
        .create(new_record(user.id, Level::Critical, "disk failure"))
        .await
        .unwrap();

    let loaded = s.records.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(loaded, created);
    assert_eq!(loaded.date, datetime!(2020-07-19 19:05:00.123456 UTC));
    assert_eq!(loaded.origin, Ipv4Addr::new(192, 168, 0, 4));
}

#[sqlx::test]
async fn partial_update_touches_only_given_columns(pool: PgPool) {
    let s = state(pool);
    let user = s.users.create(new_user("a@example.com")).await.unwrap();
    let created = s
        .records
        .create(new_record(user.id, Level::Info, "started"))
        .await
        .unwrap();

    let updated = s
        .records
        .update(
            created.id,
            RecordChanges {
                level: Some(Level::Warning),
                events: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.level, Level::Warning);
    assert_eq!(updated.events, None);
    assert_eq!(updated.message, "started");
    assert_eq!(updated.environment, created.environment);

    let unchanged = s
        .records
        .update(created.id, RecordChanges::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged, updated);

    let err = s
        .records
        .update(
            created.id,
            RecordChanges {
                user_id: Some(99999),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingReference { .. }), "{err:?}");

    let missing = s
        .records
        .update(
            99999,
            RecordChanges {
                is_archived: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[sqlx::test]
async fn list_filters_search_and_pages(pool: PgPool) {
    let s = state(pool);
    let a = s.users.create(new_user("a@example.com")).await.unwrap();
    let b = s.users.create(new_user("b@example.com")).await.unwrap();
    s.records
        .create(new_record(a.id, Level::Error, "Connection REFUSED"))
        .await
        .unwrap();
    s.records
        .create(new_record(a.id, Level::Info, "connection restored"))
        .await
        .unwrap();
    s.records
        .create(new_record(b.id, Level::Error, "disk full"))
        .await
        .unwrap();

    let errors = s
        .records
        .list(&RecordQuery {
            level: Some(Level::Error),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(errors.len(), 2);

    let found = s
        .records
        .list(&RecordQuery {
            search: Some("connection".into()),
            user_id: Some(a.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 2);

    let page = s
        .records
        .list(&RecordQuery {
            limit: Some(1),
            offset: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].message, "connection restored");
}

#[sqlx::test]
async fn deleting_a_user_cascades(pool: PgPool) {
    let s = state(pool);
    let user = s.users.create(new_user("a@example.com")).await.unwrap();
    s.tokens.get_or_create(user.id, "k1").await.unwrap();
    let record = s
        .records
        .create(new_record(user.id, Level::Debug, "trace"))
        .await
        .unwrap();

    assert!(s.users.delete(user.id).await.unwrap());
    assert!(!s.users.delete(user.id).await.unwrap());
    assert!(s.tokens.find_user("k1").await.unwrap().is_none());
    assert!(s.records.get_by_id(record.id).await.unwrap().is_none());
}
