use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{
    NewRecord, NewUser, Record, RecordChanges, RecordQuery, RecordStore, StoreError, StoreResult,
    Token, TokenStore, User, UserStore,
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    tokens: BTreeMap<String, Token>,
    records: BTreeMap<i64, Record>,
    user_seq: i64,
    record_seq: i64,
}

impl Tables {
    fn next_user_id(&mut self) -> i64 {
        self.user_seq += 1;
        self.user_seq
    }

    fn next_record_id(&mut self) -> i64 {
        self.record_seq += 1;
        self.record_seq
    }
}

/// In-process store. Each call holds the lock for its whole
/// read-modify-write; ids are never reused.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, new: NewUser) -> StoreResult<User> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email == new.email) {
            return Err(StoreError::Conflict { entity: "user" });
        }
        let user = User {
            id: t.next_user_id(),
            email: new.email,
            password_hash: new.password_hash,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        if t.users.remove(&id).is_none() {
            return Ok(false);
        }
        t.tokens.retain(|_, token| token.user_id != id);
        t.records.retain(|_, record| record.user_id != id);
        Ok(true)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get_or_create(&self, user_id: i64, candidate_key: &str) -> StoreResult<Token> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&user_id) {
            return Err(StoreError::MissingReference { entity: "user" });
        }
        if let Some(existing) = t.tokens.values().find(|tok| tok.user_id == user_id) {
            return Ok(existing.clone());
        }
        if t.tokens.contains_key(candidate_key) {
            return Err(StoreError::Conflict { entity: "token" });
        }
        let token = Token {
            key: candidate_key.to_string(),
            user_id,
        };
        t.tokens.insert(token.key.clone(), token.clone());
        Ok(token)
    }

    async fn find_user(&self, key: &str) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t
            .tokens
            .get(key)
            .and_then(|token| t.users.get(&token.user_id))
            .cloned())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, new: NewRecord) -> StoreResult<Record> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&new.user_id) {
            return Err(StoreError::MissingReference { entity: "user" });
        }
        let record = Record {
            id: t.next_record_id(),
            environment: new.environment,
            level: new.level,
            message: new.message,
            origin: new.origin,
            date: new.date,
            is_archived: new.is_archived,
            events: new.events,
            user_id: new.user_id,
        };
        t.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<Option<Record>> {
        Ok(self.tables.read().await.records.get(&id).cloned())
    }

    async fn list(&self, query: &RecordQuery) -> StoreResult<Vec<Record>> {
        let t = self.tables.read().await;
        let offset = usize::try_from(query.offset).unwrap_or(0);
        let limit = query
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);
        Ok(t
            .records
            .values()
            .filter(|r| query.matches(r))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update(&self, id: i64, changes: RecordChanges) -> StoreResult<Option<Record>> {
        let mut t = self.tables.write().await;
        if let Some(user_id) = changes.user_id {
            if !t.users.contains_key(&user_id) {
                return Err(StoreError::MissingReference { entity: "user" });
            }
        }
        let Some(record) = t.records.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply(record);
        Ok(Some(record.clone()))
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        Ok(self.tables.write().await.records.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::store::Level;
    use time::macros::datetime;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password_hash: "hash".into(),
        }
    }

    fn new_record(user_id: i64, message: &str) -> NewRecord {
        NewRecord {
            environment: "staging".into(),
            level: Level::Info,
            message: message.into(),
            origin: Ipv4Addr::new(192, 168, 0, 1),
            date: datetime!(2020-07-19 19:05 UTC),
            is_archived: false,
            events: None,
            user_id,
        }
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = MemoryStore::new();
        UserStore::create(&store, new_user("a@b.io")).await.unwrap();
        let err = UserStore::create(&store, new_user("a@b.io")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { entity: "user" }));
    }

    #[tokio::test]
    async fn record_requires_existing_user() {
        let store = MemoryStore::new();
        let err = RecordStore::create(&store, new_record(42, "x")).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingReference { .. }));
    }

    #[tokio::test]
    async fn deleting_user_cascades() {
        let store = MemoryStore::new();
        let user = UserStore::create(&store, new_user("a@b.io")).await.unwrap();
        let other = UserStore::create(&store, new_user("c@d.io")).await.unwrap();
        let mine = RecordStore::create(&store, new_record(user.id, "mine")).await.unwrap();
        let theirs = RecordStore::create(&store, new_record(other.id, "theirs")).await.unwrap();
        store.get_or_create(user.id, "k1").await.unwrap();

        assert!(UserStore::delete(&store, user.id).await.unwrap());
        assert!(!UserStore::delete(&store, user.id).await.unwrap());
        assert!(RecordStore::get_by_id(&store, mine.id).await.unwrap().is_none());
        assert!(RecordStore::get_by_id(&store, theirs.id).await.unwrap().is_some());
        assert!(store.find_user("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn token_is_stable_per_user() {
        let store = MemoryStore::new();
        let user = UserStore::create(&store, new_user("a@b.io")).await.unwrap();
        let first = store.get_or_create(user.id, "k1").await.unwrap();
        let second = store.get_or_create(user.id, "k2").await.unwrap();
        assert_eq!(first.key, "k1");
        assert_eq!(second.key, "k1");
        assert_eq!(store.find_user("k1").await.unwrap().unwrap().id, user.id);
        assert!(store.find_user("k2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ids_are_not_reused() {
        let store = MemoryStore::new();
        let user = UserStore::create(&store, new_user("a@b.io")).await.unwrap();
        let first = RecordStore::create(&store, new_record(user.id, "1")).await.unwrap();
        RecordStore::delete(&store, first.id).await.unwrap();
        let second = RecordStore::create(&store, new_record(user.id, "2")).await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let store = MemoryStore::new();
        let user = UserStore::create(&store, new_user("a@b.io")).await.unwrap();
        for msg in ["Disk full", "disk warning", "cpu hot"] {
            RecordStore::create(&store, new_record(user.id, msg)).await.unwrap();
        }
        let query = RecordQuery {
            search: Some("disk".into()),
            ..Default::default()
        };
        assert_eq!(RecordStore::list(&store, &query).await.unwrap().len(), 2);

        let query = RecordQuery {
            limit: Some(1),
            offset: 1,
            ..Default::default()
        };
        let page = RecordStore::list(&store, &query).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].message, "disk warning");
    }

    #[tokio::test]
    async fn update_with_unknown_user_fails_and_keeps_row() {
        let store = MemoryStore::new();
        let user = UserStore::create(&store, new_user("a@b.io")).await.unwrap();
        let rec = RecordStore::create(&store, new_record(user.id, "m")).await.unwrap();
        let changes = RecordChanges {
            message: Some("changed".into()),
            user_id: Some(999),
            ..Default::default()
        };
        assert!(RecordStore::update(&store, rec.id, changes).await.is_err());
        let stored = RecordStore::get_by_id(&store, rec.id).await.unwrap().unwrap();
        assert_eq!(stored.message, "m");
        assert!(RecordStore::update(&store, 999, RecordChanges::default())
            .await
            .unwrap()
            .is_none());
    }
}
