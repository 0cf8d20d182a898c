use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::store::{MemoryStore, PgStore, RecordStore, TokenStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub records: Arc<dyn RecordStore>,
}

impl AppState {
    /// Connects the configured backend and applies pending migrations.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let Some(database) = config.database.clone() else {
            warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
            return Ok(Self::in_memory(config));
        };

        let db = PgPoolOptions::new()
            .max_connections(database.max_connections)
            .connect(&database.url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;
        info!("database ready");

        Ok(Self::from_store(config, Arc::new(PgStore::new(db))))
    }

    pub fn in_memory(config: Arc<AppConfig>) -> Self {
        Self::from_store(config, Arc::new(MemoryStore::new()))
    }

    /// Uses one backend for all three repositories so cascades stay consistent.
    pub fn from_store<S>(config: Arc<AppConfig>, store: Arc<S>) -> Self
    where
        S: UserStore + TokenStore + RecordStore + 'static,
    {
        Self {
            config,
            users: store.clone(),
            tokens: store.clone(),
            records: store,
        }
    }
}
