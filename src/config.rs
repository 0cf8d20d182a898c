use std::str::FromStr;

use anyhow::Context;
/// Which records an authenticated user may see and modify.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordVisibility {
    /// Any authenticated user may access any record.
    #[default]
    All,
    /// Only the owning user may access a record.
    Owner,
}

impl FromStr for RecordVisibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "owner" => Ok(Self::Owner),
            other => anyhow::bail!("unknown record visibility policy: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub host: String,
    pub port: u16,
    pub record_visibility: RecordVisibility,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: None,
            host: "0.0.0.0".into(),
            port: 8080,
            record_visibility: RecordVisibility::All,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database = match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(DatabaseConfig {
                url,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS")?.unwrap_or(10),
            }),
            _ => None,
        };

        Ok(Self {
            database,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_var("APP_PORT")?.unwrap_or(8080),
            record_visibility: parse_var("RECORD_VISIBILITY")?.unwrap_or_default(),
        })
    }
}

fn parse_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_parses_case_insensitively() {
        assert_eq!("owner".parse::<RecordVisibility>().unwrap(), RecordVisibility::Owner);
        assert_eq!(" ALL ".parse::<RecordVisibility>().unwrap(), RecordVisibility::All);
        assert!("everyone".parse::<RecordVisibility>().is_err());
    }

    #[test]
    fn default_config_uses_memory_store() {
        let cfg = AppConfig::default();
        assert!(cfg.database.is_none());
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.record_visibility, RecordVisibility::All);
    }
}
