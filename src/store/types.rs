use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::Serialize;
use time::{macros::format_description, OffsetDateTime};

/// User row. The hash never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 PHC string
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
}

/// Opaque bearer token bound to exactly one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub key: String,
    pub user_id: i64,
}

/// Severity of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Info,
    Debug,
    Warning,
    Critical,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Error,
        Level::Info,
        Level::Debug,
        Level::Warning,
        Level::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Warning => "warning",
            Level::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLevel(pub String);

impl fmt::Display for UnknownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" is not a valid choice.", self.0)
    }
}

impl std::error::Error for UnknownLevel {}

impl FromStr for Level {
    type Err = UnknownLevel;

    /// Exact, case-sensitive match against the five literals.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| UnknownLevel(s.to_string()))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logged event attributed to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub id: i64,
    pub environment: String,
    pub level: Level,
    pub message: String,
    pub origin: Ipv4Addr,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub is_archived: bool,
    pub events: Option<i32>,
    pub user_id: i64,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stamp = self
            .date
            .format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))
            .map_err(|_| fmt::Error)?;
        write!(
            f,
            "{} [{}][{}] {}: {}",
            stamp, self.level, self.origin, self.environment, self.message
        )
    }
}

/// Fully validated input for a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub environment: String,
    pub level: Level,
    pub message: String,
    pub origin: Ipv4Addr,
    pub date: OffsetDateTime,
    pub is_archived: bool,
    pub events: Option<i32>,
    pub user_id: i64,
}

/// Validated partial update; `None` leaves the column untouched.
/// `events` is doubly optional because it can be cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordChanges {
    pub environment: Option<String>,
    pub level: Option<Level>,
    pub message: Option<String>,
    pub origin: Option<Ipv4Addr>,
    pub date: Option<OffsetDateTime>,
    pub is_archived: Option<bool>,
    pub events: Option<Option<i32>>,
    pub user_id: Option<i64>,
}

impl RecordChanges {
    pub fn is_empty(&self) -> bool {
        *self == RecordChanges::default()
    }

    pub fn apply(self, record: &mut Record) {
        if let Some(v) = self.environment {
            record.environment = v;
        }
        if let Some(v) = self.level {
            record.level = v;
        }
        if let Some(v) = self.message {
            record.message = v;
        }
        if let Some(v) = self.origin {
            record.origin = v;
        }
        if let Some(v) = self.date {
            record.date = v;
        }
        if let Some(v) = self.is_archived {
            record.is_archived = v;
        }
        if let Some(v) = self.events {
            record.events = v;
        }
        if let Some(v) = self.user_id {
            record.user_id = v;
        }
    }
}

/// Equality filters plus a case-insensitive substring search on `message`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub environment: Option<String>,
    pub level: Option<Level>,
    pub message: Option<String>,
    pub origin: Option<Ipv4Addr>,
    pub user_id: Option<i64>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: i64,
}

impl RecordQuery {
    pub fn matches(&self, record: &Record) -> bool {
        self.environment
            .as_ref()
            .map_or(true, |v| &record.environment == v)
            && self.level.map_or(true, |v| record.level == v)
            && self.message.as_ref().map_or(true, |v| &record.message == v)
            && self.origin.map_or(true, |v| record.origin == v)
            && self.user_id.map_or(true, |v| record.user_id == v)
            && self.search.as_ref().map_or(true, |needle| {
                record
                    .message
                    .to_lowercase()
                    .contains(&needle.to_lowercase())
            })
    }
}
