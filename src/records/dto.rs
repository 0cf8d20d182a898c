use serde::Deserialize;

use crate::validation::Input;

/// Body of `POST /records/`; `PUT`/`PATCH` use the same shape with every
/// field optional. Each field distinguishes absent, null and mistyped values.
#[derive(Debug, Default, Deserialize)]
pub struct RecordPayload {
    #[serde(default)]
    pub environment: Input<String>,
    #[serde(default)]
    pub level: Input<String>,
    #[serde(default)]
    pub message: Input<String>,
    #[serde(default)]
    pub origin: Input<String>,
    #[serde(default)]
    pub date: Input<String>,
    #[serde(default)]
    pub is_archived: Input<bool>,
    #[serde(default)]
    pub events: Input<i64>,
    #[serde(default)]
    pub user_id: Input<i64>,
}

impl RecordPayload {
    /// The referenced owner, if the payload names one.
    pub fn user_ref(&self) -> Option<i64> {
        self.user_id.as_value().copied()
    }
}

/// Query string of `GET /records/`. Empty values are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct RecordListParams {
    pub environment: Option<String>,
    pub level: Option<String>,
    pub message: Option<String>,
    pub origin: Option<String>,
    pub user_id: Option<i64>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
