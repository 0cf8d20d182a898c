//! Record ingestion rules and the operations behind the record endpoints.

use std::net::Ipv4Addr;

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    config::RecordVisibility,
    error::ApiError,
    state::AppState,
    store::{Level, NewRecord, Record, RecordChanges, RecordQuery, StoreError, User},
    validation::{
        check_text, non_null, nullable, parse_ipv4, parse_timestamp, require, FieldErrors,
        DOES_NOT_EXIST, INVALID, INVALID_CHOICE, MAX_VALUE, MIN_VALUE,
    },
};

use super::dto::{RecordListParams, RecordPayload};

pub const MAX_ENVIRONMENT_CHARS: usize = 30;
pub const MAX_MESSAGE_CHARS: usize = 200;

fn check_environment(errors: &mut FieldErrors, value: String) -> Option<String> {
    check_text(errors, "environment", &value, MAX_ENVIRONMENT_CHARS).then_some(value)
}

fn check_message(errors: &mut FieldErrors, value: String) -> Option<String> {
    check_text(errors, "message", &value, MAX_MESSAGE_CHARS).then_some(value)
}

fn check_level(errors: &mut FieldErrors, value: &str) -> Option<Level> {
    match value.parse::<Level>() {
        Ok(level) => Some(level),
        Err(e) => {
            errors.add("level", INVALID_CHOICE, e.to_string());
            None
        }
    }
}

fn check_origin(errors: &mut FieldErrors, value: &str) -> Option<Ipv4Addr> {
    let parsed = parse_ipv4(value);
    if parsed.is_none() {
        errors.add("origin", INVALID, "Enter a valid IPv4 address.");
    }
    parsed
}

fn check_date(errors: &mut FieldErrors, value: &str) -> Option<OffsetDateTime> {
    let parsed = parse_timestamp(value);
    if parsed.is_none() {
        errors.add(
            "date",
            INVALID,
            "Datetime has wrong format. Use an ISO 8601 timestamp.",
        );
    }
    parsed
}

fn check_events(errors: &mut FieldErrors, value: i64) -> Option<i32> {
    if value < 0 {
        errors.add("events", MIN_VALUE, "Ensure this value is greater than or equal to 0.");
        return None;
    }
    match i32::try_from(value) {
        Ok(n) => Some(n),
        Err(_) => {
            errors.add(
                "events",
                MAX_VALUE,
                format!("Ensure this value is less than or equal to {}.", i32::MAX),
            );
            None
        }
    }
}

fn check_user(errors: &mut FieldErrors, id: i64, user_known: bool) -> Option<i64> {
    if user_known {
        Some(id)
    } else {
        errors.add(
            "user_id",
            DOES_NOT_EXIST,
            format!("Invalid pk \"{id}\" - object does not exist."),
        );
        None
    }
}

/// Validates a creation payload. Every field except `events` is required;
/// `user_known` tells whether the referenced owner exists.
pub fn validate_new(p: RecordPayload, user_known: bool) -> Result<NewRecord, FieldErrors> {
    let mut errors = FieldErrors::new();

    let environment = require(&mut errors, "environment", p.environment)
        .and_then(|v| check_environment(&mut errors, v));
    let level = require(&mut errors, "level", p.level).and_then(|v| check_level(&mut errors, &v));
    let message =
        require(&mut errors, "message", p.message).and_then(|v| check_message(&mut errors, v));
    let origin =
        require(&mut errors, "origin", p.origin).and_then(|v| check_origin(&mut errors, &v));
    let date = require(&mut errors, "date", p.date).and_then(|v| check_date(&mut errors, &v));
    let is_archived = require(&mut errors, "is_archived", p.is_archived);
    let events = nullable(&mut errors, "events", p.events)
        .flatten()
        .and_then(|v| check_events(&mut errors, v));
    let user_id = require(&mut errors, "user_id", p.user_id)
        .and_then(|v| check_user(&mut errors, v, user_known));

    match (environment, level, message, origin, date, is_archived, user_id) {
        (
            Some(environment),
            Some(level),
            Some(message),
            Some(origin),
            Some(date),
            Some(is_archived),
            Some(user_id),
        ) if errors.is_empty() => Ok(NewRecord {
            environment,
            level,
            message,
            origin,
            date,
            is_archived,
            events,
            user_id,
        }),
        _ => Err(errors),
    }
}

/// Validates an update payload: only fields present are checked, and only
/// `events` may be set to null.
pub fn validate_changes(p: RecordPayload, user_known: bool) -> Result<RecordChanges, FieldErrors> {
    let mut errors = FieldErrors::new();

    let changes = RecordChanges {
        environment: non_null(&mut errors, "environment", p.environment)
            .and_then(|v| check_environment(&mut errors, v)),
        level: non_null(&mut errors, "level", p.level).and_then(|v| check_level(&mut errors, &v)),
        message: non_null(&mut errors, "message", p.message)
            .and_then(|v| check_message(&mut errors, v)),
        origin: non_null(&mut errors, "origin", p.origin)
            .and_then(|v| check_origin(&mut errors, &v)),
        date: non_null(&mut errors, "date", p.date).and_then(|v| check_date(&mut errors, &v)),
        is_archived: non_null(&mut errors, "is_archived", p.is_archived),
        events: match nullable(&mut errors, "events", p.events) {
            None => None,
            Some(None) => Some(None),
            Some(Some(v)) => check_events(&mut errors, v).map(Some),
        },
        user_id: non_null(&mut errors, "user_id", p.user_id)
            .and_then(|v| check_user(&mut errors, v, user_known)),
    };

    errors.into_result().map(|()| changes)
}

/// Turns list query parameters into a store query; empty values are ignored.
pub fn build_query(params: RecordListParams) -> Result<RecordQuery, FieldErrors> {
    fn given(v: Option<String>) -> Option<String> {
        v.filter(|s| !s.is_empty())
    }

    let mut errors = FieldErrors::new();
    let level = given(params.level).and_then(|v| check_level(&mut errors, &v));
    let origin = given(params.origin).and_then(|v| check_origin(&mut errors, &v));

    if params.limit.is_some_and(|l| l < 0) {
        errors.add("limit", MIN_VALUE, "Ensure this value is greater than or equal to 0.");
    }
    let offset = params.offset.unwrap_or(0);
    if offset < 0 {
        errors.add("offset", MIN_VALUE, "Ensure this value is greater than or equal to 0.");
    }

    errors.into_result()?;
    Ok(RecordQuery {
        environment: given(params.environment),
        level,
        message: given(params.message),
        origin,
        user_id: params.user_id,
        search: given(params.search),
        limit: params.limit,
        offset,
    })
}

fn unknown_user(id: Option<i64>) -> ApiError {
    let mut errors = FieldErrors::new();
    check_user(&mut errors, id.unwrap_or_default(), false);
    ApiError::Validation(errors)
}

async fn user_exists(state: &AppState, id: Option<i64>) -> Result<bool, ApiError> {
    match id {
        Some(id) => Ok(state.users.get_by_id(id).await?.is_some()),
        None => Ok(true),
    }
}

fn visible(state: &AppState, caller: &User, record: &Record) -> bool {
    match state.config.record_visibility {
        RecordVisibility::All => true,
        RecordVisibility::Owner => record.user_id == caller.id,
    }
}

pub async fn create(state: &AppState, payload: RecordPayload) -> Result<Record, ApiError> {
    let user_ref = payload.user_ref();
    let user_known = user_exists(state, user_ref).await?;
    let new = validate_new(payload, user_known).map_err(|errors| {
        warn!(?errors, "record rejected");
        ApiError::Validation(errors)
    })?;

    let record = match state.records.create(new).await {
        Ok(r) => r,
        // Owner deleted between the check and the insert.
        Err(StoreError::MissingReference { .. }) => return Err(unknown_user(user_ref)),
        Err(e) => return Err(e.into()),
    };
    info!(record_id = record.id, user_id = record.user_id, "record created: {record}");
    Ok(record)
}

pub async fn list(
    state: &AppState,
    caller: &User,
    params: RecordListParams,
) -> Result<Vec<Record>, ApiError> {
    let mut query = build_query(params)?;
    if state.config.record_visibility == RecordVisibility::Owner {
        if query.user_id.is_some_and(|id| id != caller.id) {
            return Ok(Vec::new());
        }
        query.user_id = Some(caller.id);
    }
    Ok(state.records.list(&query).await?)
}

/// Loads a record the caller may see, or `NotFound`.
pub async fn fetch(state: &AppState, caller: &User, id: i64) -> Result<Record, ApiError> {
    state
        .records
        .get_by_id(id)
        .await?
        .filter(|r| visible(state, caller, r))
        .ok_or(ApiError::NotFound("Record"))
}

pub async fn update(
    state: &AppState,
    caller: &User,
    id: i64,
    payload: RecordPayload,
) -> Result<Record, ApiError> {
    fetch(state, caller, id).await?;

    let user_ref = payload.user_ref();
    let user_known = user_exists(state, user_ref).await?;
    let changes = validate_changes(payload, user_known).map_err(|errors| {
        warn!(record_id = id, ?errors, "record update rejected");
        ApiError::Validation(errors)
    })?;

    let record = match state.records.update(id, changes).await {
        Ok(Some(r)) => r,
        Ok(None) => return Err(ApiError::NotFound("Record")),
        Err(StoreError::MissingReference { .. }) => return Err(unknown_user(user_ref)),
        Err(e) => return Err(e.into()),
    };
    info!(record_id = record.id, "record updated");
    Ok(record)
}

pub async fn remove(state: &AppState, caller: &User, id: i64) -> Result<(), ApiError> {
    fetch(state, caller, id).await?;
    if !state.records.delete(id).await? {
        return Err(ApiError::NotFound("Record"));
    }
    info!(record_id = id, "record deleted");
    Ok(())
}
