use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tracing::instrument;

use crate::{
    auth::AuthUser,
    error::{ApiError, AppJson, AppPath, AppQuery},
    state::AppState,
    store::Record,
    users::dto::MessageResponse,
};

use super::{
    dto::{RecordListParams, RecordPayload},
    services,
};

pub fn record_routes() -> Router<AppState> {
    Router::new()
        .route("/records/", get(list_records).post(create_record))
        .route("/records", get(list_records).post(create_record))
        .route(
            "/records/:id/",
            get(get_record)
                .put(update_record)
                .patch(update_record)
                .delete(delete_record),
        )
        .route(
            "/records/:id",
            get(get_record)
                .put(update_record)
                .patch(update_record)
                .delete(delete_record),
        )
}

#[instrument(skip(state, caller, params), fields(caller_id = caller.id))]
pub async fn list_records(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppQuery(params): AppQuery<RecordListParams>,
) -> Result<AppJson<Vec<Record>>, ApiError> {
    let records = services::list(&state, &caller, params).await?;
    Ok(AppJson(records))
}

#[instrument(skip(state, caller, payload), fields(caller_id = caller.id))]
pub async fn create_record(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppJson(payload): AppJson<RecordPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let record = services::create(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/records/{}/", record.id))],
        AppJson(record),
    ))
}

#[instrument(skip(state, caller), fields(caller_id = caller.id))]
pub async fn get_record(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<AppJson<Record>, ApiError> {
    Ok(AppJson(services::fetch(&state, &caller, id).await?))
}

/// Serves both `PUT` and `PATCH`; either one accepts a partial body.
#[instrument(skip(state, caller, payload), fields(caller_id = caller.id))]
pub async fn update_record(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<RecordPayload>,
) -> Result<AppJson<Record>, ApiError> {
    let record = services::update(&state, &caller, id, payload).await?;
    Ok(AppJson(record))
}

#[instrument(skip(state, caller), fields(caller_id = caller.id))]
pub async fn delete_record(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<AppJson<MessageResponse>, ApiError> {
    services::remove(&state, &caller, id).await?;
    Ok(AppJson(MessageResponse {
        message: "Record deleted.",
    }))
}
