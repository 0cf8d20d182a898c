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
    error::{ApiError, AppJson, AppPath},
    state::AppState,
};

use super::{
    dto::{CreateUserRequest, MessageResponse, UserResponse},
    services,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/", get(list_users).post(create_user))
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id/", get(get_user).delete(delete_user))
        .route("/users/:id", get(get_user).delete(delete_user))
}

#[instrument(skip(state, caller), fields(caller_id = caller.id))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<AppJson<Vec<UserResponse>>, ApiError> {
    let users = state.users.list().await?;
    Ok(AppJson(users.into_iter().map(UserResponse::from).collect()))
}

#[instrument(skip(state, caller, payload), fields(caller_id = caller.id))]
pub async fn create_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = services::register(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/users/{}/", user.id))],
        AppJson(UserResponse::from(user)),
    ))
}

#[instrument(skip(state, caller), fields(caller_id = caller.id))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<AppJson<UserResponse>, ApiError> {
    let user = state
        .users
        .get_by_id(id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(AppJson(user.into()))
}

#[instrument(skip(state, caller), fields(caller_id = caller.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<AppJson<MessageResponse>, ApiError> {
    services::remove(&state, id).await?;
    Ok(AppJson(MessageResponse {
        message: "User deleted.",
    }))
}
