use axum::{extract::State, routing::post, Router};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{TokenRequest, TokenResponse},
        services::obtain_token,
    },
    error::{ApiError, AppJson},
    state::AppState,
    validation::{require, FieldErrors},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/token/", post(token))
        .route("/auth/token", post(token))
}

#[instrument(skip(state, payload))]
pub async fn token(
    State(state): State<AppState>,
    AppJson(payload): AppJson<TokenRequest>,
) -> Result<AppJson<TokenResponse>, ApiError> {
    let mut errors = FieldErrors::new();
    let email = require(&mut errors, "email", payload.email);
    let password = require(&mut errors, "password", payload.password);
    let (Some(email), Some(password)) = (email, password) else {
        return Err(errors.into());
    };

    let (user, token) = obtain_token(&state, &email, &password).await?;
    info!(user_id = user.id, "user logged in");
    Ok(AppJson(TokenResponse { token }))
}
