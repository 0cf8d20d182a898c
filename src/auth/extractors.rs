use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::{auth::services::authenticate, error::ApiError, state::AppState, store::User};

/// Resolves the `Authorization: Token <key>` header to the calling user.
/// Handlers take it first so authentication precedes any other rejection.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        authenticate(state, header).await.map(AuthUser)
    }
}
