use std::fmt::Write as _;

use rand::{rngs::OsRng, RngCore};
use tracing::{debug, warn};

use crate::{
    auth::password::verify_password,
    error::ApiError,
    state::AppState,
    store::{StoreError, User},
};

/// Bytes of entropy per token; hex-encoded this yields 40 characters.
const TOKEN_BYTES: usize = 20;

/// Fresh random token key, lowercase hex.
pub fn generate_key() -> String {
    let mut raw = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut raw);
    raw.iter().fold(String::with_capacity(TOKEN_BYTES * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Exchanges credentials for the user's token, minting one on first login.
pub async fn obtain_token(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<(User, String), ApiError> {
    let email = normalize_email(email);

    let Some(user) = state.users.get_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(ApiError::AuthenticationFailed);
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(email = %email, user_id = user.id, "login invalid password");
        return Err(ApiError::AuthenticationFailed);
    }

    // A fresh candidate is only used when the user has no token yet;
    // a collision on the key itself is retried once.
    let token = match state.tokens.get_or_create(user.id, &generate_key()).await {
        Err(StoreError::Conflict { .. }) => {
            state.tokens.get_or_create(user.id, &generate_key()).await?
        }
        other => other?,
    };
    debug!(user_id = user.id, "token issued");
    Ok((user, token.key))
}

/// Parses an `Authorization` header value and resolves it to a user.
pub async fn authenticate(state: &AppState, header: Option<&str>) -> Result<User, ApiError> {
    let key = parse_token_header(header)?;
    match state.tokens.find_user(key).await? {
        Some(user) => Ok(user),
        None => {
            warn!("unknown token");
            Err(ApiError::Unauthorized("Invalid token."))
        }
    }
}

/// Extracts the key from `Token <key>`; the keyword is case-insensitive.
pub fn parse_token_header(header: Option<&str>) -> Result<&str, ApiError> {
    let not_provided = ApiError::Unauthorized("Authentication credentials were not provided.");
    let Some(header) = header else {
        return Err(not_provided);
    };

    let mut parts = header.split_whitespace();
    match parts.next() {
        Some(keyword) if keyword.eq_ignore_ascii_case("token") => {}
        _ => return Err(not_provided),
    }
    let Some(key) = parts.next() else {
        return Err(ApiError::Unauthorized(
            "Invalid token header. No credentials provided.",
        ));
    };
    if parts.next().is_some() {
        return Err(ApiError::Unauthorized(
            "Invalid token header. Token string should not contain spaces.",
        ));
    }
    Ok(key)
}
