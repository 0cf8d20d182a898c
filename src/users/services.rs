use tracing::{info, warn};

use crate::{
    auth::{password::hash_password, services::normalize_email},
    error::ApiError,
    state::AppState,
    store::{NewUser, StoreError, User},
    validation::{is_valid_email, require, FieldErrors, INVALID, MAX_LENGTH, MIN_LENGTH, UNIQUE},
};

use super::dto::CreateUserRequest;

pub const MIN_PASSWORD_CHARS: usize = 8;
pub const MAX_EMAIL_CHARS: usize = 254;

/// Validated registration input; the password is still plaintext here.
#[derive(Debug)]
pub struct Registration {
    pub email: String,
    pub password: String,
}

pub fn validate_registration(req: CreateUserRequest) -> Result<Registration, FieldErrors> {
    let mut errors = FieldErrors::new();

    let email = require(&mut errors, "email", req.email).map(|e| normalize_email(&e));
    if let Some(email) = &email {
        if email.chars().count() > MAX_EMAIL_CHARS {
            errors.add(
                "email",
                MAX_LENGTH,
                format!("Ensure this field has no more than {MAX_EMAIL_CHARS} characters."),
            );
        } else if !is_valid_email(email) {
            errors.add("email", INVALID, "Enter a valid email address.");
        }
    }

    let password = require(&mut errors, "password", req.password);
    if let Some(password) = &password {
        if password.chars().count() < MIN_PASSWORD_CHARS {
            errors.add(
                "password",
                MIN_LENGTH,
                format!("Ensure this field has at least {MIN_PASSWORD_CHARS} characters."),
            );
        }
    }

    match (email, password) {
        (Some(email), Some(password)) if errors.is_empty() => Ok(Registration { email, password }),
        _ => Err(errors),
    }
}

/// Validates, hashes and stores a new user.
pub async fn register(state: &AppState, req: CreateUserRequest) -> Result<User, ApiError> {
    let reg = validate_registration(req).map_err(|errors| {
        warn!(?errors, "user registration rejected");
        ApiError::Validation(errors)
    })?;

    if state.users.get_by_email(&reg.email).await?.is_some() {
        warn!(email = %reg.email, "email already registered");
        return Err(duplicate_email());
    }

    let password_hash = hash_password(&reg.password)?;
    let user = match state
        .users
        .create(NewUser {
            email: reg.email,
            password_hash,
        })
        .await
    {
        Ok(u) => u,
        // Lost a race with a concurrent registration.
        Err(StoreError::Conflict { .. }) => return Err(duplicate_email()),
        Err(e) => return Err(e.into()),
    };

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(user)
}

/// Deletes a user; their token and records go with them.
pub async fn remove(state: &AppState, id: i64) -> Result<(), ApiError> {
    if !state.users.delete(id).await? {
        return Err(ApiError::NotFound("User"));
    }
    info!(user_id = id, "user deleted");
    Ok(())
}

fn duplicate_email() -> ApiError {
    ApiError::Validation(FieldErrors::single(
        "email",
        UNIQUE,
        "user with this e-mail already exists.",
    ))
}
