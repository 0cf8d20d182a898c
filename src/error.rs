//! Request-level error taxonomy and its HTTP rendering.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;
use crate::validation::{FieldErrors, AUTHORIZATION, NON_FIELD_ERRORS};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Login with unknown email or wrong password.
    #[error("unable to log in with provided credentials")]
    AuthenticationFailed,

    /// Missing, malformed or unknown token.
    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("validation failed")]
    Validation(FieldErrors),

    /// Body or query string that does not fit the expected shape.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Path-addressed entity absent.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Ids are integers; anything else cannot address an entity.
impl From<PathRejection> for ApiError {
    fn from(_: PathRejection) -> Self {
        ApiError::NotFound("Resource")
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::AuthenticationFailed
            | ApiError::Validation(_)
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorsBody {
    errors: FieldErrors,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::AuthenticationFailed => {
                let errors = FieldErrors::single(
                    NON_FIELD_ERRORS,
                    AUTHORIZATION,
                    "Unable to log in with provided credentials.",
                );
                (status, Json(ErrorsBody { errors })).into_response()
            }
            ApiError::Validation(errors) => (status, Json(ErrorsBody { errors })).into_response(),
            ApiError::Unauthorized(reason) => {
                let mut res = (status, Json(json!({ "detail": reason }))).into_response();
                res.headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Token"));
                res
            }
            ApiError::BadRequest(msg) => (status, Json(json!({ "detail": msg }))).into_response(),
            ApiError::NotFound(entity) => {
                (status, Json(json!({ "detail": format!("{entity} not found.") }))).into_response()
            }
            ApiError::Store(e) => {
                error!(error = %e, "store failure");
                internal(status)
            }
            ApiError::Internal(e) => {
                error!(error = %e, "internal failure");
                internal(status)
            }
        }
    }
}

fn internal(status: StatusCode) -> Response {
    (status, Json(json!({ "detail": "Internal server error." }))).into_response()
}

/// `axum::Json` whose rejection is a 400 `ApiError` instead of axum's 422.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

impl<T: Serialize> IntoResponse for AppJson<T> {
    fn into_response(self) -> Response {
        Json(self.0).into_response()
    }
}

/// `axum::extract::Path` that answers 404 when the segment does not parse.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct AppPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct AppQuery<T>(pub T);
