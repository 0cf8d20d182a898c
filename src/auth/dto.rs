use serde::{Deserialize, Serialize};

use crate::validation::Input;

/// Request body for `POST /auth/token/`.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub email: Input<String>,
    #[serde(default)]
    pub password: Input<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}
