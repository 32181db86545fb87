pub mod activate;
pub use self::activate::activate;

pub mod health;
pub use self::health::health;

pub mod login;
pub use self::login::login;

pub mod logout;
pub use self::logout::logout;

pub mod promote;
pub use self::promote::promote;

pub mod refresh;
pub use self::refresh::refresh;

pub mod register;
pub use self::register::register;

pub mod validate;
pub use self::validate::validate;

// common types for the handlers
use crate::auth::AuthError;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Email and password, as sent to `/register` and `/login`.
#[derive(ToSchema, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

#[derive(ToSchema, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Status {
    pub status: String,
}

impl Status {
    fn new(status: &str) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
        })
    }
}

/// Unwrap an optional JSON body, treating a missing or malformed body as a validation error.
fn required<T>(payload: Option<Json<T>>) -> Result<T, AuthError> {
    payload
        .map(|Json(payload)| payload)
        .ok_or_else(|| AuthError::validation("Missing payload"))
}
