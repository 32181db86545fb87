//! Error taxonomy shared by every auth operation.

use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("no such key")]
    NotFound,

    #[error("email is not registered")]
    NotRegistered,

    #[error("email-password pair not activated yet")]
    NotActivated,

    #[error("activation link already used")]
    AlreadyUsed,

    #[error("email already exists")]
    AlreadyExists,

    #[error("wrong password")]
    WrongPassword,

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("forbidden")]
    Forbidden,

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("store call timed out")]
    Timeout,

    #[error("token rotation incomplete, the previous tokens may already be invalid")]
    RotationIncomplete,

    #[error("failed to send activation link: {0}")]
    NotificationFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Infrastructure failures the caller may retry after backing off.
    ///
    /// `NotificationFailed` is not one of them: the account is already written,
    /// so repeating the registration can only yield `AlreadyExists`.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::Timeout | Self::RotationIncomplete
        )
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::AlreadyUsed
            | Self::AlreadyExists
            | Self::InvalidRefreshToken => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::NotRegistered => StatusCode::NOT_FOUND,
            Self::NotActivated | Self::WrongPassword | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::RotationIncomplete => StatusCode::CONFLICT,
            Self::NotificationFailed(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => Self::StoreUnavailable(reason),
            StoreError::Timeout => Self::Timeout,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Infrastructure details stay in the logs.
        let message = match &self {
            Self::StoreUnavailable(_) => {
                error!("{self}");
                "store unavailable".to_string()
            }
            Self::Internal(_) => {
                error!("{self}");
                "internal error".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}
