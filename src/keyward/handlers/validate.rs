use super::required;
use crate::auth::{AuthError, AuthState};
use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub token: String,
    /// Whether the caller is about to perform a write and needs an admin token.
    #[serde(default)]
    pub write: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ValidateResponse {
    pub valid: bool,
}

#[utoipa::path(
    post,
    path= "/validate",
    request_body = ValidateRequest,
    responses (
        (status = 200, description = "Validation outcome; an unknown token is `valid: false`", body = ValidateResponse, content_type = "application/json"),
        (status = 400, description = "Missing token"),
        (status = 503, description = "Store unavailable"),
        (status = 504, description = "Store call timed out"),
    ),
    tag= "validate"
)]
#[instrument(skip_all)]
pub async fn validate(
    state: Extension<AuthState>,
    payload: Option<Json<ValidateRequest>>,
) -> Result<Json<ValidateResponse>, AuthError> {
    let request = required(payload)?;

    let valid = state
        .validator()
        .validate(&request.token, request.write)
        .await?;

    Ok(Json(ValidateResponse { valid }))
}
