use super::required;
use crate::auth::{AuthError, AuthState};
use axum::{
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Promotion {
    email: String,
}

#[utoipa::path(
    post,
    path= "/promote",
    request_body = Promotion,
    params(
        ("Authorization" = String, Header, description = "Bearer access token of an administrator")
    ),
    responses (
        (status = 204, description = "Email is admin eligible from its next login"),
        (status = 400, description = "Missing bearer token or invalid email"),
        (status = 403, description = "Caller is not an administrator"),
    ),
    tag= "admin"
)]
#[instrument(skip(state, headers))]
pub async fn promote(
    state: Extension<AuthState>,
    headers: HeaderMap,
    payload: Option<Json<Promotion>>,
) -> Result<StatusCode, AuthError> {
    let caller = bearer_token(&headers)?;
    let promotion = required(payload)?;

    state.promoter().promote(caller, &promotion.email).await?;

    Ok(StatusCode::NO_CONTENT)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::validation("Missing bearer token"))
}
