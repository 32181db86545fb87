use super::{required, RefreshRequest};
use crate::auth::{AuthError, AuthState};
use axum::{extract::Extension, http::StatusCode, Json};
use tracing::instrument;

#[utoipa::path(
    post,
    path= "/logout",
    request_body = RefreshRequest,
    responses (
        (status = 204, description = "Token pair revoked"),
        (status = 400, description = "Unknown refresh token"),
    ),
    tag= "session"
)]
#[instrument(skip_all)]
pub async fn logout(
    state: Extension<AuthState>,
    payload: Option<Json<RefreshRequest>>,
) -> Result<StatusCode, AuthError> {
    let request = required(payload)?;

    state.sessions().logout(&request.refresh_token).await?;

    Ok(StatusCode::NO_CONTENT)
}
