use super::{required, RefreshRequest};
use crate::auth::{AuthError, AuthState, TokenPair};
use axum::{extract::Extension, Json};
use tracing::instrument;

#[utoipa::path(
    post,
    path= "/refresh",
    request_body = RefreshRequest,
    responses (
        (status = 200, description = "Rotated token pair; the previous pair is no longer valid", body = TokenPair, content_type = "application/json"),
        (status = 400, description = "Unknown or already rotated refresh token"),
        (status = 409, description = "Rotation incomplete, retry with the same refresh token"),
    ),
    tag= "session"
)]
#[instrument(skip_all)]
pub async fn refresh(
    state: Extension<AuthState>,
    payload: Option<Json<RefreshRequest>>,
) -> Result<Json<TokenPair>, AuthError> {
    let request = required(payload)?;

    let pair = state.sessions().rotate(&request.refresh_token).await?;

    Ok(Json(pair))
}
