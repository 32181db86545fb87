use super::{required, Credentials};
use crate::auth::{AuthError, AuthState, TokenPair};
use axum::{extract::Extension, Json};
use tracing::instrument;

#[utoipa::path(
    post,
    path= "/login",
    request_body = Credentials,
    responses (
        (status = 200, description = "New token pair", body = TokenPair, content_type = "application/json"),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Wrong password or account not activated"),
        (status = 404, description = "Email not registered"),
    ),
    tag= "session"
)]
#[instrument(skip(state))]
pub async fn login(
    state: Extension<AuthState>,
    payload: Option<Json<Credentials>>,
) -> Result<Json<TokenPair>, AuthError> {
    let credentials = required(payload)?;

    let pair = state
        .sessions()
        .login(&credentials.email, &credentials.password)
        .await?;

    Ok(Json(pair))
}
