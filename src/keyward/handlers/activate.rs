use super::Status;
use crate::auth::{AuthError, AuthState};
use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
};
use tracing::instrument;

#[utoipa::path(
    get,
    path= "/links/{code}",
    params(
        ("code" = String, Path, description = "Numeric activation code from the emailed link")
    ),
    responses (
        (status = 200, description = "Account activated", body = Status, content_type = "application/json"),
        (status = 400, description = "Malformed or already used code"),
        (status = 404, description = "Unknown code"),
    ),
    tag= "register"
)]
#[instrument(skip(state))]
pub async fn activate(
    state: Extension<AuthState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AuthError> {
    if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AuthError::validation("Activation code must be numeric"));
    }

    state.accounts().activate(&code).await?;

    Ok(Status::new("activated"))
}
