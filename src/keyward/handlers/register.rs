use super::{required, Credentials, Status};
use crate::auth::{AuthError, AuthState};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use tracing::instrument;

#[utoipa::path(
    post,
    path= "/register",
    request_body = Credentials,
    responses (
        (status = 201, description = "Account created, activation link sent", body = Status, content_type = "application/json"),
        (status = 400, description = "Invalid input or email already exists"),
        (status = 502, description = "Account created but the activation link could not be queued"),
        (status = 503, description = "Store unavailable"),
    ),
    tag= "register"
)]
#[instrument(skip(state))]
pub async fn register(
    state: Extension<AuthState>,
    payload: Option<Json<Credentials>>,
) -> Result<impl IntoResponse, AuthError> {
    let credentials = required(payload)?;

    state
        .accounts()
        .register(&credentials.email, &credentials.password)
        .await?;

    Ok((StatusCode::CREATED, Status::new("activation link sent")))
}

#[cfg(test)]
mod tests {
    use crate::keyward::handlers::test_support::{app, json_body, post_json};
    use anyhow::Result;
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn register_returns_created_and_queues_link() -> Result<()> {
        let (app, mut queue) = app();
        let response = app
            .oneshot(post_json(
                "/register",
                &json!({"email": "alice@x.com", "password": "pw1"}),
            )?)
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            json_body(response).await?,
            json!({"status": "activation link sent"})
        );
        assert!(queue.try_recv().is_some());
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_registration_is_bad_request() -> Result<()> {
        let (app, _queue) = app();
        let body = json!({"email": "alice@x.com", "password": "pw1"});
        let first = app.clone().oneshot(post_json("/register", &body)?).await?;
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app.oneshot(post_json("/register", &body)?).await?;
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
        let body = json_body(second).await?;
        assert_eq!(body["error"], "email already exists");
        assert_eq!(body["retryable"], false);
        Ok(())
    }

    #[tokio::test]
    async fn missing_payload_is_bad_request() -> Result<()> {
        let (app, _queue) = app();
        let response = app
            .oneshot(post_json("/register", &json!({"email": "alice@x.com"}))?)
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
