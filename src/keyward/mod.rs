#![allow(clippy::needless_for_each)]

use crate::auth::AuthState;
use anyhow::Result;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request},
    routing::{get, post},
    Extension, Router,
};
use std::future::Future;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::register::register,
        handlers::activate::activate,
        handlers::login::login,
        handlers::refresh::refresh,
        handlers::logout::logout,
        handlers::promote::promote,
        handlers::validate::validate,
    ),
    components(
        schemas(
            handlers::health::Health,
            handlers::Credentials,
            handlers::Status,
            handlers::RefreshRequest,
            handlers::promote::Promotion,
            handlers::validate::ValidateRequest,
            handlers::validate::ValidateResponse,
            crate::auth::TokenPair,
        )
    ),
    tags(
        (name = "keyward", description = "Account activation and session tokens"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Application routes without the listener, shared by the server and tests.
pub fn router(state: AuthState) -> Router {
    let cors = CorsLayer::new()
        // allow `GET` and `POST` when accessing the resource
        .allow_methods([Method::GET, Method::POST])
        // allow requests from any origin
        .allow_origin(Any);

    Router::new()
        .route("/register", post(handlers::register))
        .route("/links/:code", get(handlers::activate))
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh))
        .route("/logout", post(handlers::logout))
        .route("/promote", post(handlers::promote))
        .route("/validate", post(handlers::validate))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors),
        )
        .route("/health", get(handlers::health).options(handlers::health))
        .layer(Extension(state))
}

/// Serve the API until `shutdown` resolves.
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails
pub async fn new<F>(port: u16, state: AuthState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let method = request.method().as_str();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    info_span!("http.request", method, path, request_id)
}
