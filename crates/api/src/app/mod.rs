//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store, service and task worker wiring
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use shopfront_auth::Hs256JwtValidator;
use shopfront_infra::config::AppConfig;
use shopfront_infra::tasks::TaskWorkerHandle;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router and start the task worker (used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<(Router, TaskWorkerHandle)> {
    let (services, worker) = services::build_services(config).await?;
    Ok((router(services, &config.jwt_secret), worker))
}

/// Routes over already-built services.
pub fn router(services: Arc<services::AppServices>, jwt_secret: &str) -> Router {
    let jwt = Arc::new(Hs256JwtValidator::new(jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let public = routes::public_router().layer(Extension(services.clone()));

    // Protected routes: require a valid bearer token.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(public)
        .merge(protected)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::log_request)))
}
