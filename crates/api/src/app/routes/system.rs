use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use shopfront_infra::tasks::PRODUCTS_STATISTIC;

use crate::app::services::AppServices;
use crate::context::UserContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(user): Extension<UserContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "user_id": user.user_id().to_string(),
        "email": user.email(),
    }))
}

/// Queue a catalog statistics run; the result only shows up in the logs.
pub async fn statistics(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
) -> impl IntoResponse {
    services.tasks.enqueue(PRODUCTS_STATISTIC, serde_json::json!({}));
    tracing::debug!(user_id = %user.user_id(), "statistics requested");

    Json(serde_json::json!({ "status": "queued" }))
}
