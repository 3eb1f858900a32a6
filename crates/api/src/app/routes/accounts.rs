use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    response::IntoResponse,
};
use chrono::Utc;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Create an inactive account; the activation mail goes out in the background.
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RegisterRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services.accounts.register(&body.email, Utc::now()).await {
        Ok(user) => Json(serde_json::json!({
            "id": user.id.to_string(),
            "email": user.email,
            "is_active": user.is_active,
        }))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
