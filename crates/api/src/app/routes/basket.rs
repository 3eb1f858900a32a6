use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;

use shopfront_basket::QuantityDelta;
use shopfront_core::ProductId;
use shopfront_infra::services::basket::DeltaOutcome;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new().route("/basket", get(view_basket).post(update_basket).delete(remove_from_basket))
}

pub async fn view_basket(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
) -> axum::response::Response {
    let today = Utc::now().date_naive();
    match services.basket.view_basket(user.user_id(), today).await {
        Ok(products) => Json(serde_json::json!({ "products": products })).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Add `number_of_items` (negative to take items out) of a product.
pub async fn update_basket(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    body: Result<Json<dto::BasketDeltaRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let product_id: ProductId = match body.product_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("product"),
    };
    let delta = match QuantityDelta::new(body.number_of_items) {
        Ok(d) => d,
        Err(e) => return errors::service_error_to_response(e.into()),
    };

    match services.basket.apply_delta(user.user_id(), product_id, delta).await {
        Ok(outcome) => {
            let quantity = match outcome {
                DeltaOutcome::Updated(q) => q,
                DeltaOutcome::Removed => 0,
            };
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "product_id": product_id.to_string(),
                    "quantity": quantity,
                })),
            )
                .into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn remove_from_basket(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    body: Result<Json<dto::BasketRemoveRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let product_id: ProductId = match body.product_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("product"),
    };

    match services.basket.remove_line(user.user_id(), product_id).await {
        Ok(()) => Json(serde_json::json!({ "product_id": product_id.to_string() })).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
