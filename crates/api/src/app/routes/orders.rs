use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use chrono::Utc;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new().route("/orders", post(place_order).get(list_orders))
}

/// Place an order from the caller's basket.
///
/// The body is optional; an empty body means no promocode.
pub async fn place_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    body: Bytes,
) -> axum::response::Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        dto::PlaceOrderRequest::default()
    } else {
        match serde_json::from_slice::<dto::PlaceOrderRequest>(&body) {
            Ok(r) => r,
            Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", e.to_string()),
        }
    };

    match services
        .orders
        .place_order(user.user_id(), request.promocode.as_deref(), Utc::now())
        .await
    {
        Ok(order) => Json(order).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
) -> axum::response::Response {
    match services.orders.list_orders(user.user_id()).await {
        Ok(orders) => Json(dto::Items::from(orders)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
