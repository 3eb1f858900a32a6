use axum::{
    Router,
    routing::{get, post},
};

pub mod accounts;
pub mod basket;
pub mod catalog;
pub mod orders;
pub mod system;

/// Router for endpoints anyone may call.
pub fn public_router() -> Router {
    Router::new()
        .merge(catalog::router())
        .route("/accounts/register", post(accounts::register))
}

/// Router for authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/statistics", get(system::statistics))
        .route("/discounts/:id/products", get(catalog::list_discount_products))
        .merge(basket::router())
        .merge(orders::router())
}
