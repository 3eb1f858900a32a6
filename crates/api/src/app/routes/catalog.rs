//! Read-only catalog endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
};

use shopfront_core::{CategoryId, DiscountId, ProducerId, ProductId};
use shopfront_infra::ServiceError;
use shopfront_infra::store::{ProductFilter, StoreError};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/categories", get(list_categories))
        .route("/categories/:id/products", get(list_category_products))
        .route("/producers", get(list_producers))
        .route("/producers/:id/products", get(list_producer_products))
        .route("/discounts", get(list_discounts))
        .route("/promocodes", get(list_promocodes))
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
}

fn store_error(e: StoreError) -> axum::response::Response {
    errors::service_error_to_response(e.into())
}

fn not_found(what: &'static str) -> axum::response::Response {
    errors::service_error_to_response(ServiceError::NotFound(what))
}

fn items<T: serde::Serialize>(items: Vec<T>) -> axum::response::Response {
    Json(dto::Items::from(items)).into_response()
}

pub async fn list_categories(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.catalog.list_categories().await {
        Ok(v) => items(v),
        Err(e) => store_error(e),
    }
}

pub async fn list_producers(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.catalog.list_producers().await {
        Ok(v) => items(v),
        Err(e) => store_error(e),
    }
}

pub async fn list_discounts(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.catalog.list_discounts().await {
        Ok(v) => items(v),
        Err(e) => store_error(e),
    }
}

pub async fn list_promocodes(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.catalog.list_promocodes().await {
        Ok(v) => items(v),
        Err(e) => store_error(e),
    }
}

pub async fn list_products(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.catalog.list_products(ProductFilter::All).await {
        Ok(v) => items(v),
        Err(e) => store_error(e),
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("product"),
    };

    match product_detail(&services, id).await {
        Ok(Some(detail)) => Json(detail).into_response(),
        Ok(None) => not_found("product"),
        Err(e) => store_error(e),
    }
}

async fn product_detail(services: &AppServices, id: ProductId) -> Result<Option<dto::ProductDetail>, StoreError> {
    let Some(product) = services.catalog.get_product(id).await? else {
        return Ok(None);
    };
    let category = services.catalog.get_category(product.category_id).await?;
    let producer = services.catalog.get_producer(product.producer_id).await?;
    let discount = match product.discount_id {
        Some(discount_id) => services.catalog.get_discount(discount_id).await?,
        None => None,
    };
    Ok(Some(dto::ProductDetail::new(product, category, producer, discount)))
}

pub async fn list_category_products(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: CategoryId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("category"),
    };

    match services.catalog.get_category(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("category"),
        Err(e) => return store_error(e),
    }
    match services.catalog.list_products(ProductFilter::Category(id)).await {
        Ok(v) => items(v),
        Err(e) => store_error(e),
    }
}

pub async fn list_producer_products(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProducerId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("producer"),
    };

    match services.catalog.get_producer(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("producer"),
        Err(e) => return store_error(e),
    }
    match services.catalog.list_products(ProductFilter::Producer(id)).await {
        Ok(v) => items(v),
        Err(e) => store_error(e),
    }
}

/// Products under a discount. Mounted on the authenticated router.
pub async fn list_discount_products(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: DiscountId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("discount"),
    };

    match services.catalog.get_discount(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("discount"),
        Err(e) => return store_error(e),
    }
    match services.catalog.list_products(ProductFilter::Discount(id)).await {
        Ok(v) => items(v),
        Err(e) => store_error(e),
    }
}
