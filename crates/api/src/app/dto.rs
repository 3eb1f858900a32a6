use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use shopfront_catalog::{Category, Discount, Producer, Product};
use shopfront_core::{CategoryId, ProducerId, ProductId};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct BasketDeltaRequest {
    pub product_id: String,
    pub number_of_items: i64,
}

#[derive(Debug, Deserialize)]
pub struct BasketRemoveRequest {
    pub product_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub promocode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
}

// -------------------------
// Response DTOs
// -------------------------

/// Envelope for list endpoints.
#[derive(Debug, Serialize)]
pub struct Items<T> {
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for Items<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

#[derive(Debug, Serialize)]
pub struct NamedRef<Id> {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct DiscountSummary {
    pub name: String,
    pub percent: u8,
    pub expire_date: NaiveDate,
}

/// A product with its category, producer and discount resolved.
#[derive(Debug, Serialize)]
pub struct ProductDetail {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub articul: String,
    pub price: u64,
    pub stock: u32,
    pub category: Option<NamedRef<CategoryId>>,
    pub producer: Option<NamedRef<ProducerId>>,
    pub discount: Option<DiscountSummary>,
}

impl ProductDetail {
    pub fn new(
        product: Product,
        category: Option<Category>,
        producer: Option<Producer>,
        discount: Option<Discount>,
    ) -> Self {
        Self {
            id: product.id,
            name: product.name,
            description: product.description,
            articul: product.articul,
            price: product.price,
            stock: product.stock,
            category: category.map(|c| NamedRef { id: c.id, name: c.name }),
            producer: producer.map(|p| NamedRef { id: p.id, name: p.name }),
            discount: discount.map(|d| DiscountSummary {
                name: d.name,
                percent: d.percent.value(),
                expire_date: d.expire_date,
            }),
        }
    }
}
