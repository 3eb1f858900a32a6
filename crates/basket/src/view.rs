use chrono::NaiveDate;
use serde::Serialize;

use shopfront_catalog::{Discount, Product};
use shopfront_core::ProductId;

use crate::line::BasketLine;

/// One row of a user's basket as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BasketEntry {
    pub product_id: ProductId,
    pub name: String,
    /// Catalog price before any discount, in minor units.
    pub price: u64,
    pub quantity: u32,
    pub discount_percent: Option<u8>,
    pub discount_expire_date: Option<NaiveDate>,
}

impl BasketEntry {
    /// Project a stored line with its product and the product's discount.
    ///
    /// Discount fields are filled only when the discount is the product's own
    /// and is still active on `today`.
    pub fn project(line: &BasketLine, product: &Product, discount: Option<&Discount>, today: NaiveDate) -> Self {
        let active = discount.filter(|d| Some(d.id) == product.discount_id && d.is_active(today));

        Self {
            product_id: product.id,
            name: product.name.clone(),
            price: product.price,
            quantity: line.quantity,
            discount_percent: active.map(|d| d.percent.value()),
            discount_expire_date: active.map(|d| d.expire_date),
        }
    }
}
