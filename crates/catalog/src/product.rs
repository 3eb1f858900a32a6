use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use shopfront_core::{CategoryId, DiscountId, DomainError, DomainResult, Entity, ProducerId, ProductId};

use crate::pricing::Discount;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Producer {
    pub id: ProducerId,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A sellable catalog item.
///
/// `stock` is the number of units available for sale. It is unsigned, so the
/// "never negative" rule holds by construction; it only goes down when an
/// order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Article code printed on the label.
    pub articul: String,
    /// Price in smallest currency unit (e.g. cents).
    pub price: u64,
    pub stock: u32,
    pub category_id: CategoryId,
    pub producer_id: ProducerId,
    pub discount_id: Option<DiscountId>,
}

impl Product {
    /// Build a product, validating its descriptive fields.
    pub fn new(
        name: impl Into<String>,
        articul: impl Into<String>,
        price: u64,
        stock: u32,
        category_id: CategoryId,
        producer_id: ProducerId,
    ) -> DomainResult<Self> {
        let name = name.into();
        let articul = articul.into();

        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if articul.trim().is_empty() {
            return Err(DomainError::validation("articul cannot be empty"));
        }

        Ok(Self {
            id: ProductId::new(),
            name,
            description: String::new(),
            articul,
            price,
            stock,
            category_id,
            producer_id,
            discount_id: None,
        })
    }

    pub fn with_discount(mut self, discount_id: DiscountId) -> Self {
        self.discount_id = Some(discount_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check that `requested` units could be sold right now.
    ///
    /// This is a check against the raw stock count only; nothing is reserved.
    pub fn ensure_available(&self, requested: u64) -> DomainResult<()> {
        if u64::from(self.stock) < requested {
            return Err(DomainError::stock_insufficient(self.id, requested, self.stock));
        }
        Ok(())
    }

    /// Unit price after the product's discount, if that discount is active today.
    ///
    /// `discount` must be the discount referenced by `discount_id`; any other
    /// discount is ignored.
    pub fn unit_price(&self, discount: Option<&Discount>, today: NaiveDate) -> u64 {
        match discount {
            Some(d) if Some(d.id) == self.discount_id && d.is_active(today) => d.percent.reduce(self.price),
            _ => self.price,
        }
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::Percent;

    fn test_product(stock: u32) -> Product {
        Product::new("Kettle", "KT-100", 2_500, stock, CategoryId::new(), ProducerId::new()).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn new_rejects_blank_name_and_articul() {
        let err = Product::new("  ", "A-1", 1, 1, CategoryId::new(), ProducerId::new()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = Product::new("Kettle", "", 1, 1, CategoryId::new(), ProducerId::new()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn ensure_available_accepts_up_to_stock() {
        let p = test_product(5);
        assert!(p.ensure_available(0).is_ok());
        assert!(p.ensure_available(5).is_ok());
    }

    #[test]
    fn ensure_available_reports_requested_and_available() {
        let p = test_product(5);
        match p.ensure_available(6).unwrap_err() {
            DomainError::StockInsufficient {
                product_id,
                requested,
                available,
            } => {
                assert_eq!(product_id, p.id);
                assert_eq!(requested, 6);
                assert_eq!(available, 5);
            }
            other => panic!("expected StockInsufficient, got {other:?}"),
        }
    }

    #[test]
    fn unit_price_applies_only_the_linked_active_discount() {
        let discount = Discount {
            id: DiscountId::new(),
            name: "summer".to_string(),
            percent: Percent::new(20).unwrap(),
            expire_date: day(2026, 8, 31),
        };
        let unrelated = Discount {
            id: DiscountId::new(),
            ..discount.clone()
        };
        let p = test_product(1).with_discount(discount.id);

        assert_eq!(p.unit_price(Some(&discount), day(2026, 8, 1)), 2_000);
        assert_eq!(p.unit_price(Some(&discount), day(2026, 9, 1)), 2_500);
        assert_eq!(p.unit_price(Some(&unrelated), day(2026, 8, 1)), 2_500);
        assert_eq!(p.unit_price(None, day(2026, 8, 1)), 2_500);
    }
}
