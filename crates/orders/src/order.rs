use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfront_basket::BasketLine;
use shopfront_catalog::{Discount, Product, Promocode};
use shopfront_core::{DomainError, DomainResult, Entity, OrderId, ProductId, UserId};

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Placed,
}

/// Order line: product, quantity, unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Price in smallest currency unit, after the product discount.
    pub unit_price: u64,
}

impl OrderLine {
    pub fn amount(&self) -> u64 {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }
}

/// A basket line together with the catalog data needed to price it.
#[derive(Debug, Clone)]
pub struct CheckoutItem {
    pub line: BasketLine,
    pub product: Product,
    pub discount: Option<Discount>,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub promocode: Option<String>,
    /// Sum of line amounts, before the promocode.
    pub subtotal: u64,
    pub total: u64,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Price the user's basket into an order.
    ///
    /// # Errors
    /// - `Validation` when the basket is empty, a line belongs to another user,
    ///   or the promocode has expired.
    /// - `StockInsufficient` when any line asks for more than is on stock.
    pub fn from_basket(
        user_id: UserId,
        items: &[CheckoutItem],
        promocode: Option<&Promocode>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation("basket is empty"));
        }

        let today = now.date_naive();
        if let Some(code) = promocode {
            if !code.is_valid(today) {
                return Err(DomainError::validation(format!("promocode '{}' has expired", code.name)));
            }
        }

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            if item.line.key.user_id != user_id {
                return Err(DomainError::validation("basket line belongs to another user"));
            }
            if item.line.key.product_id != item.product.id {
                return Err(DomainError::validation("basket line does not match its product"));
            }
            item.product.ensure_available(u64::from(item.line.quantity))?;

            lines.push(OrderLine {
                product_id: item.product.id,
                quantity: item.line.quantity,
                unit_price: item.product.unit_price(item.discount.as_ref(), today),
            });
        }

        let subtotal = lines.iter().fold(0u64, |acc, l| acc.saturating_add(l.amount()));
        let total = match promocode {
            Some(code) => code.percent.reduce(subtotal),
            None => subtotal,
        };

        Ok(Self {
            id: OrderId::new(),
            user_id,
            status: OrderStatus::Placed,
            lines,
            promocode: promocode.map(|c| c.name.clone()),
            subtotal,
            total,
            created_at: now,
        })
    }

    /// Units to take off each product's stock when this order is committed.
    pub fn stock_decrements(&self) -> impl Iterator<Item = (ProductId, u32)> + '_ {
        self.lines.iter().map(|l| (l.product_id, l.quantity))
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use shopfront_basket::BasketKey;
    use shopfront_catalog::Percent;
    use shopfront_core::{CategoryId, DiscountId, ProducerId, PromocodeId};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn product(price: u64, stock: u32) -> Product {
        Product::new("Lamp", "LM-2", price, stock, CategoryId::new(), ProducerId::new()).unwrap()
    }

    fn item(user_id: UserId, product: Product, quantity: u32, discount: Option<Discount>) -> CheckoutItem {
        CheckoutItem {
            line: BasketLine {
                key: BasketKey::new(user_id, product.id),
                quantity,
            },
            product,
            discount,
        }
    }

    fn promocode(percent: u8, expire_date: NaiveDate) -> Promocode {
        Promocode {
            id: PromocodeId::new(),
            name: "SAVE".to_string(),
            percent: Percent::new(percent).unwrap(),
            expire_date,
        }
    }

    #[test]
    fn empty_basket_is_rejected() {
        let err = Order::from_basket(UserId::new(), &[], None, now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn prices_lines_with_active_discount() {
        let user = UserId::new();
        let discount = Discount {
            id: DiscountId::new(),
            name: "spring".to_string(),
            percent: Percent::new(10).unwrap(),
            expire_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
        };
        let discounted = product(1_000, 10).with_discount(discount.id);
        let plain = product(250, 10);

        let order = Order::from_basket(
            user,
            &[
                item(user, discounted, 2, Some(discount)),
                item(user, plain, 4, None),
            ],
            None,
            now(),
        )
        .unwrap();

        assert_eq!(order.status, OrderStatus::Placed);
        assert_eq!(order.lines[0].unit_price, 900);
        assert_eq!(order.lines[1].unit_price, 250);
        assert_eq!(order.subtotal, 2 * 900 + 4 * 250);
        assert_eq!(order.total, order.subtotal);
    }

    #[test]
    fn promocode_reduces_the_total() {
        let user = UserId::new();
        let code = promocode(25, NaiveDate::from_ymd_opt(2026, 12, 31).unwrap());
        let order = Order::from_basket(user, &[item(user, product(1_000, 5), 3, None)], Some(&code), now()).unwrap();

        assert_eq!(order.subtotal, 3_000);
        assert_eq!(order.total, 2_250);
        assert_eq!(order.promocode.as_deref(), Some("SAVE"));
    }

    #[test]
    fn expired_promocode_is_rejected() {
        let user = UserId::new();
        let code = promocode(25, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        let err = Order::from_basket(user, &[item(user, product(1_000, 5), 1, None)], Some(&code), now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn line_above_stock_is_rejected() {
        let user = UserId::new();
        let err = Order::from_basket(user, &[item(user, product(100, 2), 3, None)], None, now()).unwrap_err();
        assert!(matches!(
            err,
            DomainError::StockInsufficient {
                requested: 3,
                available: 2,
                ..
            }
        ));
    }

    #[test]
    fn foreign_lines_are_rejected() {
        let user = UserId::new();
        let err = Order::from_basket(user, &[item(UserId::new(), product(100, 2), 1, None)], None, now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn stock_decrements_follow_lines() {
        let user = UserId::new();
        let p = product(100, 9);
        let pid = p.id;
        let order = Order::from_basket(user, &[item(user, p, 4, None)], None, now()).unwrap();
        assert_eq!(order.stock_decrements().collect::<Vec<_>>(), vec![(pid, 4)]);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: totals never exceed subtotals and subtotals equal the sum of lines.
            #[test]
            fn totals_are_consistent(
                prices in proptest::collection::vec(0u64..100_000, 1..8),
                qty in 1u32..50,
                pct in 0u8..=100,
            ) {
                let user = UserId::new();
                let items: Vec<_> = prices
                    .iter()
                    .map(|p| item(user, product(*p, 1_000), qty, None))
                    .collect();
                let code = promocode(pct, NaiveDate::from_ymd_opt(2030, 1, 1).unwrap());

                let order = Order::from_basket(user, &items, Some(&code), now()).unwrap();
                let expected: u64 = prices.iter().map(|p| p * u64::from(qty)).sum();

                prop_assert_eq!(order.subtotal, expected);
                prop_assert!(order.total <= order.subtotal);
            }
        }
    }
}
