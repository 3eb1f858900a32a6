use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use shopfront_core::UserId;
use shopfront_orders::{CheckoutItem, Order};

use super::{ServiceError, UserLocks};
use crate::store::{BasketStore, CatalogStore, OrderStore};

/// Turns a user's basket into a placed order.
pub struct OrderService {
    catalog: Arc<dyn CatalogStore>,
    baskets: Arc<dyn BasketStore>,
    orders: Arc<dyn OrderStore>,
    locks: Arc<UserLocks>,
}

impl OrderService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        baskets: Arc<dyn BasketStore>,
        orders: Arc<dyn OrderStore>,
        locks: Arc<UserLocks>,
    ) -> Self {
        Self {
            catalog,
            baskets,
            orders,
            locks,
        }
    }

    /// Price the basket, then commit the order and stock decrements together.
    pub async fn place_order(
        &self,
        user_id: UserId,
        promocode: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Order, ServiceError> {
        let _guard = self.locks.lock(user_id).await;

        let promocode = match promocode.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => Some(
                self.catalog
                    .find_promocode(code)
                    .await?
                    .ok_or_else(|| ServiceError::Validation(format!("unknown promocode '{code}'")))?,
            ),
            None => None,
        };

        let lines = self.baskets.list_lines(user_id).await?;
        let mut items = Vec::with_capacity(lines.len());
        for line in lines.into_iter().filter(|l| l.quantity > 0) {
            let product = self
                .catalog
                .get_product(line.key.product_id)
                .await?
                .ok_or(ServiceError::NotFound("product"))?;
            let discount = match product.discount_id {
                Some(id) => self.catalog.get_discount(id).await?,
                None => None,
            };
            items.push(CheckoutItem { line, product, discount });
        }

        let order = Order::from_basket(user_id, &items, promocode.as_ref(), now)?;
        self.orders.place_order(&order).await?;

        info!(
            order_id = %order.id,
            user_id = %user_id,
            lines = order.lines.len(),
            total = order.total,
            promocode = order.promocode.as_deref().unwrap_or(""),
            "order placed"
        );
        Ok(order)
    }

    pub async fn list_orders(&self, user_id: UserId) -> Result<Vec<Order>, ServiceError> {
        Ok(self.orders.list_orders(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::BasketReconciler;
    use crate::store::InMemoryShopStore;
    use chrono::{NaiveDate, TimeZone};
    use shopfront_basket::QuantityDelta;
    use shopfront_catalog::{Discount, Percent, Product, Promocode};
    use shopfront_core::{CategoryId, DiscountId, ProducerId, ProductId, PromocodeId};

    struct Fixture {
        store: Arc<InMemoryShopStore>,
        basket: BasketReconciler,
        orders: OrderService,
        user: UserId,
    }

    fn fixture() -> Fixture {
        let store = InMemoryShopStore::arc();
        let locks = Arc::new(UserLocks::new());
        Fixture {
            basket: BasketReconciler::new(store.clone(), store.clone(), locks.clone()),
            orders: OrderService::new(store.clone(), store.clone(), store.clone(), locks),
            store,
            user: UserId::new(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 2, 9, 30, 0).unwrap()
    }

    fn seed(store: &InMemoryShopStore, name: &str, price: u64, stock: u32) -> Product {
        let product = Product::new(name, "SKU", price, stock, CategoryId::new(), ProducerId::new()).unwrap();
        store.insert_product(product.clone());
        product
    }

    async fn add(f: &Fixture, product_id: ProductId, n: i64) {
        f.basket
            .apply_delta(f.user, product_id, QuantityDelta::new(n).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn places_order_and_clears_basket() {
        let f = fixture();
        let discount = Discount {
            id: DiscountId::new(),
            name: "april".to_string(),
            percent: Percent::new(50).unwrap(),
            expire_date: NaiveDate::from_ymd_opt(2026, 4, 30).unwrap(),
        };
        f.store.insert_discount(discount.clone());
        let half_price = Product::new("Teapot", "TP", 2_000, 4, CategoryId::new(), ProducerId::new())
            .unwrap()
            .with_discount(discount.id);
        f.store.insert_product(half_price.clone());
        let cups = seed(&f.store, "Cup", 300, 10);

        add(&f, half_price.id, 1).await;
        add(&f, cups.id, 4).await;

        let order = f.orders.place_order(f.user, None, now()).await.unwrap();
        assert_eq!(order.subtotal, 1_000 + 4 * 300);
        assert_eq!(order.total, order.subtotal);

        assert_eq!(f.store.get_product(half_price.id).await.unwrap().unwrap().stock, 3);
        assert_eq!(f.store.get_product(cups.id).await.unwrap().unwrap().stock, 6);
        assert!(f.store.list_lines(f.user).await.unwrap().is_empty());
        assert_eq!(f.orders.list_orders(f.user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn promocode_is_looked_up_case_insensitively() {
        let f = fixture();
        f.store.insert_promocode(Promocode {
            id: PromocodeId::new(),
            name: "SPRING10".to_string(),
            percent: Percent::new(10).unwrap(),
            expire_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
        });
        let p = seed(&f.store, "Vase", 1_000, 2);
        add(&f, p.id, 2).await;

        let order = f.orders.place_order(f.user, Some(" spring10 "), now()).await.unwrap();
        assert_eq!(order.total, 1_800);
        assert_eq!(order.promocode.as_deref(), Some("SPRING10"));
    }

    #[tokio::test]
    async fn unknown_promocode_is_rejected_without_side_effects() {
        let f = fixture();
        let p = seed(&f.store, "Vase", 1_000, 2);
        add(&f, p.id, 1).await;

        let err = f.orders.place_order(f.user, Some("NOPE"), now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(f.store.list_lines(f.user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_basket_is_rejected() {
        let f = fixture();
        let err = f.orders.place_order(f.user, None, now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn basket_above_stock_cannot_be_ordered() {
        let f = fixture();
        let p = seed(&f.store, "Chair", 5_000, 5);
        add(&f, p.id, 3).await;
        add(&f, p.id, 3).await;

        let err = f.orders.place_order(f.user, None, now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::StockInsufficient { requested: 6, available: 5, .. }));
        assert_eq!(f.store.get_product(p.id).await.unwrap().unwrap().stock, 5);
    }
}
