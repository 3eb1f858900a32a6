use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use shopfront_auth::User;
use shopfront_basket::{BasketKey, BasketLine};
use shopfront_catalog::{Category, Discount, Producer, Product, Promocode};
use shopfront_core::{CategoryId, DiscountId, OrderId, ProducerId, ProductId, PromocodeId, UserId};
use shopfront_orders::Order;

use super::{BasketStore, CatalogStore, OrderStore, ProductFilter, StoreError, StoreResult, UserStore};

#[derive(Debug, Default)]
struct ShopState {
    categories: HashMap<CategoryId, Category>,
    producers: HashMap<ProducerId, Producer>,
    discounts: HashMap<DiscountId, Discount>,
    promocodes: HashMap<PromocodeId, Promocode>,
    products: HashMap<ProductId, Product>,
    users: HashMap<UserId, User>,
    basket: HashMap<BasketKey, BasketLine>,
    orders: HashMap<OrderId, Order>,
}

/// Snapshot of how often the store was touched through its traits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: u64,
    pub writes: u64,
}

impl StoreStats {
    pub fn total(&self) -> u64 {
        self.reads + self.writes
    }
}

/// In-memory backend for every store trait (dev/tests).
///
/// All data lives behind one `RwLock`, so multi-entity operations such as
/// order placement are atomic. Seeding helpers (`insert_*`) are not counted
/// in [`StoreStats`]; trait calls are.
#[derive(Debug, Default)]
pub struct InMemoryShopStore {
    state: RwLock<ShopState>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl InMemoryShopStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    pub fn insert_category(&self, category: Category) {
        if let Ok(mut state) = self.state.write() {
            state.categories.insert(category.id, category);
        }
    }

    pub fn insert_producer(&self, producer: Producer) {
        if let Ok(mut state) = self.state.write() {
            state.producers.insert(producer.id, producer);
        }
    }

    pub fn insert_discount(&self, discount: Discount) {
        if let Ok(mut state) = self.state.write() {
            state.discounts.insert(discount.id, discount);
        }
    }

    pub fn insert_promocode(&self, promocode: Promocode) {
        if let Ok(mut state) = self.state.write() {
            state.promocodes.insert(promocode.id, promocode);
        }
    }

    pub fn insert_product(&self, product: Product) {
        if let Ok(mut state) = self.state.write() {
            state.products.insert(product.id, product);
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, ShopState>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.state.read().map_err(|_| StoreError::backend("shop state lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, ShopState>> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.state.write().map_err(|_| StoreError::backend("shop state lock poisoned"))
    }
}

fn sorted_by<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl CatalogStore for InMemoryShopStore {
    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn list_products(&self, filter: ProductFilter) -> StoreResult<Vec<Product>> {
        let state = self.read()?;
        let products = state.products.values().filter(|p| filter.matches(p)).cloned().collect();
        Ok(sorted_by(products, |p: &Product| (p.name.clone(), p.id)))
    }

    async fn get_category(&self, id: CategoryId) -> StoreResult<Option<Category>> {
        Ok(self.read()?.categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let categories = self.read()?.categories.values().cloned().collect();
        Ok(sorted_by(categories, |c: &Category| c.name.clone()))
    }

    async fn get_producer(&self, id: ProducerId) -> StoreResult<Option<Producer>> {
        Ok(self.read()?.producers.get(&id).cloned())
    }

    async fn list_producers(&self) -> StoreResult<Vec<Producer>> {
        let producers = self.read()?.producers.values().cloned().collect();
        Ok(sorted_by(producers, |p: &Producer| p.name.clone()))
    }

    async fn get_discount(&self, id: DiscountId) -> StoreResult<Option<Discount>> {
        Ok(self.read()?.discounts.get(&id).cloned())
    }

    async fn list_discounts(&self) -> StoreResult<Vec<Discount>> {
        let discounts = self.read()?.discounts.values().cloned().collect();
        Ok(sorted_by(discounts, |d: &Discount| d.name.clone()))
    }

    async fn list_promocodes(&self) -> StoreResult<Vec<Promocode>> {
        let promocodes = self.read()?.promocodes.values().cloned().collect();
        Ok(sorted_by(promocodes, |p: &Promocode| p.name.clone()))
    }

    async fn find_promocode(&self, code: &str) -> StoreResult<Option<Promocode>> {
        Ok(self.read()?.promocodes.values().find(|p| p.matches(code)).cloned())
    }
}

#[async_trait]
impl BasketStore for InMemoryShopStore {
    async fn fetch_or_create(&self, key: BasketKey) -> StoreResult<(BasketLine, bool)> {
        let mut state = self.write()?;
        if let Some(line) = state.basket.get(&key) {
            return Ok((line.clone(), false));
        }
        let line = BasketLine::empty(key);
        state.basket.insert(key, line.clone());
        Ok((line, true))
    }

    async fn get_line(&self, key: BasketKey) -> StoreResult<Option<BasketLine>> {
        Ok(self.read()?.basket.get(&key).cloned())
    }

    async fn save_line(&self, line: &BasketLine) -> StoreResult<()> {
        self.write()?.basket.insert(line.key, line.clone());
        Ok(())
    }

    async fn delete_line(&self, key: BasketKey) -> StoreResult<bool> {
        Ok(self.write()?.basket.remove(&key).is_some())
    }

    async fn list_lines(&self, user_id: UserId) -> StoreResult<Vec<BasketLine>> {
        let state = self.read()?;
        let lines = state.basket.values().filter(|l| l.key.user_id == user_id).cloned().collect();
        Ok(sorted_by(lines, |l: &BasketLine| l.key))
    }
}

#[async_trait]
impl UserStore for InMemoryShopStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("user {} already exists", user.id)));
        }
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!("email {} is already registered", user.email)));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.values().find(|u| u.email == email).cloned())
    }
}

#[async_trait]
impl OrderStore for InMemoryShopStore {
    async fn place_order(&self, order: &Order) -> StoreResult<()> {
        let mut state = self.write()?;

        if state.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
        }

        // Validate every line before touching anything.
        for (product_id, quantity) in order.stock_decrements() {
            let product = state.products.get(&product_id).ok_or(StoreError::NotFound("product"))?;
            if product.stock < quantity {
                return Err(StoreError::StockInsufficient {
                    product_id,
                    requested: u64::from(quantity),
                    available: product.stock,
                });
            }
        }

        for (product_id, quantity) in order.stock_decrements() {
            if let Some(product) = state.products.get_mut(&product_id) {
                product.stock -= quantity;
            }
            state.basket.remove(&BasketKey::new(order.user_id, product_id));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.read()?.orders.get(&id).cloned())
    }

    async fn list_orders(&self, user_id: UserId) -> StoreResult<Vec<Order>> {
        let state = self.read()?;
        let orders = state.orders.values().filter(|o| o.user_id == user_id).cloned().collect();
        Ok(sorted_by(orders, |o: &Order| o.created_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shopfront_orders::{OrderLine, OrderStatus};

    fn seeded_product(store: &InMemoryShopStore, name: &str, stock: u32) -> Product {
        let product = Product::new(name, "ART-1", 1_000, stock, CategoryId::new(), ProducerId::new()).unwrap();
        store.insert_product(product.clone());
        product
    }

    fn order_for(user_id: UserId, lines: &[(ProductId, u32)]) -> Order {
        let lines: Vec<_> = lines
            .iter()
            .map(|(product_id, quantity)| OrderLine {
                product_id: *product_id,
                quantity: *quantity,
                unit_price: 1_000,
            })
            .collect();
        let subtotal = lines.iter().map(OrderLine::amount).sum();
        Order {
            id: OrderId::new(),
            user_id,
            status: OrderStatus::Placed,
            lines,
            promocode: None,
            subtotal,
            total: subtotal,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn fetch_or_create_reports_creation_once() {
        let store = InMemoryShopStore::new();
        let key = BasketKey::new(UserId::new(), ProductId::new());

        let (line, created) = store.fetch_or_create(key).await.unwrap();
        assert!(created);
        assert_eq!(line.quantity, 0);

        store.save_line(&BasketLine { key, quantity: 4 }).await.unwrap();
        let (line, created) = store.fetch_or_create(key).await.unwrap();
        assert!(!created);
        assert_eq!(line.quantity, 4);
    }

    #[tokio::test]
    async fn delete_line_reports_whether_it_existed() {
        let store = InMemoryShopStore::new();
        let key = BasketKey::new(UserId::new(), ProductId::new());
        store.save_line(&BasketLine { key, quantity: 1 }).await.unwrap();

        assert!(store.delete_line(key).await.unwrap());
        assert!(!store.delete_line(key).await.unwrap());
    }

    #[tokio::test]
    async fn lines_are_scoped_to_their_user() {
        let store = InMemoryShopStore::new();
        let alice = UserId::new();
        let bob = UserId::new();
        store.save_line(&BasketLine { key: BasketKey::new(alice, ProductId::new()), quantity: 1 }).await.unwrap();
        store.save_line(&BasketLine { key: BasketKey::new(bob, ProductId::new()), quantity: 2 }).await.unwrap();

        let lines = store.list_lines(alice).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].key.user_id, alice);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = InMemoryShopStore::new();
        let first = User::register("a@shop.test", Utc::now()).unwrap();
        let second = User::register("A@shop.test", Utc::now()).unwrap();

        store.insert_user(&first).await.unwrap();
        assert!(matches!(store.insert_user(&second).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.find_user_by_email("a@shop.test").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn place_order_decrements_stock_and_clears_ordered_lines() {
        let store = InMemoryShopStore::new();
        let user = UserId::new();
        let kettle = seeded_product(&store, "Kettle", 5);
        let mug = seeded_product(&store, "Mug", 5);
        store.save_line(&BasketLine { key: BasketKey::new(user, kettle.id), quantity: 2 }).await.unwrap();
        store.save_line(&BasketLine { key: BasketKey::new(user, mug.id), quantity: 1 }).await.unwrap();

        let order = order_for(user, &[(kettle.id, 2)]);
        store.place_order(&order).await.unwrap();

        assert_eq!(store.get_product(kettle.id).await.unwrap().unwrap().stock, 3);
        let remaining = store.list_lines(user).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key.product_id, mug.id);
        assert_eq!(store.list_orders(user).await.unwrap(), vec![order]);
    }

    #[tokio::test]
    async fn place_order_is_all_or_nothing() {
        let store = InMemoryShopStore::new();
        let user = UserId::new();
        let plenty = seeded_product(&store, "Plenty", 10);
        let scarce = seeded_product(&store, "Scarce", 1);

        let order = order_for(user, &[(plenty.id, 3), (scarce.id, 2)]);
        let err = store.place_order(&order).await.unwrap_err();

        assert!(matches!(err, StoreError::StockInsufficient { requested: 2, available: 1, .. }));
        assert_eq!(store.get_product(plenty.id).await.unwrap().unwrap().stock, 10);
        assert!(store.get_order(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stats_count_trait_access_but_not_seeding() {
        let store = InMemoryShopStore::new();
        let product = seeded_product(&store, "Lamp", 1);
        assert_eq!(store.stats(), StoreStats::default());

        store.get_product(product.id).await.unwrap();
        store.delete_line(BasketKey::new(UserId::new(), product.id)).await.unwrap();
        assert_eq!(store.stats(), StoreStats { reads: 1, writes: 1 });
    }
}
