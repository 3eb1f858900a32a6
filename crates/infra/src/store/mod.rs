//! Persistence traits and their backends.
//!
//! Every trait is object safe so services can hold `Arc<dyn ...>` and stay
//! agnostic of the backend. `InMemoryShopStore` is the dev/test backend;
//! `PostgresShopStore` is compiled with the `postgres` feature.

use async_trait::async_trait;

use shopfront_auth::User;
use shopfront_basket::{BasketKey, BasketLine};
use shopfront_catalog::{Category, Discount, Producer, Product, Promocode};
use shopfront_core::{CategoryId, DiscountId, DomainError, OrderId, ProducerId, ProductId, UserId};
use shopfront_orders::Order;

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::{InMemoryShopStore, StoreStats};
#[cfg(feature = "postgres")]
pub use postgres::PostgresShopStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    StockInsufficient {
        product_id: ProductId,
        requested: u64,
        available: u32,
    },
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound(what) => StoreError::NotFound(what),
            DomainError::Conflict(msg) => StoreError::Conflict(msg),
            DomainError::StockInsufficient {
                product_id,
                requested,
                available,
            } => StoreError::StockInsufficient {
                product_id,
                requested,
                available,
            },
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Which products a listing should include.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductFilter {
    All,
    Category(CategoryId),
    Producer(ProducerId),
    Discount(DiscountId),
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        match self {
            ProductFilter::All => true,
            ProductFilter::Category(id) => product.category_id == *id,
            ProductFilter::Producer(id) => product.producer_id == *id,
            ProductFilter::Discount(id) => product.discount_id == Some(*id),
        }
    }
}

/// Read access to the product catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>>;
    /// Products matching `filter`, ordered by name.
    async fn list_products(&self, filter: ProductFilter) -> StoreResult<Vec<Product>>;
    async fn get_category(&self, id: CategoryId) -> StoreResult<Option<Category>>;
    async fn list_categories(&self) -> StoreResult<Vec<Category>>;
    async fn get_producer(&self, id: ProducerId) -> StoreResult<Option<Producer>>;
    async fn list_producers(&self) -> StoreResult<Vec<Producer>>;
    async fn get_discount(&self, id: DiscountId) -> StoreResult<Option<Discount>>;
    async fn list_discounts(&self) -> StoreResult<Vec<Discount>>;
    async fn list_promocodes(&self) -> StoreResult<Vec<Promocode>>;
    /// Case-insensitive lookup by the code the customer typed.
    async fn find_promocode(&self, code: &str) -> StoreResult<Option<Promocode>>;
}

/// Basket line persistence keyed by (user, product).
#[async_trait]
pub trait BasketStore: Send + Sync {
    /// Return the stored line, or atomically create an empty one.
    ///
    /// The flag is `true` when the line was created by this call.
    async fn fetch_or_create(&self, key: BasketKey) -> StoreResult<(BasketLine, bool)>;
    async fn get_line(&self, key: BasketKey) -> StoreResult<Option<BasketLine>>;
    async fn save_line(&self, line: &BasketLine) -> StoreResult<()>;
    /// Delete a line. Returns whether a line was actually removed.
    async fn delete_line(&self, key: BasketKey) -> StoreResult<bool>;
    async fn list_lines(&self, user_id: UserId) -> StoreResult<Vec<BasketLine>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Fails with `Conflict` when the email is taken.
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Commit an order in one step: re-check and decrement stock for every
    /// line, store the order, and drop the ordered products from the user's
    /// basket. Nothing changes when any step fails.
    async fn place_order(&self, order: &Order) -> StoreResult<()>;
    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>>;
    async fn list_orders(&self, user_id: UserId) -> StoreResult<Vec<Order>>;
}
