//! Infrastructure layer: configuration, storage, application services and
//! background tasks.

pub mod config;
pub mod services;
pub mod store;
pub mod tasks;

pub use config::{AppConfig, ConfigError};
pub use services::{AccountService, BasketReconciler, OrderService, ServiceError, UserLocks};
pub use store::{BasketStore, CatalogStore, InMemoryShopStore, OrderStore, StoreError, StoreResult, UserStore};
