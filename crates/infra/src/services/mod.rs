//! Application services: the operations the HTTP layer calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use shopfront_core::{DomainError, ProductId, UserId};

use crate::store::StoreError;

pub mod accounts;
pub mod basket;
pub mod orders;

pub use accounts::AccountService;
pub use basket::BasketReconciler;
pub use orders::OrderService;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("not enough products on a stock (product {product_id}: requested {requested}, available {available})")]
    StockInsufficient {
        product_id: ProductId,
        requested: u64,
        available: u32,
    },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store error: {0}")]
    Store(String),
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::NotFound(what) => ServiceError::NotFound(what),
            DomainError::StockInsufficient {
                product_id,
                requested,
                available,
            } => ServiceError::StockInsufficient {
                product_id,
                requested,
                available,
            },
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::StockInsufficient {
                product_id,
                requested,
                available,
            } => ServiceError::StockInsufficient {
                product_id,
                requested,
                available,
            },
            StoreError::Backend(msg) => ServiceError::Store(msg),
        }
    }
}

const PRUNE_THRESHOLD: usize = 1024;

/// In-process async locks keyed by user.
///
/// Basket updates and order placement for the same user run one at a time;
/// different users never wait on each other.
#[derive(Debug, Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = match self.inner.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            if map.len() >= PRUNE_THRESHOLD {
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            map.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of users with a lock entry (idle entries are pruned lazily).
    pub fn tracked(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn domain_errors_map_onto_service_errors() {
        assert_eq!(
            ServiceError::from(DomainError::validation("bad")),
            ServiceError::Validation("bad".to_string())
        );
        assert_eq!(ServiceError::from(DomainError::not_found("product")), ServiceError::NotFound("product"));
        assert_eq!(
            ServiceError::from(StoreError::backend("down")),
            ServiceError::Store("down".to_string())
        );
    }

    #[tokio::test]
    async fn same_user_is_serialized() {
        let locks = Arc::new(UserLocks::new());
        let user = UserId::new();

        let guard = locks.lock(user).await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(user).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn different_users_do_not_block_each_other() {
        let locks = UserLocks::new();
        let _first = locks.lock(UserId::new()).await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock(UserId::new())).await;
        assert!(second.is_ok());
        assert_eq!(locks.tracked(), 2);
    }
}
