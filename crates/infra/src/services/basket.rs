//! Basket reconciliation: signed quantity changes against live stock.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use shopfront_basket::{BasketChange, BasketEntry, BasketKey, BasketLine, QuantityDelta, check_stock};
use shopfront_core::{ProductId, UserId};

use super::{ServiceError, UserLocks};
use crate::store::{BasketStore, CatalogStore};

/// What an `apply_delta` call did to the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// The line now holds this quantity.
    Updated(u32),
    /// The line no longer exists.
    Removed,
}

pub struct BasketReconciler {
    catalog: Arc<dyn CatalogStore>,
    baskets: Arc<dyn BasketStore>,
    locks: Arc<UserLocks>,
}

impl BasketReconciler {
    pub fn new(catalog: Arc<dyn CatalogStore>, baskets: Arc<dyn BasketStore>, locks: Arc<UserLocks>) -> Self {
        Self {
            catalog,
            baskets,
            locks,
        }
    }

    /// Add `delta` units of a product to the user's basket (or take them off).
    ///
    /// Additions are checked against the product's current stock; nothing is
    /// reserved. A resulting quantity at or below zero removes the line.
    pub async fn apply_delta(
        &self,
        user_id: UserId,
        product_id: ProductId,
        delta: QuantityDelta,
    ) -> Result<DeltaOutcome, ServiceError> {
        let _guard = self.locks.lock(user_id).await;

        let product = self
            .catalog
            .get_product(product_id)
            .await?
            .ok_or(ServiceError::NotFound("product"))?;

        if let Err(err) = check_stock(&product, delta) {
            info!(
                user_id = %user_id,
                product_id = %product_id,
                delta = delta.get(),
                stock = product.stock,
                "basket addition refused: not enough stock"
            );
            return Err(err.into());
        }

        let key = BasketKey::new(user_id, product_id);
        let (line, created) = self.baskets.fetch_or_create(key).await?;

        let change = match line.apply(delta) {
            Ok(change) => change,
            Err(err) => {
                if created {
                    self.baskets.delete_line(key).await?;
                }
                return Err(err.into());
            }
        };

        let outcome = match change {
            BasketChange::Set(quantity) => {
                self.baskets.save_line(&BasketLine { key, quantity }).await?;
                DeltaOutcome::Updated(quantity)
            }
            BasketChange::Remove => {
                self.baskets.delete_line(key).await?;
                DeltaOutcome::Removed
            }
        };

        debug!(
            user_id = %user_id,
            product_id = %product_id,
            delta = delta.get(),
            created,
            outcome = ?outcome,
            "basket delta applied"
        );
        Ok(outcome)
    }

    /// Drop the user's line for a product.
    pub async fn remove_line(&self, user_id: UserId, product_id: ProductId) -> Result<(), ServiceError> {
        let _guard = self.locks.lock(user_id).await;

        let removed = self.baskets.delete_line(BasketKey::new(user_id, product_id)).await?;
        if !removed {
            return Err(ServiceError::NotFound("basket line"));
        }

        debug!(user_id = %user_id, product_id = %product_id, "basket line removed");
        Ok(())
    }

    /// The user's basket, ordered by product name.
    pub async fn view_basket(&self, user_id: UserId, today: NaiveDate) -> Result<Vec<BasketEntry>, ServiceError> {
        let lines = self.baskets.list_lines(user_id).await?;

        let mut entries = Vec::with_capacity(lines.len());
        for line in lines.iter().filter(|l| l.quantity > 0) {
            let Some(product) = self.catalog.get_product(line.key.product_id).await? else {
                warn!(user_id = %user_id, product_id = %line.key.product_id, "basket line for unknown product");
                continue;
            };
            let discount = match product.discount_id {
                Some(id) => self.catalog.get_discount(id).await?,
                None => None,
            };
            entries.push(BasketEntry::project(line, &product, discount.as_ref(), today));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.product_id.cmp(&b.product_id)));
        Ok(entries)
    }
}
