use serde::{Deserialize, Serialize};

use shopfront_catalog::Product;
use shopfront_core::{DomainError, DomainResult, Entity, ProductId, UserId};

/// Composite identity of a basket line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BasketKey {
    pub user_id: UserId,
    pub product_id: ProductId,
}

impl BasketKey {
    pub fn new(user_id: UserId, product_id: ProductId) -> Self {
        Self { user_id, product_id }
    }
}

/// Signed, non-zero change to a line's quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct QuantityDelta(i64);

impl QuantityDelta {
    pub fn new(value: i64) -> DomainResult<Self> {
        if value == 0 {
            return Err(DomainError::validation("number_of_items cannot be zero"));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }

    pub fn is_addition(self) -> bool {
        self.0 > 0
    }
}

impl TryFrom<i64> for QuantityDelta {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QuantityDelta> for i64 {
    fn from(value: QuantityDelta) -> Self {
        value.0
    }
}

/// What must happen to a stored line after a delta was applied.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BasketChange {
    /// Persist the line with this (strictly positive) quantity.
    Set(u32),
    /// The line must not exist any more.
    Remove,
}

/// A quantity of one product held for one user.
///
/// A stored line always has `quantity > 0`. A line that was just created by a
/// fetch-or-create starts at `0` and is either raised above zero or removed in
/// the same operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketLine {
    pub key: BasketKey,
    pub quantity: u32,
}

impl BasketLine {
    /// A line that does not hold anything yet.
    pub fn empty(key: BasketKey) -> Self {
        Self { key, quantity: 0 }
    }

    /// Decide the outcome of adding `delta` to this line.
    ///
    /// Results at or below zero remove the line; the quantity never goes
    /// negative.
    pub fn apply(&self, delta: QuantityDelta) -> DomainResult<BasketChange> {
        let next = i128::from(self.quantity) + i128::from(delta.get());
        if next <= 0 {
            return Ok(BasketChange::Remove);
        }

        u32::try_from(next)
            .map(BasketChange::Set)
            .map_err(|_| DomainError::validation("basket quantity is too large"))
    }
}

impl Entity for BasketLine {
    type Id = BasketKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }
}

/// Stock precondition for a basket change.
///
/// Only additions are checked, and only against the product's raw stock
/// count: the units already in the basket are not counted against it.
pub fn check_stock(product: &Product, delta: QuantityDelta) -> DomainResult<()> {
    if delta.is_addition() {
        product.ensure_available(delta.get().unsigned_abs())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopfront_core::{CategoryId, ProducerId};

    fn key() -> BasketKey {
        BasketKey::new(UserId::new(), ProductId::new())
    }

    fn line(quantity: u32) -> BasketLine {
        BasketLine { key: key(), quantity }
    }

    fn delta(v: i64) -> QuantityDelta {
        QuantityDelta::new(v).unwrap()
    }

    fn product(stock: u32) -> Product {
        Product::new("Mug", "MG-1", 700, stock, CategoryId::new(), ProducerId::new()).unwrap()
    }

    #[test]
    fn zero_delta_is_rejected() {
        assert!(matches!(QuantityDelta::new(0), Err(DomainError::Validation(_))));
    }

    #[test]
    fn new_line_takes_the_delta() {
        assert_eq!(BasketLine::empty(key()).apply(delta(3)).unwrap(), BasketChange::Set(3));
    }

    #[test]
    fn new_line_with_negative_delta_is_removed() {
        assert_eq!(BasketLine::empty(key()).apply(delta(-1)).unwrap(), BasketChange::Remove);
    }

    #[test]
    fn existing_line_accumulates() {
        assert_eq!(line(3).apply(delta(3)).unwrap(), BasketChange::Set(6));
        assert_eq!(line(3).apply(delta(-1)).unwrap(), BasketChange::Set(2));
    }

    #[test]
    fn reaching_zero_removes_the_line() {
        assert_eq!(line(2).apply(delta(-2)).unwrap(), BasketChange::Remove);
    }

    #[test]
    fn overshooting_below_zero_removes_the_line() {
        assert_eq!(line(2).apply(delta(-5)).unwrap(), BasketChange::Remove);
    }

    #[test]
    fn overflowing_quantity_is_a_validation_error() {
        let err = line(u32::MAX).apply(delta(1)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn stock_check_applies_to_additions_only() {
        let p = product(5);
        assert!(check_stock(&p, delta(5)).is_ok());
        assert!(matches!(
            check_stock(&p, delta(6)),
            Err(DomainError::StockInsufficient { requested: 6, available: 5, .. })
        ));
        assert!(check_stock(&p, delta(-100)).is_ok());
        assert!(check_stock(&product(0), delta(-1)).is_ok());
    }

    #[test]
    fn delta_deserializes_with_validation() {
        assert_eq!(i64::from(QuantityDelta::try_from(-4).unwrap()), -4);
        assert!(QuantityDelta::try_from(0).is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: a stored quantity is always strictly positive.
            #[test]
            fn set_is_always_positive(q in 0u32..10_000, d in -20_000i64..20_000) {
                prop_assume!(d != 0);
                match line(q).apply(delta(d)).unwrap() {
                    BasketChange::Set(n) => {
                        prop_assert!(n > 0);
                        prop_assert_eq!(i64::from(n), i64::from(q) + d);
                    }
                    BasketChange::Remove => prop_assert!(i64::from(q) + d <= 0),
                }
            }

            /// Property: adding then removing the same amount empties a fresh line.
            #[test]
            fn add_then_remove_round_trips_to_empty(d in 1i64..1_000_000) {
                let empty = BasketLine::empty(key());
                let q = match empty.apply(delta(d)).unwrap() {
                    BasketChange::Set(q) => q,
                    BasketChange::Remove => unreachable!("positive delta on empty line"),
                };
                let after = BasketLine { quantity: q, ..empty };
                prop_assert_eq!(after.apply(delta(-d)).unwrap(), BasketChange::Remove);
            }

            /// Property: removing at least the held quantity always removes the line.
            #[test]
            fn removing_everything_removes(q in 1u32..100_000, extra in 0i64..100_000) {
                let d = -(i64::from(q) + extra);
                prop_assert_eq!(line(q).apply(delta(d)).unwrap(), BasketChange::Remove);
            }

            /// Property: additions beyond stock are always refused.
            #[test]
            fn additions_beyond_stock_fail(stock in 0u32..1_000, over in 1i64..1_000) {
                let p = product(stock);
                let is_insufficient = matches!(
                    check_stock(&p, delta(i64::from(stock) + over)),
                    Err(DomainError::StockInsufficient { .. })
                );
                prop_assert!(is_insufficient);
            }
        }
    }
}
