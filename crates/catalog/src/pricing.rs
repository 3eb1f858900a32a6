//! Price reductions: per-product discounts and per-order promocodes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use shopfront_core::{DiscountId, DomainError, DomainResult, Entity, PromocodeId};

/// A whole-number percentage in `0..=100`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Percent(u8);

impl Percent {
    pub const ZERO: Percent = Percent(0);

    pub fn new(value: u8) -> DomainResult<Self> {
        if value > 100 {
            return Err(DomainError::validation(format!(
                "percent must be between 0 and 100 (got {value})"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Price after taking this percentage off, in minor units. The reduction
    /// itself is rounded down.
    pub fn reduce(self, amount: u64) -> u64 {
        let off = (u128::from(amount) * u128::from(self.0)) / 100;
        amount - off as u64
    }
}

impl TryFrom<u8> for Percent {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percent> for u8 {
    fn from(value: Percent) -> Self {
        value.0
    }
}

impl core::fmt::Display for Percent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Discount attached to one or more products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub id: DiscountId,
    pub name: String,
    pub percent: Percent,
    /// Last day (inclusive) on which the discount applies.
    pub expire_date: NaiveDate,
}

impl Discount {
    pub fn is_active(&self, today: NaiveDate) -> bool {
        today <= self.expire_date
    }
}

impl Entity for Discount {
    type Id = DiscountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Code a customer can quote when placing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promocode {
    pub id: PromocodeId,
    pub name: String,
    pub percent: Percent,
    pub expire_date: NaiveDate,
}

impl Promocode {
    pub fn is_valid(&self, today: NaiveDate) -> bool {
        today <= self.expire_date
    }

    /// Case-insensitive match against what the customer typed.
    pub fn matches(&self, code: &str) -> bool {
        self.name.eq_ignore_ascii_case(code.trim())
    }
}

impl Entity for Promocode {
    type Id = PromocodeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
