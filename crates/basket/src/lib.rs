//! Basket domain module.
//!
//! A basket is the set of [`BasketLine`]s a user holds, at most one per
//! product. This crate decides what a quantity change does to a line; storing
//! the result is the caller's job.

pub mod line;
pub mod view;

pub use line::{BasketChange, BasketKey, BasketLine, QuantityDelta, check_stock};
pub use view::BasketEntry;
