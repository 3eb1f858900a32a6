//! Orders domain module.
//!
//! Turns a user's basket into a priced order. Pure decision logic; committing
//! the order (stock decrement, basket clearing) is done by the store.

pub mod order;

pub use order::{CheckoutItem, Order, OrderLine, OrderStatus};
