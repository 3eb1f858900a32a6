//! Catalog domain module.
//!
//! Products, their categories and producers, and the price reductions
//! (product discounts, order promocodes) that apply to them. Pure data and
//! rules, no IO.

pub mod pricing;
pub mod product;

pub use pricing::{Discount, Percent, Promocode};
pub use product::{Category, Producer, Product};
