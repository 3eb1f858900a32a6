//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Shop records (products, users, basket lines, orders) are identified by a
/// strongly-typed key; two records with the same key are the same record even
/// when their attributes differ.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
