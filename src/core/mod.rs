//! Core record operations over `SeaORM` connections and transactions.

/// Claim record operations
pub mod claim;
/// Coupon record operations
pub mod coupon;
