//! Entity module - Contains the SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod claim;
pub mod coupon;

// Re-export specific types to avoid conflicts
pub use claim::{Column as ClaimColumn, Entity as Claim, Model as ClaimModel};
pub use coupon::{Column as CouponColumn, Entity as Coupon, Model as CouponModel};
