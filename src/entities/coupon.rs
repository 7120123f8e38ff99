//! Coupon entity - A named, limited-stock coupon.
//!
//! The name is the primary key. `total_amount` is fixed at creation and
//! `remaining_amount` only ever moves down, one unit per successful claim.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Coupon database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    /// Unique, immutable coupon name (e.g., "PROMO")
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    /// Stock the coupon was created with
    pub total_amount: i64,
    /// Units not yet claimed, always within `0..=total_amount`
    pub remaining_amount: i64,
    /// When the coupon was created
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Number of units already claimed.
    #[must_use]
    pub const fn claimed_amount(&self) -> i64 {
        self.total_amount - self.remaining_amount
    }
}

/// Defines relationships between Coupon and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One coupon has many claims
    #[sea_orm(has_many = "super::claim::Entity")]
    Claims,
}

impl Related<super::claim::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Claims.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
