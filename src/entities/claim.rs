//! Claim entity - Records that one user obtained one unit of one coupon.
//!
//! Claims are append-only. The pair (`user_id`, `coupon_name`) is unique; the
//! constraint itself is created alongside the table in `config::database`.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Claim database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "claims")]
pub struct Model {
    /// Unique identifier for the claim
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Identifier of the user holding the claim
    pub user_id: String,
    /// Name of the claimed coupon
    #[sea_orm(indexed)]
    pub coupon_name: String,
    /// When the claim was recorded
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Claim and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each claim belongs to one coupon
    #[sea_orm(
        belongs_to = "super::coupon::Entity",
        from = "Column::CouponName",
        to = "super::coupon::Column::Name"
    )]
    Coupon,
}

impl Related<super::coupon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Coupon.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
