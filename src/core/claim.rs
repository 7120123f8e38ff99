//! Claim business logic - Records claims and lists claimants.
//!
//! Claims are append-only rows. Uniqueness of (`user_id`, `coupon_name`) is left to the
//! datastore's unique index; a violation is translated into [`Error::AlreadyClaimed`] here so
//! callers never see a raw constraint error.

use std::collections::HashSet;

use crate::{
    entities::{Claim, claim},
    errors::{Error, Result},
};
use sea_orm::{PaginatorTrait, QueryOrder, QuerySelect, Set, SqlErr, prelude::*};
use tracing::debug;

/// Inserts a claim for `user_id` on `coupon_name`.
///
/// Intended to run inside the claim transaction, after the coupon row has been locked.
///
/// # Errors
/// - [`Error::AlreadyClaimed`] if the user already holds a claim on this coupon
/// - [`Error::CouponNotFound`] if the coupon does not exist (foreign key violation)
/// - any other datastore error, which is transient
pub async fn insert_claim<C>(txn: &C, user_id: &str, coupon_name: &str) -> Result<claim::Model>
where
    C: ConnectionTrait,
{
    let claim = claim::ActiveModel {
        user_id: Set(user_id.to_string()),
        coupon_name: Set(coupon_name.to_string()),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };

    match claim.insert(txn).await {
        Ok(model) => Ok(model),
        Err(e) => match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                debug!(user = %user_id, coupon = %coupon_name, "Duplicate claim rejected");
                Err(Error::AlreadyClaimed {
                    user_id: user_id.to_string(),
                    coupon_name: coupon_name.to_string(),
                })
            }
            Some(SqlErr::ForeignKeyConstraintViolation(_)) => Err(Error::CouponNotFound {
                name: coupon_name.to_string(),
            }),
            _ => Err(e.into()),
        },
    }
}

/// Lists the users holding a claim on a coupon, oldest claim first.
///
/// Returns an empty vector when nobody has claimed the coupon (or it does not exist).
pub async fn list_claimants_by_coupon<C>(db: &C, coupon_name: &str) -> Result<Vec<String>>
where
    C: ConnectionTrait,
{
    let user_ids: Vec<String> = Claim::find()
        .select_only()
        .column(claim::Column::UserId)
        .filter(claim::Column::CouponName.eq(coupon_name))
        .order_by_asc(claim::Column::CreatedAt)
        .order_by_asc(claim::Column::Id)
        .into_tuple()
        .all(db)
        .await?;

    let mut seen = HashSet::with_capacity(user_ids.len());
    Ok(user_ids
        .into_iter()
        .filter(|user_id| seen.insert(user_id.clone()))
        .collect())
}

/// Counts the claims recorded against a coupon.
pub async fn count_claims_for_coupon<C>(db: &C, coupon_name: &str) -> Result<u64>
where
    C: ConnectionTrait,
{
    Claim::find()
        .filter(claim::Column::CouponName.eq(coupon_name))
        .count(db)
        .await
        .map_err(Into::into)
}
