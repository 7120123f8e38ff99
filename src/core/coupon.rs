//! Coupon business logic - Handles all coupon record operations.
//!
//! Provides functions for creating coupons, looking them up, locking a coupon row for the
//! rest of a transaction, and taking one unit of stock. Every function is generic over
//! [`ConnectionTrait`] so it runs equally on a pooled connection or inside a transaction.

use crate::{
    entities::{Coupon, coupon},
    errors::{Error, Result},
};
use sea_orm::{DatabaseBackend, QuerySelect, Set, SqlErr, prelude::*, sea_query::Expr};
use tracing::debug;

/// Creates a new coupon with `remaining_amount == total_amount`.
///
/// Fails with [`Error::InvalidAmount`] if `total_amount` is not positive and with
/// [`Error::CouponExists`] if a coupon with this name already exists. The primary key on
/// `name` makes the datastore the arbiter of duplicates, so two concurrent creates cannot both
/// succeed.
pub async fn create_coupon<C>(db: &C, name: &str, total_amount: i64) -> Result<coupon::Model>
where
    C: ConnectionTrait,
{
    if total_amount <= 0 {
        return Err(Error::InvalidAmount {
            amount: total_amount,
        });
    }

    let coupon = coupon::ActiveModel {
        name: Set(name.to_string()),
        total_amount: Set(total_amount),
        remaining_amount: Set(total_amount),
        created_at: Set(chrono::Utc::now()),
    };

    match coupon.insert(db).await {
        Ok(model) => Ok(model),
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            debug!(coupon = %name, "Coupon name already taken");
            Err(Error::CouponExists {
                name: name.to_string(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Finds a coupon by name without taking any lock.
pub async fn get_coupon_by_name<C>(db: &C, name: &str) -> Result<Option<coupon::Model>>
where
    C: ConnectionTrait,
{
    Coupon::find_by_id(name.to_string())
        .one(db)
        .await
        .map_err(Into::into)
}

/// Reads a coupon while taking an exclusive lock on it for the rest of `txn`.
///
/// Any other transaction asking for the same lock waits until `txn` commits or rolls back.
/// On backends with row locks this is `SELECT ... FOR UPDATE`. SQLite has no row locks, so a
/// no-op write on the row takes the database write lock instead; it is held just as long.
///
/// Returns `None` if the coupon does not exist; no lock is held in that case on row-locking
/// backends.
pub async fn find_coupon_for_update<C>(txn: &C, name: &str) -> Result<Option<coupon::Model>>
where
    C: ConnectionTrait,
{
    let query = Coupon::find_by_id(name.to_string());

    let coupon = match txn.get_database_backend() {
        DatabaseBackend::Sqlite => {
            Coupon::update_many()
                .col_expr(
                    coupon::Column::RemainingAmount,
                    Expr::col(coupon::Column::RemainingAmount).into(),
                )
                .filter(coupon::Column::Name.eq(name))
                .exec(txn)
                .await?;
            query.one(txn).await?
        }
        _ => query.lock_exclusive().one(txn).await?,
    };

    Ok(coupon)
}

/// Takes exactly one unit of stock from a coupon and returns the updated row.
///
/// Must run inside the transaction that holds the lock from [`find_coupon_for_update`]. The
/// `remaining_amount > 0` guard is part of the UPDATE itself, and the table's CHECK constraint
/// rejects a negative value regardless.
pub async fn decrement_stock<C>(txn: &C, name: &str) -> Result<coupon::Model>
where
    C: ConnectionTrait,
{
    let result = Coupon::update_many()
        .col_expr(
            coupon::Column::RemainingAmount,
            Expr::col(coupon::Column::RemainingAmount).sub(1),
        )
        .filter(coupon::Column::Name.eq(name))
        .filter(coupon::Column::RemainingAmount.gt(0))
        .exec(txn)
        .await?;

    let coupon = get_coupon_by_name(txn, name)
        .await?
        .ok_or_else(|| Error::CouponNotFound {
            name: name.to_string(),
        })?;

    if result.rows_affected == 0 {
        return Err(Error::NoStock {
            name: name.to_string(),
        });
    }

    Ok(coupon)
}
