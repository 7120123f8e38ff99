//! Coupon query service - Coupon creation and the read path.
//!
//! Details are assembled from a non-locking coupon lookup and the claimant listing; reads
//! never wait on claim transactions.

use serde::Serialize;
use tracing::{info, instrument};

use crate::entities::CouponModel;
use crate::errors::{Error, Result};
use crate::store::{ClaimStore, CouponStore};

/// A coupon's current state together with the users who claimed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CouponDetails {
    /// Coupon name
    pub name: String,
    /// Stock the coupon was created with
    pub total_amount: i64,
    /// Units still available
    pub remaining_amount: i64,
    /// Users holding a claim, oldest first; empty when nobody claimed yet
    pub claimants: Vec<String>,
}

/// Creates coupons and reports on them.
#[derive(Clone)]
pub struct CouponQueryService<S> {
    store: S,
}

impl<S> CouponQueryService<S>
where
    S: CouponStore + ClaimStore,
{
    /// Creates a service reading from `store`.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates a coupon with `amount` units of stock.
    ///
    /// # Errors
    /// - [`Error::InvalidAmount`] if `amount` is not positive
    /// - [`Error::CouponExists`] if the name is taken; the existing coupon is left untouched
    #[instrument(skip(self))]
    pub async fn create_coupon(&self, name: &str, amount: i64) -> Result<CouponModel> {
        if amount <= 0 {
            return Err(Error::InvalidAmount { amount });
        }

        let coupon = self.store.create(name, amount).await?;
        info!(coupon = %coupon.name, amount, "Coupon created");
        Ok(coupon)
    }

    /// Returns the coupon's state and claimant list, or [`Error::CouponNotFound`].
    pub async fn get_details(&self, name: &str) -> Result<CouponDetails> {
        let coupon = self.store.get_by_name(name).await?;
        let claimants = self.store.list_claimants_by_coupon(name).await?;

        Ok(CouponDetails {
            name: coupon.name,
            total_amount: coupon.total_amount,
            remaining_amount: coupon.remaining_amount,
            claimants,
        })
    }
}
