//! Claim orchestration - The transactional protocol behind every claim.
//!
//! One claim attempt is one transaction:
//!
//! 1. begin
//! 2. lock the coupon row (absent: `CouponNotFound`)
//! 3. check the stock under the lock (empty: `NoStock`)
//! 4. insert the claim (duplicate: `AlreadyClaimed`)
//! 5. take one unit of stock
//! 6. commit (failure: transient, the whole attempt may be retried)
//!
//! The lock in step 2 serializes every claim on the same coupon, so the stock check in step 3
//! always sees the value left by the previous committed claim. The unique index behind step 4
//! is an independent guard against one user claiming twice. Any failure rolls the transaction
//! back; a transaction that is dropped mid-flight (deadline, panic) rolls back on its own.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::config::ClaimConfig;
use crate::entities::ClaimModel;
use crate::errors::{Error, ErrorKind, Result};
use crate::store::{ClaimStore, CouponStore, Datastore, StoreTransaction};

/// Pause before the first retry; grows linearly with the attempt number.
const RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// The five possible results of a claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaimOutcome {
    /// The claim was recorded and one unit of stock taken
    Success,
    /// No unit was left
    NoStock,
    /// The user already holds a claim on the coupon
    AlreadyClaimed,
    /// The coupon does not exist
    CouponNotFound,
    /// Infrastructure failure; nothing was recorded and the claim may be retried
    TransientFailure,
}

impl ClaimOutcome {
    /// Classifies the result of [`ClaimOrchestrator::claim`].
    #[must_use]
    pub const fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => Self::from_error(e),
        }
    }

    /// Classifies a claim error.
    #[must_use]
    pub const fn from_error(error: &Error) -> Self {
        match error.kind() {
            ErrorKind::NoStock => Self::NoStock,
            ErrorKind::AlreadyClaimed => Self::AlreadyClaimed,
            ErrorKind::NotFound => Self::CouponNotFound,
            // A claim never creates coupons, and its inputs arrive pre-validated
            ErrorKind::Conflict | ErrorKind::Invalid | ErrorKind::Transient => {
                Self::TransientFailure
            }
        }
    }
}

/// Runs the claim protocol against a store.
pub struct ClaimOrchestrator<S> {
    store: S,
    config: ClaimConfig,
}

impl<S> ClaimOrchestrator<S>
where
    S: CouponStore + ClaimStore,
{
    /// Creates an orchestrator with the given deadline and retry settings.
    #[must_use]
    pub const fn new(store: S, config: ClaimConfig) -> Self {
        Self { store, config }
    }

    /// Makes one claim attempt within the configured deadline.
    pub async fn claim(&self, user_id: &str, coupon_name: &str) -> Result<ClaimModel> {
        self.claim_within(user_id, coupon_name, self.config.timeout())
            .await
    }

    /// Makes one claim attempt that must finish within `deadline`.
    ///
    /// If the deadline passes while waiting for the coupon lock or for the commit, the
    /// in-flight transaction is dropped, which rolls it back and releases the lock, and
    /// [`Error::Timeout`] is returned.
    #[instrument(skip(self))]
    pub async fn claim_within(
        &self,
        user_id: &str,
        coupon_name: &str,
        deadline: Duration,
    ) -> Result<ClaimModel> {
        if let Ok(result) =
            tokio::time::timeout(deadline, self.run_claim(user_id, coupon_name)).await
        {
            result
        } else {
            warn!(?deadline, "Claim attempt timed out and was rolled back");
            Err(Error::Timeout {
                coupon_name: coupon_name.to_string(),
                deadline,
            })
        }
    }

    /// Claims, rerunning the whole protocol after transient failures.
    ///
    /// Domain outcomes (`NoStock`, `AlreadyClaimed`, `CouponNotFound`) are returned at once.
    /// Up to `max_attempts` attempts are made in total.
    pub async fn claim_with_retry(&self, user_id: &str, coupon_name: &str) -> Result<ClaimModel> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.claim(user_id, coupon_name).await {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        user = %user_id,
                        coupon = %coupon_name,
                        attempt,
                        reason = %e,
                        "Transient claim failure, retrying"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn run_claim(&self, user_id: &str, coupon_name: &str) -> Result<ClaimModel> {
        let mut txn = self.store.begin().await.inspect_err(|e| {
            warn!(reason = %e, "Could not open claim transaction");
        })?;

        match self.claim_steps(&mut txn, user_id, coupon_name).await {
            Ok(claim) => {
                txn.commit().await.inspect_err(|e| {
                    warn!(reason = %e, "Claim commit failed");
                })?;
                info!(claim_id = claim.id, "Coupon claimed");
                Ok(claim)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(
                        reason = %rollback_err,
                        "Rollback failed; transaction is discarded on drop"
                    );
                }
                match e.kind() {
                    ErrorKind::Transient => warn!(reason = %e, "Claim aborted"),
                    _ => info!(outcome = %e.kind(), "Claim rejected"),
                }
                Err(e)
            }
        }
    }

    async fn claim_steps(
        &self,
        txn: &mut S::Txn,
        user_id: &str,
        coupon_name: &str,
    ) -> Result<ClaimModel> {
        let coupon = self.store.get_for_exclusive_update(txn, coupon_name).await?;

        if coupon.remaining_amount <= 0 {
            return Err(Error::NoStock {
                name: coupon_name.to_string(),
            });
        }

        let claim = self.store.insert(txn, user_id, coupon_name).await?;
        self.store.decrement_stock(txn, coupon_name).await?;

        Ok(claim)
    }
}
