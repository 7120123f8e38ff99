//! Store capabilities used by the claim orchestrator and the query service.
//!
//! The traits describe what the claim protocol needs from a datastore: transactions, a
//! lockable coupon record, and an append-only claim record with a uniqueness guarantee.
//! [`DatabaseStore`] implements them on top of `SeaORM`; [`InMemoryStore`] is a process-local
//! double with the same locking and uniqueness semantics.

mod database;
mod memory;

pub use database::DatabaseStore;
pub use memory::{InMemoryStore, InMemoryTransaction};

use async_trait::async_trait;

use crate::entities::{ClaimModel, CouponModel};
use crate::errors::Result;

/// A transaction opened by a [`Datastore`].
///
/// Dropping a transaction without committing rolls it back and releases every lock it holds,
/// so early returns, cancelled futures and panics cannot leave a coupon locked.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Makes every write of the transaction visible and releases its locks.
    async fn commit(self) -> Result<()>;

    /// Discards every write of the transaction and releases its locks.
    async fn rollback(self) -> Result<()>;
}

/// Something that can open transactions.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Transaction type handed to the locked operations
    type Txn: StoreTransaction;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Txn>;
}

/// Coupon record capabilities.
#[async_trait]
pub trait CouponStore: Datastore {
    /// Creates a coupon with its full stock remaining; `CouponExists` on a duplicate name.
    async fn create(&self, name: &str, total_amount: i64) -> Result<CouponModel>;

    /// Non-locking lookup; `CouponNotFound` if absent.
    async fn get_by_name(&self, name: &str) -> Result<CouponModel>;

    /// Reads the coupon and holds an exclusive lock on it until `txn` ends.
    async fn get_for_exclusive_update(
        &self,
        txn: &mut Self::Txn,
        name: &str,
    ) -> Result<CouponModel>;

    /// Takes one unit of stock; only valid while `txn` holds the coupon's lock.
    async fn decrement_stock(&self, txn: &mut Self::Txn, name: &str) -> Result<CouponModel>;
}

/// Claim record capabilities.
#[async_trait]
pub trait ClaimStore: Datastore {
    /// Records a claim inside `txn`; `AlreadyClaimed` if the pair already exists.
    async fn insert(
        &self,
        txn: &mut Self::Txn,
        user_id: &str,
        coupon_name: &str,
    ) -> Result<ClaimModel>;

    /// Users holding a claim on the coupon, oldest first, never `None`.
    async fn list_claimants_by_coupon(&self, coupon_name: &str) -> Result<Vec<String>>;

    /// Number of committed claims on the coupon.
    async fn count_claims(&self, coupon_name: &str) -> Result<u64>;
}
