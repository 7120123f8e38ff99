//! `SeaORM`-backed store.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tracing::instrument;

use super::{ClaimStore, CouponStore, Datastore, StoreTransaction};
use crate::core::{claim, coupon};
use crate::entities::{ClaimModel, CouponModel};
use crate::errors::{Error, Result};

/// Store backed by a pooled `SeaORM` connection.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone, Debug)]
pub struct DatabaseStore {
    db: Arc<DatabaseConnection>,
}

impl DatabaseStore {
    /// Wraps an established connection. Tables must already exist.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }
}

#[async_trait]
impl StoreTransaction for DatabaseTransaction {
    async fn commit(self) -> Result<()> {
        DatabaseTransaction::commit(self).await.map_err(Into::into)
    }

    async fn rollback(self) -> Result<()> {
        DatabaseTransaction::rollback(self).await.map_err(Into::into)
    }
}

#[async_trait]
impl Datastore for DatabaseStore {
    type Txn = DatabaseTransaction;

    async fn begin(&self) -> Result<DatabaseTransaction> {
        self.db.begin().await.map_err(Into::into)
    }
}

#[async_trait]
impl CouponStore for DatabaseStore {
    #[instrument(skip(self))]
    async fn create(&self, name: &str, total_amount: i64) -> Result<CouponModel> {
        coupon::create_coupon(&*self.db, name, total_amount).await
    }

    async fn get_by_name(&self, name: &str) -> Result<CouponModel> {
        coupon::get_coupon_by_name(&*self.db, name)
            .await?
            .ok_or_else(|| Error::CouponNotFound {
                name: name.to_string(),
            })
    }

    async fn get_for_exclusive_update(
        &self,
        txn: &mut DatabaseTransaction,
        name: &str,
    ) -> Result<CouponModel> {
        coupon::find_coupon_for_update(&*txn, name)
            .await?
            .ok_or_else(|| Error::CouponNotFound {
                name: name.to_string(),
            })
    }

    async fn decrement_stock(
        &self,
        txn: &mut DatabaseTransaction,
        name: &str,
    ) -> Result<CouponModel> {
        coupon::decrement_stock(&*txn, name).await
    }
}

#[async_trait]
impl ClaimStore for DatabaseStore {
    async fn insert(
        &self,
        txn: &mut DatabaseTransaction,
        user_id: &str,
        coupon_name: &str,
    ) -> Result<ClaimModel> {
        claim::insert_claim(&*txn, user_id, coupon_name).await
    }

    async fn list_claimants_by_coupon(&self, coupon_name: &str) -> Result<Vec<String>> {
        claim::list_claimants_by_coupon(&*self.db, coupon_name).await
    }

    async fn count_claims(&self, coupon_name: &str) -> Result<u64> {
        claim::count_claims_for_coupon(&*self.db, coupon_name).await
    }
}
