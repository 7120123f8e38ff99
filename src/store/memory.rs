//! Process-local store with the locking and uniqueness semantics of the real datastore.
//!
//! Every coupon owns an async mutex standing in for its row lock. A transaction acquires it in
//! [`CouponStore::get_for_exclusive_update`] and keeps the owned guard until commit, rollback or
//! drop. Writes are staged in the transaction and applied atomically at commit, where the
//! constraints (stock never below zero, one claim per user and coupon) are checked again.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tracing::{debug, instrument};

use super::{ClaimStore, CouponStore, Datastore, StoreTransaction};
use crate::entities::{ClaimModel, CouponModel};
use crate::errors::{Error, Result};

struct CouponRow {
    model: CouponModel,
    lock: Arc<RowLock<()>>,
}

#[derive(Default)]
struct Tables {
    coupons: HashMap<String, CouponRow>,
    claims: Vec<ClaimModel>,
    claim_keys: HashSet<(String, String)>,
    next_claim_id: i64,
}

impl Tables {
    fn coupon(&self, name: &str) -> Result<&CouponRow> {
        self.coupons.get(name).ok_or_else(|| Error::CouponNotFound {
            name: name.to_string(),
        })
    }
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    failing_commits: AtomicU32,
}

impl Shared {
    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|e| Error::Transient {
            message: format!("in-memory tables poisoned: {e}"),
        })
    }
}

/// In-memory implementation of the store capabilities.
///
/// Cloning is cheap; clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with a transient error, as a lost connection would.
    pub fn fail_next_commits(&self, count: u32) {
        self.shared.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Total number of committed claims across all coupons.
    pub fn total_claims(&self) -> Result<usize> {
        Ok(self.shared.tables()?.claims.len())
    }
}

/// Transaction of an [`InMemoryStore`].
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    locks: HashMap<String, OwnedMutexGuard<()>>,
    decrements: HashMap<String, i64>,
    claims: Vec<ClaimModel>,
}

impl InMemoryTransaction {
    fn ensure_locked(&self, name: &str) -> Result<()> {
        if self.locks.contains_key(name) {
            Ok(())
        } else {
            Err(Error::Transient {
                message: format!("coupon {name} modified without holding its lock"),
            })
        }
    }

    /// Committed state of the coupon with this transaction's own writes applied.
    fn view(&self, tables: &Tables, name: &str) -> Result<CouponModel> {
        let mut model = tables.coupon(name)?.model.clone();
        model.remaining_amount -= self.decrements.get(name).copied().unwrap_or(0);
        Ok(model)
    }

    fn holds_claim(&self, user_id: &str, coupon_name: &str) -> bool {
        self.claims
            .iter()
            .any(|c| c.user_id == user_id && c.coupon_name == coupon_name)
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn commit(self) -> Result<()> {
        let shared = Arc::clone(&self.shared);

        let injected = shared
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::Transient {
                message: "injected commit failure".to_string(),
            });
        }

        let mut tables = shared.tables()?;

        // Constraint checks first, so a violation leaves nothing half-applied
        for (name, taken) in &self.decrements {
            let row = tables.coupon(name)?;
            if row.model.remaining_amount - taken < 0 {
                return Err(Error::NoStock { name: name.clone() });
            }
        }
        for claim in &self.claims {
            let key = (claim.user_id.clone(), claim.coupon_name.clone());
            if tables.claim_keys.contains(&key) {
                return Err(Error::AlreadyClaimed {
                    user_id: claim.user_id.clone(),
                    coupon_name: claim.coupon_name.clone(),
                });
            }
        }

        for (name, taken) in &self.decrements {
            if let Some(row) = tables.coupons.get_mut(name) {
                row.model.remaining_amount -= taken;
            }
        }
        for claim in self.claims {
            tables
                .claim_keys
                .insert((claim.user_id.clone(), claim.coupon_name.clone()));
            tables.claims.push(claim);
        }

        // Row locks are released when `self.locks` drops, after the writes are visible
        drop(tables);
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Datastore for InMemoryStore {
    type Txn = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        Ok(InMemoryTransaction {
            shared: Arc::clone(&self.shared),
            locks: HashMap::new(),
            decrements: HashMap::new(),
            claims: Vec::new(),
        })
    }
}

#[async_trait]
impl CouponStore for InMemoryStore {
    #[instrument(skip(self))]
    async fn create(&self, name: &str, total_amount: i64) -> Result<CouponModel> {
        if total_amount <= 0 {
            return Err(Error::InvalidAmount {
                amount: total_amount,
            });
        }

        let mut tables = self.shared.tables()?;
        if tables.coupons.contains_key(name) {
            return Err(Error::CouponExists {
                name: name.to_string(),
            });
        }

        let model = CouponModel {
            name: name.to_string(),
            total_amount,
            remaining_amount: total_amount,
            created_at: Utc::now(),
        };
        tables.coupons.insert(
            name.to_string(),
            CouponRow {
                model: model.clone(),
                lock: Arc::new(RowLock::new(())),
            },
        );
        Ok(model)
    }

    async fn get_by_name(&self, name: &str) -> Result<CouponModel> {
        Ok(self.shared.tables()?.coupon(name)?.model.clone())
    }

    async fn get_for_exclusive_update(
        &self,
        txn: &mut InMemoryTransaction,
        name: &str,
    ) -> Result<CouponModel> {
        if !txn.locks.contains_key(name) {
            let lock = Arc::clone(&self.shared.tables()?.coupon(name)?.lock);
            debug!(coupon = %name, "Waiting for coupon lock");
            let guard = lock.lock_owned().await;
            txn.locks.insert(name.to_string(), guard);
        }

        let tables = self.shared.tables()?;
        txn.view(&tables, name)
    }

    async fn decrement_stock(
        &self,
        txn: &mut InMemoryTransaction,
        name: &str,
    ) -> Result<CouponModel> {
        txn.ensure_locked(name)?;

        let mut coupon = {
            let tables = self.shared.tables()?;
            txn.view(&tables, name)?
        };
        if coupon.remaining_amount <= 0 {
            return Err(Error::NoStock {
                name: name.to_string(),
            });
        }

        *txn.decrements.entry(name.to_string()).or_insert(0) += 1;
        coupon.remaining_amount -= 1;
        Ok(coupon)
    }
}

#[async_trait]
impl ClaimStore for InMemoryStore {
    async fn insert(
        &self,
        txn: &mut InMemoryTransaction,
        user_id: &str,
        coupon_name: &str,
    ) -> Result<ClaimModel> {
        let id = {
            let mut tables = self.shared.tables()?;
            tables.coupon(coupon_name)?;

            let key = (user_id.to_string(), coupon_name.to_string());
            if tables.claim_keys.contains(&key) || txn.holds_claim(user_id, coupon_name) {
                return Err(Error::AlreadyClaimed {
                    user_id: user_id.to_string(),
                    coupon_name: coupon_name.to_string(),
                });
            }

            // Ids are handed out like a sequence: never reused, even after a rollback
            tables.next_claim_id += 1;
            tables.next_claim_id
        };

        let claim = ClaimModel {
            id,
            user_id: user_id.to_string(),
            coupon_name: coupon_name.to_string(),
            created_at: Utc::now(),
        };
        txn.claims.push(claim.clone());
        Ok(claim)
    }

    async fn list_claimants_by_coupon(&self, coupon_name: &str) -> Result<Vec<String>> {
        let tables = self.shared.tables()?;
        let mut seen = HashSet::new();
        Ok(tables
            .claims
            .iter()
            .filter(|c| c.coupon_name == coupon_name)
            .filter(|c| seen.insert(c.user_id.as_str()))
            .map(|c| c.user_id.clone())
            .collect())
    }

    async fn count_claims(&self, coupon_name: &str) -> Result<u64> {
        let tables = self.shared.tables()?;
        let count = tables
            .claims
            .iter()
            .filter(|c| c.coupon_name == coupon_name)
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_create_and_get() -> Result<()> {
        let store = InMemoryStore::new();
        let created = store.create("PROMO", 5).await?;
        assert_eq!(created.remaining_amount, 5);
        assert_eq!(store.get_by_name("PROMO").await?, created);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_duplicate_and_invalid() -> Result<()> {
        let store = InMemoryStore::new();
        store.create("DUP", 3).await?;

        let result = store.create("DUP", 7).await;
        assert!(matches!(result, Err(Error::CouponExists { .. })));
        assert_eq!(store.get_by_name("DUP").await?.total_amount, 3);

        let result = store.create("ZERO", 0).await;
        assert!(matches!(result, Err(Error::InvalidAmount { amount: 0 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_lock_blocks_second_transaction_until_commit() -> Result<()> {
        let store = InMemoryStore::new();
        store.create("PROMO", 2).await?;

        let mut first = store.begin().await?;
        store.get_for_exclusive_update(&mut first, "PROMO").await?;

        let contender = store.clone();
        let waiter = tokio::spawn(async move {
            let mut second = contender.begin().await?;
            let seen = contender
                .get_for_exclusive_update(&mut second, "PROMO")
                .await?;
            second.rollback().await?;
            Ok::<_, Error>(seen.remaining_amount)
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        store.insert(&mut first, "alice", "PROMO").await?;
        store.decrement_stock(&mut first, "PROMO").await?;
        first.commit().await?;

        // The waiter observes the committed decrement, never the stale value
        let seen = waiter.await.unwrap()?;
        assert_eq!(seen, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_lock_and_discards_writes() -> Result<()> {
        let store = InMemoryStore::new();
        store.create("PROMO", 2).await?;

        {
            let mut txn = store.begin().await?;
            store.get_for_exclusive_update(&mut txn, "PROMO").await?;
            store.insert(&mut txn, "alice", "PROMO").await?;
            store.decrement_stock(&mut txn, "PROMO").await?;
        }

        let mut txn = store.begin().await?;
        let coupon = tokio::time::timeout(
            Duration::from_secs(1),
            store.get_for_exclusive_update(&mut txn, "PROMO"),
        )
        .await
        .unwrap()?;
        assert_eq!(coupon.remaining_amount, 2);
        assert_eq!(store.count_claims("PROMO").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_decrement_requires_lock() -> Result<()> {
        let store = InMemoryStore::new();
        store.create("PROMO", 2).await?;

        let mut txn = store.begin().await?;
        let result = store.decrement_stock(&mut txn, "PROMO").await;
        assert!(matches!(result, Err(Error::Transient { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_decrement_never_below_zero() -> Result<()> {
        let store = InMemoryStore::new();
        store.create("SOLO", 1).await?;

        let mut txn = store.begin().await?;
        store.get_for_exclusive_update(&mut txn, "SOLO").await?;
        let coupon = store.decrement_stock(&mut txn, "SOLO").await?;
        assert_eq!(coupon.remaining_amount, 0);

        let result = store.decrement_stock(&mut txn, "SOLO").await;
        assert!(matches!(result, Err(Error::NoStock { .. })));
        txn.commit().await?;

        assert_eq!(store.get_by_name("SOLO").await?.remaining_amount, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_uniqueness() -> Result<()> {
        let store = InMemoryStore::new();
        store.create("PROMO", 5).await?;

        let mut txn = store.begin().await?;
        store.insert(&mut txn, "alice", "PROMO").await?;
        let result = store.insert(&mut txn, "alice", "PROMO").await;
        assert!(matches!(result, Err(Error::AlreadyClaimed { .. })));
        txn.commit().await?;

        let mut txn = store.begin().await?;
        let result = store.insert(&mut txn, "alice", "PROMO").await;
        assert!(matches!(result, Err(Error::AlreadyClaimed { .. })));

        let result = store.insert(&mut txn, "alice", "MISSING").await;
        assert!(matches!(result, Err(Error::CouponNotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_rechecks_uniqueness() -> Result<()> {
        let store = InMemoryStore::new();
        store.create("PROMO", 5).await?;

        // Two transactions that skip the coupon lock both stage the same claim
        let mut first = store.begin().await?;
        let mut second = store.begin().await?;
        store.insert(&mut first, "alice", "PROMO").await?;
        store.insert(&mut second, "alice", "PROMO").await?;

        first.commit().await?;
        let result = second.commit().await;
        assert!(matches!(result, Err(Error::AlreadyClaimed { .. })));
        assert_eq!(store.count_claims("PROMO").await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_injected_commit_failure_applies_nothing() -> Result<()> {
        let store = InMemoryStore::new();
        store.create("PROMO", 5).await?;
        store.fail_next_commits(1);

        let mut txn = store.begin().await?;
        store.get_for_exclusive_update(&mut txn, "PROMO").await?;
        store.insert(&mut txn, "alice", "PROMO").await?;
        store.decrement_stock(&mut txn, "PROMO").await?;
        let result = txn.commit().await;
        assert!(matches!(result, Err(Error::Transient { .. })));

        assert_eq!(store.get_by_name("PROMO").await?.remaining_amount, 5);
        assert_eq!(store.total_claims()?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_claimants_order() -> Result<()> {
        let store = InMemoryStore::new();
        store.create("PROMO", 5).await?;

        for user in ["carol", "alice", "bob"] {
            let mut txn = store.begin().await?;
            store.get_for_exclusive_update(&mut txn, "PROMO").await?;
            store.insert(&mut txn, user, "PROMO").await?;
            store.decrement_stock(&mut txn, "PROMO").await?;
            txn.commit().await?;
        }

        assert_eq!(
            store.list_claimants_by_coupon("PROMO").await?,
            vec!["carol", "alice", "bob"]
        );
        assert!(store.list_claimants_by_coupon("OTHER").await?.is_empty());
        Ok(())
    }
}
