//! Shared test utilities for the coupon claim crate.
//!
//! This module provides common helpers for setting up test datastores, running claim
//! requests concurrently and tallying their outcomes.

use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tempfile::TempDir;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use crate::{
    config::{ClaimConfig, DatabaseConfig, database},
    entities::ClaimModel,
    errors::{Error, Result},
    service::{ClaimOrchestrator, ClaimOutcome},
    store::{ClaimStore, CouponStore, DatabaseStore},
};

/// Installs a test-friendly tracing subscriber once per process.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all database-backed tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        acquire_timeout_secs: 30,
    };
    let db = database::create_connection(&config).await?;
    database::create_tables(&db).await?;
    Ok(db)
}

/// A [`DatabaseStore`] over a fresh in-memory database.
pub async fn setup_database_store() -> Result<DatabaseStore> {
    Ok(DatabaseStore::new(setup_test_db().await?))
}

/// A [`DatabaseStore`] over a fresh `SQLite` file with a multi-connection pool.
///
/// Concurrent claims here contend for the coupon lock across connections, not for a single
/// pooled connection. The database lives as long as the returned [`TempDir`].
pub async fn setup_file_store(
    max_connections: u32,
    acquire_timeout_secs: u64,
) -> Result<(DatabaseStore, TempDir)> {
    let dir = tempfile::tempdir().map_err(|e| Error::Config {
        message: format!("Failed to create temp dir: {e}"),
    })?;
    let config = DatabaseConfig {
        url: format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("coupons.sqlite").display()
        ),
        max_connections,
        acquire_timeout_secs,
    };
    let db = database::create_connection(&config).await?;
    database::create_tables(&db).await?;
    Ok((DatabaseStore::new(db), dir))
}

/// Claim settings with a generous deadline, so only tests that want a timeout get one.
pub const fn test_claim_config() -> ClaimConfig {
    ClaimConfig {
        timeout_ms: 10_000,
        max_attempts: 3,
    }
}

/// Spawns one task per `(user_id, coupon_name)` request and waits for all of them.
///
/// Results come back in completion order.
pub async fn run_concurrent_claims<S, I>(
    orchestrator: &Arc<ClaimOrchestrator<S>>,
    requests: I,
) -> Vec<Result<ClaimModel>>
where
    S: CouponStore + ClaimStore + 'static,
    I: IntoIterator<Item = (String, String)>,
{
    let mut tasks = JoinSet::new();
    for (user_id, coupon_name) in requests {
        let orchestrator = Arc::clone(orchestrator);
        tasks.spawn(async move { orchestrator.claim(&user_id, &coupon_name).await });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        results.push(joined.unwrap_or_else(|e| {
            Err(Error::Transient {
                message: format!("claim task failed: {e}"),
            })
        }));
    }
    results
}

/// Counts claim results per outcome.
pub fn tally_outcomes(results: &[Result<ClaimModel>]) -> HashMap<ClaimOutcome, usize> {
    let mut tally = HashMap::new();
    for result in results {
        *tally.entry(ClaimOutcome::of(result)).or_insert(0) += 1;
    }
    tally
}
