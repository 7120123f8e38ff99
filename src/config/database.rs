//! Database configuration module for the coupon claim store.
//!
//! This module handles the datastore connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! then extended with the constraints the claim protocol relies on: CHECK constraints that keep
//! `remaining_amount` inside `0..=total_amount`, and a UNIQUE index on
//! (`user_id`, `coupon_name`). These hold even if application code misbehaves.

use std::time::Duration;

use crate::config::settings::DatabaseConfig;
use crate::entities::{Claim, Coupon, claim, coupon};
use crate::errors::Result;
use sea_orm::sea_query::{Expr, Index};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::{debug, info, instrument};

/// Name of the index enforcing one claim per user and coupon.
pub const CLAIM_UNIQUE_INDEX: &str = "idx_claims_user_coupon";

/// Establishes a bounded connection pool to the configured datastore.
///
/// The pool size and acquire timeout come from [`DatabaseConfig`]; when the pool is exhausted,
/// callers get an error after `acquire_timeout_secs` instead of waiting forever.
#[instrument(skip(config), fields(max_connections = config.max_connections))]
pub async fn create_connection(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(config.url.clone());

    // Each in-memory SQLite connection is its own database, so the pool must stay at one.
    let max_connections = if config.url.contains(":memory:") {
        1
    } else {
        config.max_connections
    };

    options
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .sqlx_logging(false);

    debug!(max_connections, "Connecting to datastore");
    Database::connect(options).await.map_err(Into::into)
}

/// Creates the `coupons` and `claims` tables with all of their constraints.
///
/// Safe to call on every start-up: every statement uses `IF NOT EXISTS`.
#[instrument(skip(db))]
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut coupon_table = schema.create_table_from_entity(Coupon);
    coupon_table
        .if_not_exists()
        .check(Expr::col(coupon::Column::TotalAmount).gt(0))
        .check(Expr::col(coupon::Column::RemainingAmount).gte(0))
        .check(
            Expr::col(coupon::Column::RemainingAmount).lte(Expr::col(coupon::Column::TotalAmount)),
        );

    let mut claim_table = schema.create_table_from_entity(Claim);
    claim_table.if_not_exists();

    let claim_unique = Index::create()
        .name(CLAIM_UNIQUE_INDEX)
        .table(Claim)
        .col(claim::Column::UserId)
        .col(claim::Column::CouponName)
        .unique()
        .if_not_exists()
        .to_owned();

    db.execute(builder.build(&coupon_table)).await?;
    db.execute(builder.build(&claim_table)).await?;
    db.execute(builder.build(&claim_unique)).await?;

    // Secondary index on claims.coupon_name
    for mut index in schema.create_index_from_entity(Claim) {
        index.if_not_exists();
        db.execute(builder.build(&index)).await?;
    }

    info!("Datastore tables ensured");
    Ok(())
}
