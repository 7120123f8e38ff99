use std::{env, path::Path};

use coupon_claims::{
    config::{self, AppConfig, database},
    errors::{Error, Result},
    service::{ClaimOrchestrator, ClaimOutcome, CouponDetails, CouponQueryService},
    store::DatabaseStore,
};
use dotenvy::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: coupon-claims [claim <COUPON> <USER> | show <COUPON>]";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load the main application configuration
    let app_config = config::load_app_configuration()
        .inspect_err(|e| error!("Critical error loading application configuration: {}", e))?;

    // 4. Connect and make sure the schema exists
    ensure_sqlite_parent_dir(&app_config.database.url)?;
    let db = database::create_connection(&app_config.database)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    let store = DatabaseStore::new(db);
    let query = CouponQueryService::new(store.clone());

    // 5. Seed configured coupons
    seed_coupons(&query, &app_config).await?;

    // 6. Run the requested command
    let args: Vec<String> = env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["claim", coupon, user] => {
            let orchestrator = ClaimOrchestrator::new(store, app_config.claims.clone());
            let result = orchestrator.claim_with_retry(user, coupon).await;
            let outcome = ClaimOutcome::of(&result);
            match &result {
                Ok(claim) => info!(claim_id = claim.id, ?outcome, "Claim finished"),
                Err(e) => info!(reason = %e, ?outcome, "Claim finished"),
            }
            println!("{}", outcome_code(outcome));
        }
        ["show", coupon] => {
            let details = query.get_details(coupon).await?;
            print_details(&details)?;
        }
        [] => {
            for seed in &app_config.coupons {
                let details = query.get_details(&seed.name).await?;
                print_details(&details)?;
            }
        }
        _ => {
            return Err(Error::Config {
                message: USAGE.to_string(),
            });
        }
    }

    Ok(())
}

/// Creates every coupon listed in the configuration that does not exist yet.
async fn seed_coupons(
    query: &CouponQueryService<DatabaseStore>,
    app_config: &AppConfig,
) -> Result<()> {
    for seed in &app_config.coupons {
        match query.create_coupon(&seed.name, seed.amount).await {
            Ok(_) => {}
            Err(Error::CouponExists { name }) => {
                info!(coupon = %name, "Coupon already exists, not seeding");
            }
            Err(e) => {
                error!(coupon = %seed.name, "Failed to seed coupon: {}", e);
                return Err(e);
            }
        }
    }
    Ok(())
}

const fn outcome_code(outcome: ClaimOutcome) -> &'static str {
    match outcome {
        ClaimOutcome::Success => "success",
        ClaimOutcome::NoStock => "no_stock",
        ClaimOutcome::AlreadyClaimed => "already_claimed",
        ClaimOutcome::CouponNotFound => "coupon_not_found",
        ClaimOutcome::TransientFailure => "transient_failure",
    }
}

fn print_details(details: &CouponDetails) -> Result<()> {
    let rendered = toml::to_string(details).map_err(|e| Error::Config {
        message: format!("Failed to render coupon details: {e}"),
    })?;
    println!("{rendered}");
    Ok(())
}

/// `SQLite` creates the database file on demand but not its directory.
fn ensure_sqlite_parent_dir(url: &str) -> Result<()> {
    let Some(path) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            warn!("Could not create database directory {}: {}", parent.display(), e);
            Error::Config {
                message: format!("Cannot create {}: {e}", parent.display()),
            }
        })?;
    }
    Ok(())
}
