//! Application settings loaded from `config.toml`.
//!
//! Every key has a default, so a missing file or a partial file is valid. The
//! `DATABASE_URL` environment variable (usually set through `.env`) takes precedence over
//! `[database].url`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::{Error, Result};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Default datastore used when nothing is configured
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/coupons.sqlite?mode=rwc";

/// Root of the configuration file
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Datastore connection settings
    pub database: DatabaseConfig,
    /// Claim protocol settings
    pub claims: ClaimConfig,
    /// Coupons created at start-up if they do not exist yet
    pub coupons: Vec<SeedCoupon>,
}

/// `[database]` section
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL (`sqlite://...` or `postgres://...`)
    pub url: String,
    /// Upper bound on pooled connections
    pub max_connections: u32,
    /// How long to wait for a pooled connection before failing
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

/// `[claims]` section
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ClaimConfig {
    /// Deadline for a single claim attempt, lock wait and commit included
    pub timeout_ms: u64,
    /// Attempts made for a claim that keeps failing transiently
    pub max_attempts: u32,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_attempts: 3,
        }
    }
}

impl ClaimConfig {
    /// Per-attempt deadline as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One `[[coupons]]` entry
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SeedCoupon {
    /// Coupon name
    pub name: String,
    /// Initial stock
    pub amount: i64,
}

impl AppConfig {
    /// Rejects settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(Error::Config {
                message: "database.url cannot be empty".to_string(),
            });
        }
        if self.database.max_connections == 0 {
            return Err(Error::Config {
                message: "database.max_connections must be at least 1".to_string(),
            });
        }
        if self.claims.max_attempts == 0 {
            return Err(Error::Config {
                message: "claims.max_attempts must be at least 1".to_string(),
            });
        }
        for coupon in &self.coupons {
            if coupon.name.trim().is_empty() {
                return Err(Error::Config {
                    message: "seeded coupon name cannot be empty".to_string(),
                });
            }
            if coupon.amount <= 0 {
                return Err(Error::Config {
                    message: format!(
                        "seeded coupon {} must have a positive amount, got {}",
                        coupon.name, coupon.amount
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Parses and validates configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A value fails validation
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    parse_config(&contents)
}

/// Loads the configuration used by the binary.
///
/// Reads `./config.toml` when present and falls back to defaults otherwise, then applies the
/// `DATABASE_URL` override.
pub fn load_app_configuration() -> Result<AppConfig> {
    let path = Path::new(DEFAULT_CONFIG_PATH);
    let mut config = if path.exists() {
        load_config(path)?
    } else {
        warn!("{DEFAULT_CONFIG_PATH} not found, using default configuration");
        AppConfig::default()
    };

    if let Ok(url) = std::env::var("DATABASE_URL") {
        info!("Using DATABASE_URL from environment");
        config.database.url = url;
        config.validate()?;
    }

    Ok(config)
}
