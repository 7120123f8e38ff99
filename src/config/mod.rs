/// Datastore connection and table creation
pub mod database;

/// Application settings loading from config.toml
pub mod settings;

pub use settings::{AppConfig, ClaimConfig, DatabaseConfig, SeedCoupon, load_app_configuration};
