//! Unified error types for the coupon claim subsystem.
//!
//! Domain outcomes (missing coupon, duplicate coupon, duplicate claim, exhausted stock) are
//! always expressed as dedicated variants. Anything the datastore reports that is not one of
//! those outcomes is a transient failure: the whole transaction was rolled back and may be
//! retried from the start.

use std::fmt;
use std::time::Duration;

use sea_orm::DbErr;
use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The referenced coupon does not exist
    #[error("Coupon not found: {name}")]
    CouponNotFound {
        /// Coupon name that was looked up
        name: String,
    },

    /// A coupon with this name already exists
    #[error("Coupon already exists: {name}")]
    CouponExists {
        /// The taken name
        name: String,
    },

    /// The user already holds a claim on the coupon
    #[error("User {user_id} has already claimed coupon {coupon_name}")]
    AlreadyClaimed {
        /// Claiming user
        user_id: String,
        /// Claimed coupon
        coupon_name: String,
    },

    /// The coupon has no units left
    #[error("Coupon {name} has no remaining stock")]
    NoStock {
        /// Exhausted coupon
        name: String,
    },

    /// A coupon amount that is not positive
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: i64,
    },

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// A claim attempt ran past its deadline and was rolled back
    #[error("Claim on coupon {coupon_name} did not finish within {deadline:?}")]
    Timeout {
        /// Coupon the attempt was for
        coupon_name: String,
        /// The deadline that passed
        deadline: Duration,
    },

    /// Unclassified datastore error
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Infrastructure failure outside the datastore driver
    #[error("Datastore failure: {message}")]
    Transient {
        /// What went wrong
        message: String,
    },
}

/// Stable classification of an [`Error`], free of datastore detail.
///
/// This is what a transport layer should switch on when choosing a response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Referenced coupon does not exist
    NotFound,
    /// Coupon name already taken
    Conflict,
    /// The user already holds a claim on the coupon
    AlreadyClaimed,
    /// No units left
    NoStock,
    /// Input rejected before touching the datastore
    Invalid,
    /// Infrastructure failure; the entire operation may be retried
    Transient,
}

impl ErrorKind {
    /// Short machine-readable code for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::AlreadyClaimed => "already_claimed",
            Self::NoStock => "no_stock",
            Self::Invalid => "invalid",
            Self::Transient => "transient_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CouponNotFound { .. } => ErrorKind::NotFound,
            Self::CouponExists { .. } => ErrorKind::Conflict,
            Self::AlreadyClaimed { .. } => ErrorKind::AlreadyClaimed,
            Self::NoStock { .. } => ErrorKind::NoStock,
            Self::InvalidAmount { .. } | Self::Config { .. } => ErrorKind::Invalid,
            Self::Timeout { .. } | Self::Database(_) | Self::Transient { .. } => {
                ErrorKind::Transient
            }
        }
    }

    /// Whether the caller may rerun the whole transaction.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
