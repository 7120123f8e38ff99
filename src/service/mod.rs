//! Services built on the store capabilities: the claim protocol and the read path.

/// Transactional claim protocol
pub mod orchestrator;
/// Coupon creation and details
pub mod query;

pub use orchestrator::{ClaimOrchestrator, ClaimOutcome};
pub use query::{CouponDetails, CouponQueryService};
