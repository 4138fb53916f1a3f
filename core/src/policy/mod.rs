//! Conversion policies
//!
//! - [`eligibility`] decides whether an ability may be converted right now
//! - [`cost`] prices the recurring upkeep of a conversion

pub mod cost;
pub mod eligibility;

pub use cost::CostCalculator;
pub use eligibility::{EligibilityPolicy, IneligibleReason};
