//! Live-effect observation and visual suppression
//!
//! - [`cache`] buckets live instances under the converted ability they back
//! - [`silencer`] suppresses and restores the visuals of converted abilities
//! - [`restorer`] finishes persist-flag restoration on a delay

pub mod cache;
pub mod restorer;
pub mod silencer;

pub use cache::{EffectObservationCache, Observation};
pub use restorer::EffectRestorer;
