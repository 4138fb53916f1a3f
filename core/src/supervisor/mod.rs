//! Upkeep supervisor
//!
//! Periodic reconciliation of the registry against the host's live state.
//! Each maintained pair is re-judged on every validation pass:
//!
//! ```text
//!             ┌──────────────► Valid
//!   Valid ────┼──────────────► PendingRemoval ──► removed (or DeferredCleanup
//!             │                                  for conjured weapons)
//!             └──────────────► AwaitingRecast ──► recast when countdown ends
//! ```
//!
//! Sub-tasks and the cadence the orchestrator drives them at:
//! - [`UpkeepSupervisor::validate`]: every 0.5 s
//! - [`UpkeepSupervisor::check_backlash`]: every 0.5 s
//! - [`UpkeepSupervisor::update_recasts`]: every 0.5 s, with the accumulated time
//! - [`UpkeepSupervisor::update_conjure_watch`]: every 0.1 s

mod backlash;
mod conjure;
mod validation;

#[cfg(test)]
mod supervisor_tests;

use std::time::Duration;

use upkeep_types::UpkeepSettings;

use crate::allocator::IdAllocator;
use crate::effects::{EffectObservationCache, EffectRestorer};
use crate::host::{Archetype, FormId, Host, SystemForms, primary_archetype_is};
use crate::registry::MaintainedRegistry;

pub use conjure::EVICTION_WINDOW_TICKS;
pub use validation::HUGE_REMAINING;

/// Number of validation passes averaged per timing report
const TIMING_WINDOW: u32 = 100;

/// Mutable engine state a supervisor pass works on.
pub struct TickContext<'a, H: Host + ?Sized> {
    pub host: &'a mut H,
    pub registry: &'a mut MaintainedRegistry,
    pub allocator: &'a mut IdAllocator,
    pub restorer: &'a mut EffectRestorer,
    pub settings: &'a UpkeepSettings,
    pub forms: &'a SystemForms,
}

#[derive(Debug, Default)]
struct PassTiming {
    total: Duration,
    passes: u32,
}

impl PassTiming {
    fn record(&mut self, elapsed: Duration) {
        self.total += elapsed;
        self.passes += 1;
        if self.passes == TIMING_WINDOW {
            let avg_ms = self.total.as_secs_f64() * 1000.0 / f64::from(self.passes);
            tracing::debug!(avg_ms, passes = self.passes, "Validation pass average");
            *self = Self::default();
        }
    }
}

#[derive(Debug, Default)]
pub struct UpkeepSupervisor {
    cache: EffectObservationCache,
    eviction: conjure::EvictionWatch,
    timing: PassTiming,
}

impl UpkeepSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the cached live-effect observation and any open eviction window.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.eviction = conjure::EvictionWatch::default();
    }

    pub fn eviction_window_open(&self) -> bool {
        self.eviction.is_open()
    }
}

/// Whether the ability's primary effect conjures a weapon.
pub fn is_bound_weapon<H: Host + ?Sized>(host: &H, ability: FormId) -> bool {
    host.ability(ability)
        .is_some_and(|a| primary_archetype_is(host, a, Archetype::BoundWeapon))
}
