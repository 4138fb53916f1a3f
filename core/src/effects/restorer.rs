//! Delayed persist-visual restoration
//!
//! Some presentation paths only honor a cleared persist flag if it stays
//! cleared for a moment after the effect starts. Silenced settings are
//! queued here and get their flag back once their delay runs out.

use crate::host::{FormId, Host};

/// Delay used when a push does not specify one
pub const DEFAULT_RESTORE_DELAY: f32 = 0.5;
/// Largest decrement applied by a single update
pub const MAX_STEP: f32 = 0.1;

#[derive(Debug, Clone, PartialEq)]
struct PendingRestore {
    setting: FormId,
    remaining: f32,
}

#[derive(Debug, Clone, Default)]
pub struct EffectRestorer {
    pending: Vec<PendingRestore>,
}

impl EffectRestorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `setting` for restoration. A pending entry is only ever extended.
    pub fn push(&mut self, setting: FormId, delay: Option<f32>) {
        let delay = delay.filter(|d| *d > 0.0).unwrap_or(DEFAULT_RESTORE_DELAY);
        if let Some(entry) = self.pending.iter_mut().find(|p| p.setting == setting) {
            entry.remaining = entry.remaining.max(delay);
            return;
        }
        self.pending.push(PendingRestore { setting, remaining: delay });
    }

    pub fn update<H: Host + ?Sized>(&mut self, host: &mut H, delta: f32) {
        if delta <= 0.0 || self.pending.is_empty() {
            return;
        }
        let step = delta.min(MAX_STEP);

        self.pending.retain_mut(|entry| {
            if host.effect_setting(entry.setting).is_none() {
                tracing::debug!(setting = %entry.setting, "Dropping restore for missing setting");
                return false;
            }
            entry.remaining -= step;
            if entry.remaining <= 0.0 {
                host.set_fx_persist(entry.setting, true);
                tracing::debug!(setting = %entry.setting, "Restored persist visual");
                return false;
            }
            true
        });
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_pending(&self, setting: FormId) -> bool {
        self.pending.iter().any(|p| p.setting == setting)
    }

    pub fn remaining(&self, setting: FormId) -> Option<f32> {
        self.pending
            .iter()
            .find(|p| p.setting == setting)
            .map(|p| p.remaining)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
