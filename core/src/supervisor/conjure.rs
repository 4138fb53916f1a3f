//! Conjure eviction watch and recast scheduling
//!
//! The host caps concurrent summons on its own. When a new summon pushes an
//! older maintained one out, that disappearance must not be read as a
//! validation failure. After every summon a short window is opened; a
//! snapshotted conjure that vanishes inside it is downgraded to a plain
//! maintained ability instead of being recast.

use std::collections::BTreeSet;

use crate::host::{ActorId, FormId, Host};

use super::{TickContext, UpkeepSupervisor};

/// Watch ticks (0.1 s cadence) an eviction window stays open
pub const EVICTION_WINDOW_TICKS: u32 = 10;

#[derive(Debug, Default)]
pub(super) struct EvictionWatch {
    /// Converted conjure abilities alive when the window opened
    snapshot: BTreeSet<FormId>,
    ticks_left: u32,
}

impl EvictionWatch {
    pub(super) fn is_open(&self) -> bool {
        self.ticks_left > 0
    }
}

impl UpkeepSupervisor {
    /// Snapshot the live conjure conversions and open a fresh eviction window.
    pub fn open_eviction_window<H: Host + ?Sized>(&mut self, ctx: &mut TickContext<'_, H>, actor: ActorId) {
        let observed = self
            .cache
            .get_for(&mut *ctx.host, ctx.registry, ctx.forms, actor);
        let snapshot: BTreeSet<FormId> = ctx
            .registry
            .pairs()
            .filter(|p| p.is_conjure && observed.contains_key(&p.converted))
            .map(|p| p.converted)
            .collect();

        tracing::debug!(tracked = snapshot.len(), "Eviction window opened");
        self.eviction = EvictionWatch {
            snapshot,
            ticks_left: EVICTION_WINDOW_TICKS,
        };
    }

    /// One watch tick. Every tick of an open window checks the snapshot.
    pub fn update_conjure_watch<H: Host + ?Sized>(&mut self, ctx: &mut TickContext<'_, H>, actor: ActorId) {
        if !self.eviction.is_open() {
            return;
        }

        let observed = self
            .cache
            .get_for(&mut *ctx.host, ctx.registry, ctx.forms, actor);
        let evicted: Vec<FormId> = self
            .eviction
            .snapshot
            .iter()
            .filter(|converted| !observed.contains_key(*converted))
            .copied()
            .collect();

        for converted in evicted {
            let Some(base) = ctx.registry.base_of_converted(converted) else {
                continue;
            };
            if let Some(pair) = ctx.registry.get_by_base_mut(base) {
                if pair.is_conjure {
                    tracing::debug!(base = %base, "Conjure evicted by host summon limit");
                    pair.is_conjure = false;
                    pair.cancel_recast();
                }
            }
            self.eviction.snapshot.remove(&converted);
        }

        self.eviction.ticks_left -= 1;
        if !self.eviction.is_open() {
            self.eviction.snapshot.clear();
            tracing::debug!("Eviction window closed");
        }
    }

    /// Count down queued recasts by `elapsed` seconds and fire the expired ones.
    pub fn update_recasts<H: Host + ?Sized>(&mut self, ctx: &mut TickContext<'_, H>, actor: ActorId, elapsed: f32) {
        if ctx.host.is_dead(actor) || ctx.registry.is_empty() {
            return;
        }

        let mut due = Vec::new();
        for pair in ctx.registry.pairs_mut() {
            if !pair.needs_recast_update() {
                continue;
            }
            pair.recast_remaining -= elapsed;
            if pair.recast_remaining <= 0.0 {
                due.push((pair.base, pair.converted));
            }
        }

        for (base, converted) in due {
            tracing::debug!(base = %base, "Recast countdown expired");
            let success = self.try_recast(ctx, actor, converted);
            if let Some(pair) = ctx.registry.get_by_base_mut(base) {
                pair.cancel_recast();
            }
            if !success {
                tracing::debug!(base = %base, "Conjure recast failed");
            }
        }
    }

    /// Replace a stale conjure with a fresh cast and watch the new summon.
    pub fn try_recast<H: Host + ?Sized>(
        &mut self,
        ctx: &mut TickContext<'_, H>,
        actor: ActorId,
        converted: FormId,
    ) -> bool {
        if ctx.host.is_dead(actor) || ctx.host.ability(converted).is_none() {
            return false;
        }
        ctx.host.remove_ability(actor, converted);
        if !ctx.host.cast_immediate(actor, converted, None) {
            return false;
        }
        self.open_eviction_window(ctx, actor);
        true
    }
}
