//! Resource backlash
//!
//! When upkeep drains the actor's resource below zero the actor is hit by
//! the backlash ability, scaled by the summed debuff magnitudes.

use crate::host::{ActorId, ActorValue, Host};

use super::{TickContext, UpkeepSupervisor, is_bound_weapon};

impl UpkeepSupervisor {
    /// Returns `true` when the backlash was cast.
    pub fn check_backlash<H: Host + ?Sized>(&mut self, ctx: &mut TickContext<'_, H>, actor: ActorId) -> bool {
        if ctx.registry.is_empty() {
            return false;
        }
        if ctx.host.actor_value(actor, ActorValue::Magicka) >= 0.0 {
            return false;
        }
        if ctx.host.is_beast_form(actor) {
            return false;
        }

        let backlash = ctx.forms.backlash;
        let backlash_setting = ctx.host.ability(backlash).and_then(|a| a.primary_setting());
        let already_active = ctx
            .host
            .live_effects(actor)
            .iter()
            .any(|e| e.ability == backlash || Some(e.setting) == backlash_setting);
        if already_active {
            return false;
        }

        let total_drain: f32 = ctx
            .registry
            .pairs()
            .filter_map(|p| ctx.host.ability(p.debuff)?.effects.first().map(|e| e.magnitude))
            .sum();

        let bound: Vec<_> = ctx
            .registry
            .pairs()
            .filter(|p| is_bound_weapon(&*ctx.host, p.base))
            .map(|p| (p.converted, p.base))
            .collect();
        for (converted, base) in bound {
            ctx.registry.defer_dispel(converted, base);
        }

        tracing::debug!(total_drain, "Triggered backlash");
        ctx.host.cast_immediate(actor, backlash, Some(total_drain))
    }
}
