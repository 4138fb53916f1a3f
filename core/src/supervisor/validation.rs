//! Validation pass: deferred re-equips, per-pair verdicts, removal.

use std::collections::BTreeSet;
use std::time::Instant;

use crate::effects::cache::resolve;
use crate::effects::silencer;
use crate::host::{ActorId, Equipped, FormId, Hand, Host, LiveEffect};
use crate::registry::MaintainedPair;

use super::{TickContext, UpkeepSupervisor, is_bound_weapon};

/// Remaining time (seconds) above which a live instance counts as endless
pub const HUGE_REMAINING: f32 = (60 * 60 * 24 * 356) as f32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Valid,
    Remove,
    QueueRecast,
}

impl UpkeepSupervisor {
    /// Run one validation pass for `actor`. Returns the bases that were removed.
    pub fn validate<H: Host + ?Sized>(&mut self, ctx: &mut TickContext<'_, H>, actor: ActorId) -> Vec<FormId> {
        if ctx.registry.is_empty() && ctx.registry.deferred_count() == 0 {
            return Vec::new();
        }
        let start = Instant::now();

        self.apply_deferred(ctx, actor);

        let cleanup = ctx.host.cleanup_requested();
        let mut to_remove = Vec::new();
        for base in ctx.registry.bases() {
            if cleanup {
                tracing::debug!(base = %base, "Dispelled by player");
                to_remove.push(base);
                continue;
            }
            let Some(pair) = ctx.registry.get_by_base(base).cloned() else {
                continue;
            };
            match self.judge(ctx, actor, &pair) {
                Verdict::Valid => {}
                Verdict::Remove => to_remove.push(base),
                Verdict::QueueRecast => {
                    tracing::debug!(base = %base, "Conjure missing, scheduling recast");
                    let delay = ctx.settings.minions.recast_delay;
                    if let Some(p) = ctx.registry.get_by_base_mut(base) {
                        p.queue_recast(delay);
                    }
                }
            }
        }

        if !to_remove.is_empty() {
            for base in &to_remove {
                remove_pair(ctx, actor, *base);
            }
            let bases = ctx.registry.bases();
            ctx.host.set_toggle_list(&bases);
            ctx.host.clear_cleanup_request();
        }

        self.timing.record(start.elapsed());
        to_remove
    }

    /// Re-equip the base ability wherever a deferred converted ability is still selected.
    fn apply_deferred<H: Host + ?Sized>(&mut self, ctx: &mut TickContext<'_, H>, actor: ActorId) {
        let host = &mut *ctx.host;
        ctx.registry.for_each_deferred(|converted, base, erase| {
            for hand in [Hand::Left, Hand::Right] {
                if host.selected_ability(actor, hand) == Some(converted) {
                    tracing::debug!(converted = %converted, ?hand, "Deferred restore");
                    host.equip_ability(actor, base, hand);
                    *erase = true;
                }
            }
        });
    }

    fn judge<H: Host + ?Sized>(
        &mut self,
        ctx: &mut TickContext<'_, H>,
        actor: ActorId,
        pair: &MaintainedPair,
    ) -> Verdict {
        if is_bound_weapon(&*ctx.host, pair.base) && bound_weapon_held(&*ctx.host, actor, pair) {
            return Verdict::Valid;
        }

        let observed = self
            .cache
            .get_for(&mut *ctx.host, ctx.registry, ctx.forms, actor)
            .get(&pair.converted)
            .cloned();
        let host = &*ctx.host;
        let Some(converted) = host.ability(pair.converted) else {
            tracing::warn!(converted = %pair.converted, "Converted ability record is gone");
            return Verdict::Remove;
        };
        let defined = converted.effects.len();

        if pair.is_conjure {
            if pair.recast_queued {
                return Verdict::Valid;
            }
            return match observed {
                None => Verdict::QueueRecast,
                Some(ids) if ids.len() > defined => {
                    tracing::debug!(base = %pair.base, "Conjure has too many effects");
                    Verdict::Remove
                }
                Some(ids) if ids.len() < defined => Verdict::QueueRecast,
                Some(_) => Verdict::Valid,
            };
        }

        let Some(ids) = observed else {
            tracing::debug!(converted = %converted.name, "Not found on actor");
            return Verdict::Remove;
        };
        let instances = resolve(host, actor, &ids);

        if ids.len() < defined {
            tracing::debug!(converted = %converted.name, "Fewer live instances than defined");
            return Verdict::Remove;
        }

        if ids.len() > defined {
            if let Some(wrong) = instances.iter().find(|e| e.ability != pair.converted) {
                tracing::debug!(converted = %converted.name, source = %wrong.ability, "Source mismatch");
                return Verdict::Remove;
            }
            let expected: BTreeSet<FormId> = converted
                .effects
                .iter()
                .filter_map(|e| host.effect_setting(e.setting)?.associated_form)
                .collect();
            let present: BTreeSet<FormId> = instances
                .iter()
                .filter_map(|e| host.effect_setting(e.setting)?.associated_form)
                .collect();
            if !expected.is_empty() && present.len() < expected.len() {
                tracing::debug!(converted = %converted.name, "Exclusive effects are missing");
                return Verdict::Remove;
            }
        } else if instances.iter().any(|e| has_finite_remaining(e)) {
            tracing::debug!(converted = %converted.name, "Live duration mismatch");
            return Verdict::Remove;
        }

        if !instances.iter().any(|e| e.is_active()) {
            tracing::debug!(converted = %converted.name, "Zero active instances");
            return Verdict::Remove;
        }
        Verdict::Valid
    }
}

fn has_finite_remaining(effect: &LiveEffect) -> bool {
    effect.duration > 0.0 && effect.remaining() < HUGE_REMAINING
}

/// A conjured weapon counts as held while either hand carries the weapon
/// itself, or has the converted ability selected with its debuff applied.
fn bound_weapon_held<H: Host + ?Sized>(host: &H, actor: ActorId, pair: &MaintainedPair) -> bool {
    let weapons: Vec<FormId> = host
        .ability(pair.base)
        .map(|base| {
            base.effects
                .iter()
                .filter_map(|e| host.effect_setting(e.setting)?.associated_form)
                .collect()
        })
        .unwrap_or_default();

    [Hand::Right, Hand::Left].into_iter().any(|hand| match host.equipped(actor, hand) {
        Equipped::Weapon(weapon) => weapons.contains(&weapon),
        _ => {
            host.selected_ability(actor, hand) == Some(pair.converted)
                && host.has_ability(actor, pair.debuff)
        }
    })
}

/// Tear down one pair: visuals, actor abilities, identifiers, registry entry.
pub(super) fn remove_pair<H: Host + ?Sized>(ctx: &mut TickContext<'_, H>, actor: ActorId, base: FormId) {
    let Some(mut pair) = ctx.registry.get_by_base(base).cloned() else {
        return;
    };
    let host = &mut *ctx.host;
    let base_name = host
        .ability(base)
        .map(|a| a.name.clone())
        .unwrap_or_else(|| base.to_string());
    tracing::info!(base = %base, converted = %pair.converted, "Dispelling missing or invalid maintained ability");

    if is_bound_weapon(&*host, pair.converted) && !ctx.registry.is_deferred(pair.converted, base) {
        tracing::debug!(converted = %pair.converted, "Deferring cleanup");
        ctx.registry.defer_dispel(pair.converted, base);
    }

    if host.has_ability(actor, pair.debuff) {
        silencer::unsilence(host, &mut pair);
        host.remove_ability(actor, pair.converted);
        host.remove_ability(actor, pair.debuff);
        ctx.allocator.free(pair.converted);
        ctx.allocator.free(pair.debuff);
        host.delete_ability(pair.converted);
        host.delete_ability(pair.debuff);
        if ctx.settings.general.instant_dispel {
            host.dispel(actor, base);
        }
        host.notify(&format!("{base_name} is no longer being maintained."));
    }

    ctx.registry.erase_by_base(base);
}
