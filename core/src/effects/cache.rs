//! Live-effect observation cache
//!
//! Buckets the actor's live effect instances by the converted ability they
//! back. Rebuilt only when the actor's live-instance count differs from the
//! count seen at the last rebuild. That check is cheap but not sound: an
//! addition and a removal in the same interval leave the count unchanged
//! and the cache stale until the next count change.

use hashbrown::{HashMap, HashSet};

use crate::host::{ActorId, FormId, Host, LiveEffect, LiveEffectId, SystemForms};
use crate::registry::MaintainedRegistry;

pub type Observation = HashMap<FormId, Vec<LiveEffectId>>;

#[derive(Debug, Default)]
pub struct EffectObservationCache {
    buckets: Observation,
    /// (actor, live count) at the last rebuild
    snapshot: Option<(ActorId, usize)>,
    /// Instances whose elapsed time was already reset
    seen: HashSet<LiveEffectId>,
}

impl EffectObservationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current observation for `actor`, rebuilding first if the live count moved.
    pub fn get_for<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        registry: &MaintainedRegistry,
        forms: &SystemForms,
        actor: ActorId,
    ) -> &Observation {
        let count = host.live_effects(actor).len();
        if self.snapshot != Some((actor, count)) {
            self.rebuild(host, registry, forms, actor);
        }
        &self.buckets
    }

    pub fn rebuild<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        registry: &MaintainedRegistry,
        forms: &SystemForms,
        actor: ActorId,
    ) {
        self.buckets.clear();
        let debuff_setting = host
            .ability(forms.debuff_template)
            .and_then(|t| t.primary_setting());

        let mut to_reset = Vec::new();
        let live = host.live_effects(actor);
        for effect in live {
            if Some(effect.setting) == debuff_setting {
                continue;
            }
            if let Some(pair) = registry.get_by_base(effect.ability) {
                self.buckets.entry(pair.converted).or_default().push(effect.id);
                continue;
            }
            let tagged = host
                .ability(effect.ability)
                .is_some_and(|a| a.has_tag(&forms.maintained_tag));
            if tagged {
                if self.seen.insert(effect.id) {
                    to_reset.push(effect.id);
                }
                self.buckets.entry(effect.ability).or_default().push(effect.id);
            }
        }
        self.snapshot = Some((actor, live.len()));

        // Forget handles that no longer exist so the set stays bounded.
        let alive: HashSet<LiveEffectId> = live.iter().map(|e| e.id).collect();
        self.seen.retain(|id| alive.contains(id));

        for id in to_reset {
            host.reset_elapsed(actor, id);
        }
        tracing::debug!(buckets = self.buckets.len(), "Rebuilt live-effect observation");
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.snapshot = None;
        self.seen.clear();
    }
}

/// Resolve cached handles against the host's current live list.
///
/// Handles whose instance has vanished since the last rebuild are skipped.
pub fn resolve<'h, H: Host + ?Sized>(host: &'h H, actor: ActorId, ids: &[LiveEffectId]) -> Vec<&'h LiveEffect> {
    let live = host.live_effects(actor);
    ids.iter()
        .filter_map(|id| live.iter().find(|e| e.id == *id))
        .collect()
}
