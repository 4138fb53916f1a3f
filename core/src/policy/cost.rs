//! Upkeep pricing
//!
//! ```text
//!   ratio = neutral / observed
//!   curve = ratio²      if ratio > 1   (short abilities cost more)
//!         = √ratio      otherwise      (long abilities cost less)
//!   live  = (nominal / observed)^exponent   only when a live instance
//!                                           outlasts the nominal duration
//!   regen = 500 / (500 + regen rate)
//!   cost  = max(1, round(base · curve · live · regen))
//! ```

use upkeep_types::CostSettings;

use crate::host::{Ability, ActorId, ActorValue, Host};

const REGEN_SOFTENING: f32 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostCalculator {
    /// Seconds at which upkeep equals base cost; `0` disables scaling
    pub neutral_duration: i64,
    pub duration_exponent: f32,
}

impl From<&CostSettings> for CostCalculator {
    fn from(settings: &CostSettings) -> Self {
        Self {
            neutral_duration: settings.neutral_duration,
            duration_exponent: settings.duration_exponent,
        }
    }
}

impl CostCalculator {
    pub fn calculate<H: Host + ?Sized>(&self, host: &H, ability: &Ability, actor: ActorId) -> f32 {
        self.price(host, ability, Some(actor))
    }

    /// Cost with no caster modifiers, live instances or regeneration applied.
    pub fn calculate_without_caster<H: Host + ?Sized>(&self, host: &H, ability: &Ability) -> f32 {
        self.price(host, ability, None)
    }

    fn price<H: Host + ?Sized>(&self, host: &H, ability: &Ability, caster: Option<ActorId>) -> f32 {
        let base = host.ability_cost(ability.id, caster);
        if base <= 0.0 {
            tracing::debug!(ability = %ability.name, "Base cost is zero");
            return 0.0;
        }

        let neutral = self.neutral_duration as f32;
        if neutral <= 0.0 {
            return base.round();
        }

        let nominal = ability.nominal_duration();
        let live = caster.and_then(|actor| {
            host.live_effects(actor)
                .iter()
                .find(|e| e.ability == ability.id && e.caster == Some(actor))
                .map(|e| e.duration.max(1.0))
        });

        let observed = match live {
            Some(d) => d,
            None if nominal > 0.0 => nominal,
            None => {
                tracing::warn!(ability = %ability.name, "No usable duration; using neutral");
                neutral
            }
        };

        let ratio = neutral / observed;
        let curve = if ratio > 1.0 { ratio * ratio } else { ratio.sqrt() };

        let live_mult = match live {
            Some(d) if nominal > 0.0 && d > nominal => (nominal / d).powf(self.duration_exponent),
            _ => 1.0,
        };

        let regen = caster.map_or(0.0, |actor| host.actor_value(actor, ActorValue::MagickaRate));
        let regen_mult = if regen > 0.0 {
            REGEN_SOFTENING / (REGEN_SOFTENING + regen)
        } else {
            1.0
        };

        let multiplier = curve * live_mult * regen_mult;
        let cost = (base * multiplier).round().max(1.0);

        tracing::debug!(
            ability = %ability.name,
            base,
            observed,
            neutral,
            ratio,
            multiplier,
            cost,
            "Upkeep cost"
        );
        cost
    }
}
