//! Periodic skill experience for maintained abilities.

use upkeep_types::UpkeepSettings;

use crate::host::{ActorId, Host};
use crate::policy::CostCalculator;
use crate::registry::MaintainedRegistry;

/// Seconds between reward passes
pub const EXPERIENCE_INTERVAL: f32 = 300.0;

/// Award every maintained base its caster-free upkeep cost, scaled by the
/// configured multiplier, as experience in the base's skill. Returns the
/// total awarded.
pub fn award_experience<H: Host + ?Sized>(
    host: &mut H,
    registry: &MaintainedRegistry,
    settings: &UpkeepSettings,
    actor: ActorId,
) -> f32 {
    let multiplier = settings.experience.multiplier;
    if multiplier <= 0.0 {
        return 0.0;
    }

    let calculator = CostCalculator::from(&settings.costs);
    let mut rewards = Vec::new();
    for base in registry.bases() {
        let Some(ability) = host.ability(base) else {
            continue;
        };
        let Some(skill) = ability.skill.clone() else {
            continue;
        };
        let amount = calculator.calculate_without_caster(&*host, ability) * multiplier;
        rewards.push((skill, amount));
    }

    let mut total = 0.0;
    for (skill, amount) in rewards {
        tracing::debug!(skill = %skill, amount, "Awarding experience");
        host.add_skill_experience(actor, &skill, amount);
        total += amount;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Archetype, FormId};
    use crate::registry::MaintainedPair;
    use crate::sim::{PLAYER, SimHost, spell};

    const SETTING: FormId = FormId(0x1000);
    const OAKFLESH: FormId = FormId(0x2000);
    const CANDLELIGHT: FormId = FormId(0x2001);

    fn make_state() -> (SimHost, MaintainedRegistry) {
        let mut host = SimHost::new();
        host.define_setting(SETTING, "Armor", Archetype::ValueModifier);
        host.define_ability(spell(OAKFLESH, "Oakflesh", SETTING, 60.0), 40.0);
        host.define_ability(spell(CANDLELIGHT, "Candlelight", SETTING, 60.0), 20.0);

        let mut registry = MaintainedRegistry::new();
        registry.insert(MaintainedPair::new(OAKFLESH, FormId(0xFF03_F800), FormId(0xFF03_F801), false));
        registry.insert(MaintainedPair::new(CANDLELIGHT, FormId(0xFF03_F802), FormId(0xFF03_F803), false));
        (host, registry)
    }

    #[test]
    fn test_awards_scaled_cost_per_skill() {
        let (mut host, registry) = make_state();
        let mut settings = UpkeepSettings::default();
        settings.experience.multiplier = 0.5;

        let total = award_experience(&mut host, &registry, &settings, PLAYER);

        assert_eq!(total, 30.0);
        assert_eq!(host.actors[&PLAYER].experience["Alteration"], 30.0);
    }

    #[test]
    fn test_non_positive_multiplier_awards_nothing() {
        let (mut host, registry) = make_state();
        let mut settings = UpkeepSettings::default();
        settings.experience.multiplier = 0.0;

        assert_eq!(award_experience(&mut host, &registry, &settings, PLAYER), 0.0);
        assert!(host.actors[&PLAYER].experience.is_empty());
    }

    #[test]
    fn test_caster_discount_does_not_reduce_reward() {
        let (mut host, registry) = make_state();
        host.actor_mut(PLAYER).cost_multiplier = 0.1;

        let total = award_experience(&mut host, &registry, &UpkeepSettings::default(), PLAYER);
        assert_eq!(total, 60.0);
    }
}
