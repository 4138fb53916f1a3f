//! Conversion eligibility rules
//!
//! Rules are evaluated in a fixed order and stop at the first failure. The
//! order only affects which reason is reported, never the verdict.

use thiserror::Error;

use crate::host::{Ability, AbilityKind, ActorId, Archetype, CastingMode, Delivery, Equipped, Hand, Host, SystemForms};

/// Minimum nominal duration (seconds) worth converting
pub const MIN_DURATION: f32 = 5.0;
/// Minimum casting cost worth converting
pub const MIN_COST: f32 = 5.0;
/// Identifiers consumed by one conversion (converted + debuff)
pub const IDS_PER_CONVERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IneligibleReason {
    #[error("not enough free identifiers ({free} free)")]
    InsufficientIds { free: u32 },
    #[error("ability is a scroll or enchantment")]
    Consumable,
    #[error("ability has no effects")]
    NoEffects,
    #[error("ability is not fire-and-forget")]
    NotFireAndForget,
    #[error("duration {0}s is at or below the floor")]
    TooShort(f32),
    #[error("cost is at or below the floor (caster {with_caster}, base {without_caster})")]
    TooCheap { with_caster: f32, without_caster: f32 },
    #[error("ability carries the '{0}' tag")]
    Tagged(String),
    #[error("not self-delivered and not a summon")]
    NotSelfOrSummon,
    #[error("conjured weapons are disabled")]
    BoundWeaponsDisallowed,
    #[error("the same conjured weapon is already held in both hands")]
    DuplicateBoundWeapon,
}

#[derive(Debug, Clone, Copy)]
pub struct EligibilityPolicy<'a> {
    pub forms: &'a SystemForms,
    pub allow_bound_weapons: bool,
    /// Free identifiers left in the allocator
    pub free_ids: u32,
}

impl EligibilityPolicy<'_> {
    pub fn is_eligible<H: Host + ?Sized>(&self, host: &H, ability: &Ability, actor: ActorId) -> bool {
        match self.check(host, ability, actor) {
            Ok(()) => true,
            Err(reason) => {
                tracing::info!(ability = %ability.name, %reason, "Ability not eligible");
                false
            }
        }
    }

    pub fn check<H: Host + ?Sized>(
        &self,
        host: &H,
        ability: &Ability,
        actor: ActorId,
    ) -> Result<(), IneligibleReason> {
        if self.free_ids < IDS_PER_CONVERSION {
            return Err(IneligibleReason::InsufficientIds { free: self.free_ids });
        }
        if matches!(ability.kind, AbilityKind::Scroll | AbilityKind::Enchantment) {
            return Err(IneligibleReason::Consumable);
        }
        let Some(primary) = ability.effects.first() else {
            return Err(IneligibleReason::NoEffects);
        };
        if ability.casting != CastingMode::FireAndForget {
            return Err(IneligibleReason::NotFireAndForget);
        }
        if primary.duration <= MIN_DURATION {
            return Err(IneligibleReason::TooShort(primary.duration));
        }

        let with_caster = host.ability_cost(ability.id, Some(actor));
        let without_caster = host.ability_cost(ability.id, None);
        if with_caster <= MIN_COST && without_caster <= MIN_COST {
            return Err(IneligibleReason::TooCheap { with_caster, without_caster });
        }

        let forms = self.forms;
        let blocked = [&forms.maintained_tag, &forms.excluded_tag]
            .into_iter()
            .chain(forms.extra_excluded_tags.iter())
            .find(|tag| ability.has_tag(tag));
        if let Some(tag) = blocked {
            return Err(IneligibleReason::Tagged(tag.clone()));
        }

        let primary_setting = host.effect_setting(primary.setting);
        let archetype = primary_setting.map(|s| s.archetype);

        if ability.delivery != Delivery::OnSelf {
            return if archetype == Some(Archetype::SummonCreature) {
                Ok(())
            } else {
                Err(IneligibleReason::NotSelfOrSummon)
            };
        }

        if archetype == Some(Archetype::BoundWeapon) {
            if !self.allow_bound_weapons {
                return Err(IneligibleReason::BoundWeaponsDisallowed);
            }
            let weapon = primary_setting.and_then(|s| s.associated_form);
            let same_in = |hand| match host.equipped(actor, hand) {
                Equipped::Ability(id) => host
                    .ability(id)
                    .and_then(|held| held.primary_setting())
                    .and_then(|setting| host.effect_setting(setting))
                    .is_some_and(|s| s.associated_form == weapon),
                _ => false,
            };
            if same_in(Hand::Left) && same_in(Hand::Right) {
                return Err(IneligibleReason::DuplicateBoundWeapon);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FormId;
    use crate::sim::{spell, SimHost, PLAYER};

    const SETTING: FormId = FormId(0x1000);
    const SPELL: FormId = FormId(0x2000);

    fn make_host(duration: f32, cost: f32) -> SimHost {
        let mut host = SimHost::new();
        host.define_setting(SETTING, "Oakflesh", Archetype::ValueModifier);
        host.define_ability(spell(SPELL, "Oakflesh", SETTING, duration), cost);
        host
    }

    fn policy(forms: &SystemForms) -> EligibilityPolicy<'_> {
        EligibilityPolicy {
            forms,
            allow_bound_weapons: true,
            free_ids: 64,
        }
    }

    fn check(host: &SimHost, policy: &EligibilityPolicy<'_>) -> Result<(), IneligibleReason> {
        policy.check(host, &host.abilities[&SPELL], PLAYER)
    }

    #[test]
    fn test_plain_self_buff_is_eligible() {
        let host = make_host(60.0, 40.0);
        let forms = host.forms.clone();
        assert_eq!(check(&host, &policy(&forms)), Ok(()));
    }

    #[test]
    fn test_short_duration_never_eligible() {
        let mut host = make_host(3.0, 500.0);
        host.actor_mut(PLAYER).cost_multiplier = 10.0;
        let forms = host.forms.clone();
        assert_eq!(
            check(&host, &policy(&forms)),
            Err(IneligibleReason::TooShort(3.0)),
            "A 3s ability must be rejected regardless of cost"
        );
    }

    #[test]
    fn test_rules_short_circuit_in_order() {
        let mut host = make_host(3.0, 1.0);
        host.abilities.get_mut(&SPELL).unwrap().kind = AbilityKind::Scroll;
        let forms = host.forms.clone();
        let mut p = policy(&forms);
        p.free_ids = 1;

        assert_eq!(check(&host, &p), Err(IneligibleReason::InsufficientIds { free: 1 }));
        p.free_ids = 2;
        assert_eq!(check(&host, &p), Err(IneligibleReason::Consumable));
    }

    #[test]
    fn test_cheap_only_when_both_costs_low() {
        let mut host = make_host(60.0, 4.0);
        let forms = host.forms.clone();
        assert!(matches!(check(&host, &policy(&forms)), Err(IneligibleReason::TooCheap { .. })));

        // Caster-side modifiers alone can lift it over the floor
        host.actor_mut(PLAYER).cost_multiplier = 2.0;
        assert_eq!(check(&host, &policy(&forms)), Ok(()));
    }

    #[test]
    fn test_tagged_abilities_rejected() {
        let mut host = make_host(60.0, 40.0);
        host.abilities
            .get_mut(&SPELL)
            .unwrap()
            .tags
            .insert("_m3HealerDummySpell".to_string());
        let forms = host.forms.clone();
        assert_eq!(
            check(&host, &policy(&forms)),
            Err(IneligibleReason::Tagged("_m3HealerDummySpell".to_string()))
        );
    }

    #[test]
    fn test_aimed_only_for_summons() {
        let mut host = make_host(60.0, 40.0);
        host.abilities.get_mut(&SPELL).unwrap().delivery = Delivery::Aimed;
        let forms = host.forms.clone();
        assert_eq!(check(&host, &policy(&forms)), Err(IneligibleReason::NotSelfOrSummon));

        host.settings.get_mut(&SETTING).unwrap().archetype = Archetype::SummonCreature;
        assert_eq!(check(&host, &policy(&forms)), Ok(()));
    }

    #[test]
    fn test_bound_weapon_rules() {
        let mut host = make_host(120.0, 40.0);
        {
            let s = host.settings.get_mut(&SETTING).unwrap();
            s.archetype = Archetype::BoundWeapon;
            s.associated_form = Some(FormId(0x9000));
        }
        let forms = host.forms.clone();
        let mut p = policy(&forms);

        p.allow_bound_weapons = false;
        assert_eq!(check(&host, &p), Err(IneligibleReason::BoundWeaponsDisallowed));
        p.allow_bound_weapons = true;

        host.set_equipped(PLAYER, Hand::Left, Equipped::Ability(SPELL));
        assert_eq!(check(&host, &p), Ok(()), "One hand holding it is fine");

        host.set_equipped(PLAYER, Hand::Right, Equipped::Ability(SPELL));
        assert_eq!(check(&host, &p), Err(IneligibleReason::DuplicateBoundWeapon));
    }
}
