use upkeep_types::UpkeepSettings;

use super::*;
use crate::factory::AbilityFactory;
use crate::host::{ActorValue, Archetype, Delivery, Equipped, Hand, SystemForms};
use crate::registry::MaintainedPair;
use crate::sim::{PLAYER, SimHost, spell};

const WARD_SETTING: FormId = FormId(0x1000);
const SUMMON_SETTING: FormId = FormId(0x1001);
const BLADE_SETTING: FormId = FormId(0x1002);
const WARD: FormId = FormId(0x2000);
const SUMMON: FormId = FormId(0x2001);
const BLADE: FormId = FormId(0x2002);
const BLADE_WEAPON: FormId = FormId(0x9000);

struct Harness {
    host: SimHost,
    registry: MaintainedRegistry,
    allocator: IdAllocator,
    restorer: EffectRestorer,
    settings: UpkeepSettings,
    forms: SystemForms,
    supervisor: UpkeepSupervisor,
}

impl Harness {
    fn new() -> Self {
        let mut host = SimHost::new();
        host.define_setting(WARD_SETTING, "Ward", Archetype::ValueModifier);
        host.define_setting(SUMMON_SETTING, "Summon Familiar", Archetype::SummonCreature);
        host.define_setting(BLADE_SETTING, "Bound Sword", Archetype::BoundWeapon).associated_form =
            Some(BLADE_WEAPON);

        host.define_ability(spell(WARD, "Ward", WARD_SETTING, 60.0), 30.0);
        let mut summon = spell(SUMMON, "Conjure Familiar", SUMMON_SETTING, 60.0);
        summon.delivery = Delivery::Aimed;
        host.define_ability(summon, 60.0);
        host.define_ability(spell(BLADE, "Bound Sword", BLADE_SETTING, 120.0), 40.0);

        let forms = host.forms.clone();
        Self {
            host,
            registry: MaintainedRegistry::new(),
            allocator: IdAllocator::new(),
            restorer: EffectRestorer::new(),
            settings: UpkeepSettings::default(),
            forms,
            supervisor: UpkeepSupervisor::new(),
        }
    }

    fn split(&mut self) -> (&mut UpkeepSupervisor, TickContext<'_, SimHost>) {
        (
            &mut self.supervisor,
            TickContext {
                host: &mut self.host,
                registry: &mut self.registry,
                allocator: &mut self.allocator,
                restorer: &mut self.restorer,
                settings: &self.settings,
                forms: &self.forms,
            },
        )
    }

    /// Convert `base` and apply both abilities to the player.
    fn maintain(&mut self, base: FormId, is_conjure: bool) -> MaintainedPair {
        let factory = AbilityFactory { forms: &self.forms };
        let record = self.host.abilities[&base].clone();
        let converted = factory
            .create_converted(&mut self.host, &mut self.allocator, &record, None)
            .unwrap();
        let debuff = factory
            .create_debuff(&mut self.host, &mut self.allocator, &record, 12.0, None)
            .unwrap();
        self.host.add_ability(PLAYER, converted);
        self.host.add_ability(PLAYER, debuff);
        let pair = MaintainedPair::new(base, converted, debuff, is_conjure);
        self.registry.insert(pair.clone());
        pair
    }

    fn validate(&mut self) -> Vec<FormId> {
        let (sup, mut ctx) = self.split();
        sup.validate(&mut ctx, PLAYER)
    }

    fn watch(&mut self) {
        let (sup, mut ctx) = self.split();
        sup.update_conjure_watch(&mut ctx, PLAYER);
    }

    fn recasts(&mut self, elapsed: f32) {
        let (sup, mut ctx) = self.split();
        sup.update_recasts(&mut ctx, PLAYER, elapsed);
    }

    fn live_of(&mut self, ability: FormId) -> &mut crate::host::LiveEffect {
        self.host
            .actor_mut(PLAYER)
            .live
            .iter_mut()
            .find(|e| e.ability == ability)
            .unwrap()
    }
}

// ─── Non-conjure verdicts ────────────────────────────────────────────────────

#[test]
fn test_healthy_pair_survives() {
    let mut h = Harness::new();
    h.maintain(WARD, false);

    assert!(h.validate().is_empty());
    assert!(h.registry.has_base(WARD));
    assert!(h.host.notifications.is_empty());
}

#[test]
fn test_missing_converted_instance_removes_pair() {
    let mut h = Harness::new();
    let pair = h.maintain(WARD, false);
    h.host.expire_effects(PLAYER, pair.converted);

    assert_eq!(h.validate(), vec![WARD]);
    assert!(!h.registry.has_base(WARD));
    assert!(!h.allocator.is_allocated(pair.converted));
    assert!(!h.allocator.is_allocated(pair.debuff));
    assert!(!h.host.has_ability(PLAYER, pair.debuff));
    assert_eq!(h.host.notifications, vec!["Ward is no longer being maintained."]);
    assert!(h.host.toggle_list.is_empty());
}

#[test]
fn test_extra_instance_from_other_source_removes_pair() {
    let mut h = Harness::new();
    h.maintain(WARD, false);
    // The base cast again on top of the converted ability
    h.host.spawn_effect(PLAYER, WARD, 60.0);

    assert_eq!(h.validate(), vec![WARD], "Mismatched originating ability must invalidate");
}

/// Base with two sub-effects that each bring in their own form.
fn make_twin_aspect(h: &mut Harness) -> FormId {
    const WOLF_SETTING: FormId = FormId(0x1010);
    const BEAR_SETTING: FormId = FormId(0x1011);
    const TWIN: FormId = FormId(0x2010);
    h.host.define_setting(WOLF_SETTING, "Wolf Aspect", Archetype::ValueModifier).associated_form =
        Some(FormId(0x9100));
    h.host.define_setting(BEAR_SETTING, "Bear Aspect", Archetype::ValueModifier).associated_form =
        Some(FormId(0x9101));
    let mut twin = spell(TWIN, "Twin Aspect", WOLF_SETTING, 60.0);
    twin.effects.push(crate::host::SubEffect {
        setting: BEAR_SETTING,
        magnitude: 10.0,
        duration: 60.0,
    });
    h.host.define_ability(twin, 50.0);
    TWIN
}

#[test]
fn test_extra_instances_covering_every_form_are_valid() {
    let mut h = Harness::new();
    let twin = make_twin_aspect(&mut h);
    let pair = h.maintain(twin, false);
    h.host.spawn_effect(PLAYER, pair.converted, 0.0);

    assert_eq!(h.host.live_count(PLAYER, pair.converted), 4);
    assert!(h.validate().is_empty());
    assert!(h.registry.has_base(twin));
}

#[test]
fn test_extra_instances_missing_an_exclusive_form_remove_pair() {
    let mut h = Harness::new();
    let twin = make_twin_aspect(&mut h);
    let pair = h.maintain(twin, false);
    let wolf = h.host.abilities[&twin].effects[0].setting;
    h.host.spawn_effect(PLAYER, pair.converted, 0.0);
    // Every instance now carries the wolf form only
    for effect in h.host.actor_mut(PLAYER).live.iter_mut() {
        if effect.ability == pair.converted {
            effect.setting = wolf;
        }
    }

    assert_eq!(h.validate(), vec![twin], "Missing exclusive form must invalidate");
    assert!(!h.registry.has_base(twin));
    assert!(!h.allocator.is_allocated(pair.converted));
    assert!(!h.host.has_ability(PLAYER, pair.debuff));
    assert_eq!(h.host.notifications, vec!["Twin Aspect is no longer being maintained."]);
}

#[test]
fn test_zero_active_instances_removes_pair() {
    let mut h = Harness::new();
    let pair = h.maintain(WARD, false);
    h.live_of(pair.converted).dispelled = true;

    assert_eq!(h.validate(), vec![WARD]);
}

#[test]
fn test_finite_remaining_duration_removes_pair() {
    let mut h = Harness::new();
    let pair = h.maintain(WARD, false);
    h.live_of(pair.converted).duration = 60.0;

    assert_eq!(h.validate(), vec![WARD]);
}

#[test]
fn test_huge_remaining_duration_is_endless() {
    let mut h = Harness::new();
    let pair = h.maintain(WARD, false);
    h.live_of(pair.converted).duration = HUGE_REMAINING * 2.0;

    assert!(h.validate().is_empty());
}

#[test]
fn test_instant_dispel_removes_base_effect() {
    let mut h = Harness::new();
    h.settings.general.instant_dispel = true;
    let pair = h.maintain(WARD, false);
    h.host.expire_effects(PLAYER, pair.converted);
    h.host.spawn_effect(PLAYER, WARD, 60.0);
    h.host.spawn_effect(PLAYER, WARD, 60.0);

    h.validate();
    assert_eq!(h.host.live_count(PLAYER, WARD), 0);
}

#[test]
fn test_missing_debuff_skips_teardown() {
    let mut h = Harness::new();
    let pair = h.maintain(WARD, false);
    h.host.remove_ability(PLAYER, pair.debuff);
    h.host.expire_effects(PLAYER, pair.converted);

    assert_eq!(h.validate(), vec![WARD]);
    assert!(!h.registry.has_base(WARD));
    assert!(h.host.notifications.is_empty());
    assert!(
        h.allocator.is_allocated(pair.converted),
        "Ids are left for the reconcile sweep"
    );
}

#[test]
fn test_cleanup_request_purges_everything() {
    let mut h = Harness::new();
    h.maintain(WARD, false);
    h.maintain(SUMMON, true);
    h.host.cleanup_requested = true;

    let removed = h.validate();
    assert_eq!(removed.len(), 2);
    assert!(h.registry.is_empty());
    assert!(!h.host.cleanup_requested);
    assert_eq!(h.allocator.allocated_count(), 0);
}

#[test]
fn test_toggle_list_rebuilt_from_survivors() {
    let mut h = Harness::new();
    let ward = h.maintain(WARD, false);
    h.maintain(SUMMON, true);
    h.host.expire_effects(PLAYER, ward.converted);

    h.validate();
    assert_eq!(h.host.toggle_list, vec![SUMMON]);
}

// ─── Conjure verdicts ────────────────────────────────────────────────────────

#[test]
fn test_missing_conjure_schedules_exactly_one_recast() {
    let mut h = Harness::new();
    let pair = h.maintain(SUMMON, true);
    h.host.expire_effects(PLAYER, pair.converted);

    assert!(h.validate().is_empty());
    let queued = h.registry.get_by_base(SUMMON).unwrap().clone();
    assert!(queued.recast_queued);
    assert_eq!(queued.recast_remaining, 3.0);

    // A second pass must not re-arm the countdown
    h.registry.get_by_base_mut(SUMMON).unwrap().recast_remaining = 1.0;
    h.validate();
    assert_eq!(h.registry.get_by_base(SUMMON).unwrap().recast_remaining, 1.0);
}

#[test]
fn test_excess_conjure_instances_remove_pair() {
    let mut h = Harness::new();
    let pair = h.maintain(SUMMON, true);
    h.host.cast_immediate(PLAYER, pair.converted, None);

    assert_eq!(h.validate(), vec![SUMMON]);
}

#[test]
fn test_recast_fires_after_countdown() {
    let mut h = Harness::new();
    let pair = h.maintain(SUMMON, true);
    h.host.expire_effects(PLAYER, pair.converted);
    h.validate();

    for _ in 0..5 {
        h.recasts(0.5);
    }
    assert!(h.host.casts.is_empty(), "2.5s of a 3s delay");

    h.recasts(0.5);
    assert_eq!(h.host.casts, vec![(PLAYER, pair.converted, None)]);
    let after = h.registry.get_by_base(SUMMON).unwrap();
    assert!(!after.recast_queued);
    assert_eq!(h.host.live_count(PLAYER, pair.converted), 1);
    assert!(h.supervisor.eviction_window_open());
}

#[test]
fn test_recast_on_dead_actor_does_nothing() {
    let mut h = Harness::new();
    let pair = h.maintain(SUMMON, true);
    h.host.expire_effects(PLAYER, pair.converted);
    h.validate();
    h.host.actor_mut(PLAYER).dead = true;

    h.recasts(10.0);
    assert!(h.host.casts.is_empty());
    assert!(h.registry.get_by_base(SUMMON).unwrap().recast_queued);
}

#[test]
fn test_eviction_window_downgrades_vanished_conjure() {
    let mut h = Harness::new();
    let pair = h.maintain(SUMMON, true);
    {
        let (sup, mut ctx) = h.split();
        sup.open_eviction_window(&mut ctx, PLAYER);
    }

    h.watch();
    h.host.expire_effects(PLAYER, pair.converted);
    for _ in 1..EVICTION_WINDOW_TICKS {
        h.watch();
    }

    let after = h.registry.get_by_base(SUMMON).unwrap();
    assert!(!after.is_conjure, "Evicted conjure is downgraded");
    assert!(!after.recast_queued);
    assert!(!h.supervisor.eviction_window_open());
}

#[test]
fn test_surviving_conjure_keeps_kind() {
    let mut h = Harness::new();
    h.maintain(SUMMON, true);
    {
        let (sup, mut ctx) = h.split();
        sup.open_eviction_window(&mut ctx, PLAYER);
    }
    for _ in 0..EVICTION_WINDOW_TICKS {
        h.watch();
    }
    assert!(h.registry.get_by_base(SUMMON).unwrap().is_conjure);
    assert!(!h.supervisor.eviction_window_open());
}

// ─── Conjured weapons ────────────────────────────────────────────────────────

#[test]
fn test_held_bound_weapon_skips_checks() {
    let mut h = Harness::new();
    let pair = h.maintain(BLADE, false);
    h.host.expire_effects(PLAYER, pair.converted);
    h.host.set_equipped(PLAYER, Hand::Left, Equipped::Weapon(BLADE_WEAPON));

    assert!(h.validate().is_empty());
}

#[test]
fn test_selected_bound_weapon_with_debuff_is_valid() {
    let mut h = Harness::new();
    let pair = h.maintain(BLADE, false);
    h.host.expire_effects(PLAYER, pair.converted);
    h.host.set_selected(PLAYER, Hand::Right, Some(pair.converted));

    assert!(h.validate().is_empty());
}

#[test]
fn test_removed_bound_weapon_is_deferred_then_reequipped() {
    let mut h = Harness::new();
    let pair = h.maintain(BLADE, false);
    h.host.expire_effects(PLAYER, pair.converted);

    assert_eq!(h.validate(), vec![BLADE]);
    assert!(h.registry.is_deferred(pair.converted, BLADE));

    // The converted blade is still in the right hand's selection
    h.host.set_selected(PLAYER, Hand::Right, Some(pair.converted));
    h.validate();

    assert!(!h.registry.is_deferred(pair.converted, BLADE));
    assert_eq!(h.host.selected_ability(PLAYER, Hand::Right), Some(BLADE));
}

// ─── Backlash ────────────────────────────────────────────────────────────────

#[test]
fn test_negative_resource_triggers_backlash_once() {
    let mut h = Harness::new();
    let blade = h.maintain(BLADE, false);
    h.maintain(WARD, false);
    h.host.set_value(PLAYER, ActorValue::Magicka, -5.0);

    {
        let (sup, mut ctx) = h.split();
        assert!(sup.check_backlash(&mut ctx, PLAYER));
    }
    let backlash = h.forms.backlash;
    assert_eq!(h.host.casts, vec![(PLAYER, backlash, Some(24.0))]);
    assert!(h.registry.is_deferred(blade.converted, BLADE));

    let (sup, mut ctx) = h.split();
    assert!(!sup.check_backlash(&mut ctx, PLAYER), "Already suffering backlash");
}

#[test]
fn test_beast_form_is_spared_backlash() {
    let mut h = Harness::new();
    h.maintain(WARD, false);
    h.host.set_value(PLAYER, ActorValue::Magicka, -5.0);
    h.host.actor_mut(PLAYER).beast_form = true;

    let (sup, mut ctx) = h.split();
    assert!(!sup.check_backlash(&mut ctx, PLAYER));
}
