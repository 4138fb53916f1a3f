//! In-memory host simulation
//!
//! A small, deterministic stand-in for the game session. It applies the
//! same coarse rules the real host does (constant-effect abilities produce
//! endless live instances, casting produces timed ones, equipping a
//! conjured-weapon ability puts the weapon in hand) and records every
//! notification, alert and cast so tests and the scenario runner can
//! inspect them.

use std::collections::{BTreeMap, BTreeSet};

use crate::host::{
    Ability, AbilityKind, ActorId, ActorValue, Archetype, CastingMode, Delivery, EffectSetting,
    Equipped, FormId, Hand, Host, LiveEffect, LiveEffectId, Notifier, ShaderAlpha, ShaderId,
    SubEffect, SystemForms,
};

pub const PLAYER: ActorId = ActorId(0x14);

const DEBUFF_SETTING: FormId = FormId(0x0500_0803);
const BACKLASH_SETTING: FormId = FormId(0x0500_080E);

#[derive(Debug, Clone)]
pub struct SimActor {
    pub live: Vec<LiveEffect>,
    pub added: BTreeSet<FormId>,
    pub left: Equipped,
    pub right: Equipped,
    pub selected_left: Option<FormId>,
    pub selected_right: Option<FormId>,
    pub values: BTreeMap<&'static str, f32>,
    /// Caster-side cost multiplier (perks, gear)
    pub cost_multiplier: f32,
    pub dead: bool,
    pub beast_form: bool,
    pub experience: BTreeMap<String, f32>,
}

impl Default for SimActor {
    fn default() -> Self {
        let mut values = BTreeMap::new();
        values.insert(value_key(ActorValue::Magicka), 100.0);
        values.insert(value_key(ActorValue::MagickaRate), 0.0);
        Self {
            live: Vec::new(),
            added: BTreeSet::new(),
            left: Equipped::Nothing,
            right: Equipped::Nothing,
            selected_left: None,
            selected_right: None,
            values,
            cost_multiplier: 1.0,
            dead: false,
            beast_form: false,
            experience: BTreeMap::new(),
        }
    }
}

fn value_key(value: ActorValue) -> &'static str {
    match value {
        ActorValue::Magicka => "magicka",
        ActorValue::MagickaRate => "magicka_rate",
    }
}

/// Deterministic host used by tests and the scenario runner.
#[derive(Debug, Clone)]
pub struct SimHost {
    pub abilities: BTreeMap<FormId, Ability>,
    pub settings: BTreeMap<FormId, EffectSetting>,
    pub shaders: BTreeMap<ShaderId, ShaderAlpha>,
    pub base_costs: BTreeMap<FormId, f32>,
    pub actors: BTreeMap<ActorId, SimActor>,
    pub player: ActorId,
    pub maintain_mode: bool,
    pub cleanup_requested: bool,
    pub toggle_list: Vec<FormId>,
    pub notifications: Vec<String>,
    pub alerts: Vec<String>,
    pub casts: Vec<(ActorId, FormId, Option<f32>)>,
    /// Last record handed over by a save
    pub cosave_record: Option<Vec<u8>>,
    pub forms: SystemForms,
    next_effect: u64,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    /// Host with a living player and the system template forms defined.
    pub fn new() -> Self {
        let forms = SystemForms::default();
        let mut host = Self {
            abilities: BTreeMap::new(),
            settings: BTreeMap::new(),
            shaders: BTreeMap::new(),
            base_costs: BTreeMap::new(),
            actors: BTreeMap::new(),
            player: PLAYER,
            maintain_mode: true,
            cleanup_requested: false,
            toggle_list: Vec::new(),
            notifications: Vec::new(),
            alerts: Vec::new(),
            casts: Vec::new(),
            cosave_record: None,
            forms: forms.clone(),
            next_effect: 1,
        };
        host.actors.insert(PLAYER, SimActor::default());

        host.define_setting(DEBUFF_SETTING, "Upkeep Drain", Archetype::ValueModifier);
        let mut template = spell(forms.debuff_template, "Upkeep", DEBUFF_SETTING, 0.0);
        template.casting = CastingMode::ConstantEffect;
        template.effects[0].magnitude = 0.0;
        host.abilities.insert(template.id, template);

        host.define_setting(BACKLASH_SETTING, "Backlash", Archetype::ValueModifier);
        let backlash = spell(forms.backlash, "Backlash", BACKLASH_SETTING, 10.0);
        host.abilities.insert(backlash.id, backlash);
        host
    }

    // ─── Fixture helpers ─────────────────────────────────────────────────────

    pub fn define_setting(&mut self, id: FormId, name: &str, archetype: Archetype) -> &mut EffectSetting {
        let slot = self.settings.entry(id).or_insert_with(|| blank_setting(id));
        *slot = EffectSetting {
            name: name.to_string(),
            archetype,
            ..blank_setting(id)
        };
        slot
    }

    /// Register a base ability with the given uncapped casting cost.
    pub fn define_ability(&mut self, ability: Ability, cost: f32) {
        self.base_costs.insert(ability.id, cost);
        self.abilities.insert(ability.id, ability);
    }

    pub fn actor_mut(&mut self, actor: ActorId) -> &mut SimActor {
        self.actors.entry(actor).or_default()
    }

    pub fn set_value(&mut self, actor: ActorId, value: ActorValue, amount: f32) {
        self.actor_mut(actor).values.insert(value_key(value), amount);
    }

    /// Place a timed live instance of `ability` on the actor, as a normal cast would.
    pub fn spawn_effect(&mut self, actor: ActorId, ability: FormId, duration: f32) -> Vec<LiveEffectId> {
        let Some(record) = self.abilities.get(&ability) else {
            return Vec::new();
        };
        let effects = record.effects.clone();
        effects
            .iter()
            .map(|sub| self.push_live(actor, ability, sub, duration, None))
            .collect()
    }

    /// Drop every live instance originating from `ability`.
    pub fn expire_effects(&mut self, actor: ActorId, ability: FormId) {
        self.actor_mut(actor).live.retain(|e| e.ability != ability);
    }

    pub fn live_count(&self, actor: ActorId, ability: FormId) -> usize {
        self.live_effects(actor)
            .iter()
            .filter(|e| e.ability == ability)
            .count()
    }

    pub fn set_equipped(&mut self, actor: ActorId, hand: Hand, item: Equipped) {
        let a = self.actor_mut(actor);
        match hand {
            Hand::Left => a.left = item,
            Hand::Right => a.right = item,
        }
    }

    pub fn set_selected(&mut self, actor: ActorId, hand: Hand, ability: Option<FormId>) {
        let a = self.actor_mut(actor);
        match hand {
            Hand::Left => a.selected_left = ability,
            Hand::Right => a.selected_right = ability,
        }
    }

    fn push_live(
        &mut self,
        actor: ActorId,
        ability: FormId,
        sub: &SubEffect,
        duration: f32,
        magnitude: Option<f32>,
    ) -> LiveEffectId {
        let id = LiveEffectId(self.next_effect);
        self.next_effect += 1;
        self.actor_mut(actor).live.push(LiveEffect {
            id,
            ability,
            setting: sub.setting,
            caster: Some(actor),
            duration,
            elapsed: 0.0,
            magnitude: magnitude.unwrap_or(sub.magnitude),
            inactive: false,
            dispelled: false,
        });
        id
    }

    fn apply_constant(&mut self, actor: ActorId, ability: FormId) {
        let Some(record) = self.abilities.get(&ability) else {
            return;
        };
        if record.casting != CastingMode::ConstantEffect {
            return;
        }
        let effects = record.effects.clone();
        for sub in &effects {
            self.push_live(actor, ability, sub, 0.0, None);
        }
    }
}

fn blank_setting(id: FormId) -> EffectSetting {
    EffectSetting {
        id,
        name: String::new(),
        archetype: Archetype::Other,
        associated_form: None,
        fx_persist: false,
        shader: None,
    }
}

/// Fire-and-forget, self-delivered spell with one sub-effect.
pub fn spell(id: FormId, name: &str, setting: FormId, duration: f32) -> Ability {
    Ability {
        id,
        name: name.to_string(),
        editor_id: None,
        kind: AbilityKind::Spell,
        casting: CastingMode::FireAndForget,
        delivery: Delivery::OnSelf,
        effects: vec![SubEffect {
            setting,
            magnitude: 10.0,
            duration,
        }],
        tags: BTreeSet::new(),
        skill: Some("Alteration".to_string()),
        equip_slot: None,
        description: String::new(),
        source: None,
    }
}

impl Notifier for SimHost {
    fn notify(&mut self, text: &str) {
        self.notifications.push(text.to_string());
    }

    fn alert(&mut self, text: &str) {
        self.alerts.push(text.to_string());
    }
}

impl Host for SimHost {
    fn ability(&self, id: FormId) -> Option<&Ability> {
        self.abilities.get(&id)
    }

    fn ability_mut(&mut self, id: FormId) -> Option<&mut Ability> {
        self.abilities.get_mut(&id)
    }

    fn ability_by_source(&self, file: &str, local_id: u32) -> Option<&Ability> {
        self.abilities.values().find(|a| {
            a.source
                .as_ref()
                .is_some_and(|s| s.file.eq_ignore_ascii_case(file) && s.local_id == local_id)
        })
    }

    fn insert_ability(&mut self, ability: Ability) {
        self.abilities.insert(ability.id, ability);
    }

    fn delete_ability(&mut self, id: FormId) {
        self.abilities.remove(&id);
        self.base_costs.remove(&id);
    }

    fn ability_cost(&self, id: FormId, caster: Option<ActorId>) -> f32 {
        let base = self.base_costs.get(&id).copied().unwrap_or(0.0);
        let multiplier = caster
            .and_then(|c| self.actors.get(&c))
            .map(|a| a.cost_multiplier)
            .unwrap_or(1.0);
        base * multiplier
    }

    fn effect_setting(&self, id: FormId) -> Option<&EffectSetting> {
        self.settings.get(&id)
    }

    fn set_fx_persist(&mut self, setting: FormId, persist: bool) {
        if let Some(s) = self.settings.get_mut(&setting) {
            s.fx_persist = persist;
        }
    }

    fn shader_alpha(&self, shader: ShaderId) -> Option<ShaderAlpha> {
        self.shaders.get(&shader).copied()
    }

    fn set_shader_alpha(&mut self, shader: ShaderId, alpha: ShaderAlpha) {
        self.shaders.insert(shader, alpha);
    }

    fn live_effects(&self, actor: ActorId) -> &[LiveEffect] {
        self.actors
            .get(&actor)
            .map(|a| a.live.as_slice())
            .unwrap_or(&[])
    }

    fn reset_elapsed(&mut self, actor: ActorId, effect: LiveEffectId) {
        if let Some(e) = self.actor_mut(actor).live.iter_mut().find(|e| e.id == effect) {
            e.elapsed = 0.0;
        }
    }

    fn equipped(&self, actor: ActorId, hand: Hand) -> Equipped {
        self.actors
            .get(&actor)
            .map(|a| match hand {
                Hand::Left => a.left,
                Hand::Right => a.right,
            })
            .unwrap_or(Equipped::Nothing)
    }

    fn selected_ability(&self, actor: ActorId, hand: Hand) -> Option<FormId> {
        self.actors.get(&actor).and_then(|a| match hand {
            Hand::Left => a.selected_left,
            Hand::Right => a.selected_right,
        })
    }

    fn equip_ability(&mut self, actor: ActorId, ability: FormId, hand: Hand) {
        let weapon = self.abilities.get(&ability).and_then(|a| {
            a.effects
                .iter()
                .filter_map(|e| self.settings.get(&e.setting))
                .find(|s| s.archetype == Archetype::BoundWeapon)
                .and_then(|s| s.associated_form)
        });
        let constant = self
            .abilities
            .get(&ability)
            .is_some_and(|a| a.casting == CastingMode::ConstantEffect);

        self.set_selected(actor, hand, Some(ability));
        match (constant, weapon) {
            (true, Some(weapon)) => self.set_equipped(actor, hand, Equipped::Weapon(weapon)),
            _ => self.set_equipped(actor, hand, Equipped::Ability(ability)),
        }
        if constant {
            self.apply_constant(actor, ability);
        }
    }

    fn has_ability(&self, actor: ActorId, ability: FormId) -> bool {
        self.actors
            .get(&actor)
            .is_some_and(|a| a.added.contains(&ability))
    }

    fn add_ability(&mut self, actor: ActorId, ability: FormId) {
        if self.actor_mut(actor).added.insert(ability) {
            self.apply_constant(actor, ability);
        }
    }

    fn remove_ability(&mut self, actor: ActorId, ability: FormId) {
        let a = self.actor_mut(actor);
        a.added.remove(&ability);
        a.live.retain(|e| e.ability != ability);
    }

    fn dispel(&mut self, actor: ActorId, ability: FormId) {
        self.expire_effects(actor, ability);
    }

    fn actor_value(&self, actor: ActorId, value: ActorValue) -> f32 {
        self.actors
            .get(&actor)
            .and_then(|a| a.values.get(value_key(value)).copied())
            .unwrap_or(0.0)
    }

    fn restore_actor_value(&mut self, actor: ActorId, value: ActorValue, amount: f32) {
        *self
            .actor_mut(actor)
            .values
            .entry(value_key(value))
            .or_insert(0.0) += amount;
    }

    fn cast_immediate(&mut self, actor: ActorId, ability: FormId, magnitude: Option<f32>) -> bool {
        if self.actors.get(&actor).is_none_or(|a| a.dead) {
            return false;
        }
        let Some(record) = self.abilities.get(&ability) else {
            return false;
        };
        let constant = record.casting == CastingMode::ConstantEffect;
        let effects = record.effects.clone();
        for sub in &effects {
            let duration = if constant { 0.0 } else { sub.duration };
            self.push_live(actor, ability, sub, duration, magnitude);
        }
        self.casts.push((actor, ability, magnitude));
        true
    }

    fn is_dead(&self, actor: ActorId) -> bool {
        self.actors.get(&actor).is_none_or(|a| a.dead)
    }

    fn is_beast_form(&self, actor: ActorId) -> bool {
        self.actors.get(&actor).is_some_and(|a| a.beast_form)
    }

    fn player(&self) -> ActorId {
        self.player
    }

    fn add_skill_experience(&mut self, actor: ActorId, skill: &str, amount: f32) {
        *self
            .actor_mut(actor)
            .experience
            .entry(skill.to_string())
            .or_insert(0.0) += amount;
    }

    fn maintain_mode_enabled(&self) -> bool {
        self.maintain_mode
    }

    fn cleanup_requested(&self) -> bool {
        self.cleanup_requested
    }

    fn clear_cleanup_request(&mut self) {
        self.cleanup_requested = false;
    }

    fn set_toggle_list(&mut self, bases: &[FormId]) {
        self.toggle_list = bases.to_vec();
    }

    fn write_cosave_record(&mut self, record: &[u8]) {
        self.cosave_record = Some(record.to_vec());
    }
}
