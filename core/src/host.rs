//! Host simulation interface
//!
//! The engine never owns abilities, effects or actors. It reads and mutates
//! them through the [`Host`] trait, and reports to the player through
//! [`Notifier`]. The records below are plain snapshots of what the host
//! exposes; identity is always by id.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 32-bit game form identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FormId(pub u32);

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(pub u32);

/// Handle of one running sub-effect instance on an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LiveEffectId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShaderId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const BOTH: [Hand; 2] = [Hand::Left, Hand::Right];
}

/// Primary behavior of an effect setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Archetype {
    ValueModifier,
    Light,
    BoundWeapon,
    Disguise,
    SummonCreature,
    NightEye,
    Invisibility,
    Guide,
    Werewolf,
    WerewolfFeed,
    Cloak,
    Other,
}

impl Archetype {
    /// Archetypes whose visuals carry gameplay feedback and must stay visible.
    pub fn is_never_silenced(self) -> bool {
        matches!(
            self,
            Archetype::Light
                | Archetype::BoundWeapon
                | Archetype::Disguise
                | Archetype::SummonCreature
                | Archetype::NightEye
                | Archetype::Invisibility
                | Archetype::Guide
                | Archetype::Werewolf
                | Archetype::WerewolfFeed
        )
    }
}

/// Four alpha ratios of a visual shader.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShaderAlpha {
    pub fill_persistent: f32,
    pub fill_full: f32,
    pub edge_persistent: f32,
    pub edge_full: f32,
}

impl ShaderAlpha {
    pub const ZERO: ShaderAlpha = ShaderAlpha {
        fill_persistent: 0.0,
        fill_full: 0.0,
        edge_persistent: 0.0,
        edge_full: 0.0,
    };
}

/// Shared definition behind one or more sub-effects.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectSetting {
    pub id: FormId,
    pub name: String,
    pub archetype: Archetype,
    /// Summoned weapon / creature / race the effect brings in, if any
    pub associated_form: Option<FormId>,
    /// "Persist visual" flag
    pub fx_persist: bool,
    pub shader: Option<ShaderId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubEffect {
    pub setting: FormId,
    pub magnitude: f32,
    /// Nominal duration in seconds
    pub duration: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbilityKind {
    Spell,
    /// Single-use consumable
    Scroll,
    /// Item enchantment
    Enchantment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastingMode {
    FireAndForget,
    Concentration,
    ConstantEffect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    OnSelf,
    Touch,
    Aimed,
    TargetActor,
    TargetLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquipSlot {
    Either,
    Left,
    Right,
    Voice,
}

/// Plugin file plus file-local id an ability was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub file: String,
    pub local_id: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ability {
    pub id: FormId,
    /// Display name
    pub name: String,
    pub editor_id: Option<String>,
    pub kind: AbilityKind,
    pub casting: CastingMode,
    pub delivery: Delivery,
    pub effects: Vec<SubEffect>,
    pub tags: BTreeSet<String>,
    /// Skill that receives experience for using this ability
    pub skill: Option<String>,
    pub equip_slot: Option<EquipSlot>,
    pub description: String,
    /// `None` for abilities created at runtime
    pub source: Option<SourceRef>,
}

impl Ability {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Nominal duration of the primary sub-effect
    pub fn nominal_duration(&self) -> f32 {
        self.effects.first().map(|e| e.duration).unwrap_or(0.0)
    }

    pub fn primary_setting(&self) -> Option<FormId> {
        self.effects.first().map(|e| e.setting)
    }
}

/// What an actor holds in one hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equipped {
    Nothing,
    Weapon(FormId),
    Ability(FormId),
    Other(FormId),
}

/// A running sub-effect instance on an actor.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEffect {
    pub id: LiveEffectId,
    /// Ability the instance originates from
    pub ability: FormId,
    pub setting: FormId,
    pub caster: Option<ActorId>,
    pub duration: f32,
    pub elapsed: f32,
    pub magnitude: f32,
    pub inactive: bool,
    pub dispelled: bool,
}

impl LiveEffect {
    pub fn remaining(&self) -> f32 {
        self.duration - self.elapsed
    }

    pub fn is_active(&self) -> bool {
        !self.inactive && !self.dispelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorValue {
    /// The resource abilities are paid with
    Magicka,
    /// Regeneration rate multiplier of that resource
    MagickaRate,
}

/// Player-facing message channel.
pub trait Notifier {
    /// Transient, non-blocking notification
    fn notify(&mut self, text: &str);
    /// Blocking modal message for problems the player must act on
    fn alert(&mut self, text: &str);
}

/// Everything the engine consumes from the host simulation.
pub trait Host: Notifier {
    // ─── Ability catalog ─────────────────────────────────────────────────────
    fn ability(&self, id: FormId) -> Option<&Ability>;
    fn ability_mut(&mut self, id: FormId) -> Option<&mut Ability>;
    fn ability_by_source(&self, file: &str, local_id: u32) -> Option<&Ability>;
    /// Register (or replace) a runtime-created ability record
    fn insert_ability(&mut self, ability: Ability);
    fn delete_ability(&mut self, id: FormId);
    /// Casting cost, with caster modifiers when `caster` is given
    fn ability_cost(&self, id: FormId, caster: Option<ActorId>) -> f32;

    // ─── Effect settings & visuals ───────────────────────────────────────────
    fn effect_setting(&self, id: FormId) -> Option<&EffectSetting>;
    fn set_fx_persist(&mut self, setting: FormId, persist: bool);
    fn shader_alpha(&self, shader: ShaderId) -> Option<ShaderAlpha>;
    fn set_shader_alpha(&mut self, shader: ShaderId, alpha: ShaderAlpha);

    // ─── Live effects ────────────────────────────────────────────────────────
    fn live_effects(&self, actor: ActorId) -> &[LiveEffect];
    fn reset_elapsed(&mut self, actor: ActorId, effect: LiveEffectId);

    // ─── Actor ───────────────────────────────────────────────────────────────
    fn equipped(&self, actor: ActorId, hand: Hand) -> Equipped;
    fn selected_ability(&self, actor: ActorId, hand: Hand) -> Option<FormId>;
    fn equip_ability(&mut self, actor: ActorId, ability: FormId, hand: Hand);
    fn has_ability(&self, actor: ActorId, ability: FormId) -> bool;
    fn add_ability(&mut self, actor: ActorId, ability: FormId);
    fn remove_ability(&mut self, actor: ActorId, ability: FormId);
    fn dispel(&mut self, actor: ActorId, ability: FormId);
    fn actor_value(&self, actor: ActorId, value: ActorValue) -> f32;
    fn restore_actor_value(&mut self, actor: ActorId, value: ActorValue, amount: f32);
    /// Cast immediately through the actor's own casting channel
    fn cast_immediate(&mut self, actor: ActorId, ability: FormId, magnitude: Option<f32>) -> bool;
    fn is_dead(&self, actor: ActorId) -> bool;
    fn is_beast_form(&self, actor: ActorId) -> bool;
    fn player(&self) -> ActorId;
    fn add_skill_experience(&mut self, actor: ActorId, skill: &str, amount: f32);

    // ─── Globals & UI ────────────────────────────────────────────────────────
    fn maintain_mode_enabled(&self) -> bool;
    fn cleanup_requested(&self) -> bool;
    fn clear_cleanup_request(&mut self);
    /// Replace the contents of the in-game toggle list
    fn set_toggle_list(&mut self, bases: &[FormId]);

    // ─── Save transport ──────────────────────────────────────────────────────
    /// Hand the encoded cosave record to the save being written
    fn write_cosave_record(&mut self, record: &[u8]);
}

/// Identifiers of the system-provided forms the engine relies on.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemForms {
    /// Template the debuff ability is cloned from
    pub debuff_template: FormId,
    /// Ability cast on the actor when upkeep drives the resource negative
    pub backlash: FormId,
    pub maintained_tag: String,
    pub excluded_tag: String,
    pub cloak_tag: String,
    /// Further tags that exclude an ability from conversion
    pub extra_excluded_tags: Vec<String>,
}

impl Default for SystemForms {
    fn default() -> Self {
        Self {
            debuff_template: FormId(0x0500_0802),
            backlash: FormId(0x0500_080D),
            maintained_tag: "MaintainedSpell".to_string(),
            excluded_tag: "ExcludeFromMaintain".to_string(),
            cloak_tag: "MagicCloak".to_string(),
            extra_excluded_tags: vec!["_m3HealerDummySpell".to_string()],
        }
    }
}

/// Name of the source file recorded for abilities with no backing file.
pub const VIRTUAL_SOURCE: &str = "VIRTUAL";

/// Whether the ability's primary sub-effect has the given archetype.
pub fn primary_archetype_is<H: Host + ?Sized>(host: &H, ability: &Ability, archetype: Archetype) -> bool {
    ability
        .primary_setting()
        .and_then(|id| host.effect_setting(id))
        .is_some_and(|s| s.archetype == archetype)
}

/// Whether any sub-effect of the ability has the given archetype.
pub fn any_archetype_is<H: Host + ?Sized>(host: &H, ability: &Ability, archetype: Archetype) -> bool {
    ability
        .effects
        .iter()
        .filter_map(|e| host.effect_setting(e.setting))
        .any(|s| s.archetype == archetype)
}
