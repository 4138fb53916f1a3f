//! Construction of converted and debuff abilities
//!
//! Both derived abilities are registered with the host under identifiers
//! drawn from the [`IdAllocator`]. An explicit identifier is reserved
//! exactly instead (restore path). No host record is created unless the
//! identifier was obtained.

use thiserror::Error;

use crate::allocator::{AllocationError, IdAllocator};
use crate::host::{Ability, AbilityKind, Archetype, CastingMode, Delivery, EquipSlot, FormId, Host, SystemForms};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FactoryError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error("debuff template {0} is missing or has no effects")]
    MissingTemplate(FormId),
}

#[derive(Debug, Clone, Copy)]
pub struct AbilityFactory<'a> {
    pub forms: &'a SystemForms,
}

fn reserve(allocator: &mut IdAllocator, explicit: Option<FormId>) -> Result<FormId, AllocationError> {
    match explicit {
        Some(id) => allocator.allocate_specific(id),
        None => allocator.allocate(),
    }
}

pub fn maintained_name(base: &Ability) -> String {
    format!("Maintained {}", base.name)
}

impl AbilityFactory<'_> {
    /// Build the endless counterpart of `base`.
    pub fn create_converted<H: Host + ?Sized>(
        &self,
        host: &mut H,
        allocator: &mut IdAllocator,
        base: &Ability,
        explicit: Option<FormId>,
    ) -> Result<FormId, FactoryError> {
        let id = reserve(allocator, explicit).inspect_err(|e| {
            tracing::error!(base = %base.id, error = %e, free = allocator.free_count(), "Failed to allocate converted id");
        })?;

        let mut tags = base.tags.clone();
        tags.insert(self.forms.maintained_tag.clone());
        let has_cloak = base
            .effects
            .iter()
            .filter_map(|e| host.effect_setting(e.setting))
            .any(|s| s.archetype == Archetype::Cloak);
        if has_cloak {
            tags.insert(self.forms.cloak_tag.clone());
        }

        host.insert_ability(Ability {
            id,
            name: maintained_name(base),
            editor_id: None,
            kind: AbilityKind::Spell,
            casting: CastingMode::ConstantEffect,
            delivery: Delivery::OnSelf,
            effects: base.effects.clone(),
            tags,
            skill: base.skill.clone(),
            equip_slot: base.equip_slot,
            description: base.description.clone(),
            source: None,
        });
        tracing::debug!(base = %base.id, converted = %id, "Created converted ability");
        Ok(id)
    }

    /// Build the cost debuff for `base` from the system template.
    pub fn create_debuff<H: Host + ?Sized>(
        &self,
        host: &mut H,
        allocator: &mut IdAllocator,
        base: &Ability,
        magnitude: f32,
        explicit: Option<FormId>,
    ) -> Result<FormId, FactoryError> {
        let template_id = self.forms.debuff_template;
        let mut effect = host
            .ability(template_id)
            .and_then(|t| t.effects.first().cloned())
            .ok_or(FactoryError::MissingTemplate(template_id))?;
        effect.magnitude = magnitude;

        let id = reserve(allocator, explicit).inspect_err(|e| {
            tracing::error!(base = %base.id, error = %e, free = allocator.free_count(), "Failed to allocate debuff id");
        })?;

        host.insert_ability(Ability {
            id,
            name: maintained_name(base),
            editor_id: None,
            kind: AbilityKind::Spell,
            casting: CastingMode::ConstantEffect,
            delivery: Delivery::OnSelf,
            effects: vec![effect],
            tags: [self.forms.maintained_tag.clone()].into_iter().collect(),
            skill: None,
            equip_slot: Some(EquipSlot::Voice),
            description: String::new(),
            source: None,
        });
        tracing::debug!(base = %base.id, debuff = %id, magnitude, "Created debuff ability");
        Ok(id)
    }
}
