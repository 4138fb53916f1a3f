//! Mapping between the registry and persisted entries.

use thiserror::Error;

use crate::allocator::{AllocationError, IdAllocator};
use crate::factory::{AbilityFactory, FactoryError};
use crate::host::{Ability, Archetype, FormId, Host, SystemForms, VIRTUAL_SOURCE, any_archetype_is};
use crate::registry::{MaintainedPair, MaintainedRegistry};

use super::codec::PersistedEntry;

/// Why a single persisted entry was not restored.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RestoreSkip {
    #[error("no ability {id:#x} in {file}")]
    UnresolvableSource { file: String, id: u32 },
    #[error("{0} is already maintained")]
    AlreadyMaintained(FormId),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error("debuff template {0} is missing")]
    MissingTemplate(FormId),
}

impl From<FactoryError> for RestoreSkip {
    fn from(err: FactoryError) -> Self {
        match err {
            FactoryError::Allocation(e) => RestoreSkip::Allocation(e),
            FactoryError::MissingTemplate(id) => RestoreSkip::MissingTemplate(id),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RestoreOutcome {
    pub restored: Vec<FormId>,
    /// Index into the persisted entries plus the reason
    pub skipped: Vec<(usize, RestoreSkip)>,
}

/// Persisted form of every registry pair, ordered by base id.
pub fn snapshot<H: Host + ?Sized>(host: &H, registry: &MaintainedRegistry) -> Vec<PersistedEntry> {
    registry
        .sorted_pairs()
        .into_iter()
        .map(|pair| {
            let (source, base_id) = match host.ability(pair.base).and_then(|a| a.source.as_ref()) {
                Some(src) => (src.file.clone(), src.local_id),
                None => (VIRTUAL_SOURCE.to_string(), pair.base.0),
            };
            PersistedEntry {
                source,
                base_id,
                converted: pair.converted,
                debuff: pair.debuff,
            }
        })
        .collect()
}

/// Rebuild registry pairs from persisted entries.
///
/// Every entry is attempted; a failing entry is skipped and reported.
/// Debuff magnitudes start at zero until the post-load pass reads them back
/// from the live instances.
pub fn restore_entries<H: Host + ?Sized>(
    host: &mut H,
    registry: &mut MaintainedRegistry,
    allocator: &mut IdAllocator,
    forms: &SystemForms,
    entries: &[PersistedEntry],
) -> RestoreOutcome {
    let mut outcome = RestoreOutcome::default();
    for (index, entry) in entries.iter().enumerate() {
        match restore_one(host, registry, allocator, forms, entry) {
            Ok(base) => outcome.restored.push(base),
            Err(reason) => {
                tracing::warn!(index, source = %entry.source, base_id = entry.base_id, %reason, "Skipped persisted entry");
                outcome.skipped.push((index, reason));
            }
        }
    }
    tracing::info!(restored = outcome.restored.len(), skipped = outcome.skipped.len(), "Restored maintained abilities");
    outcome
}

fn explicit(id: FormId) -> Option<FormId> {
    (id.0 != 0).then_some(id)
}

fn resolve_base<H: Host + ?Sized>(host: &H, entry: &PersistedEntry) -> Option<Ability> {
    let found = if entry.is_virtual() {
        host.ability(FormId(entry.base_id))
    } else {
        host.ability_by_source(&entry.source, entry.base_id)
    };
    found.cloned()
}

fn restore_one<H: Host + ?Sized>(
    host: &mut H,
    registry: &mut MaintainedRegistry,
    allocator: &mut IdAllocator,
    forms: &SystemForms,
    entry: &PersistedEntry,
) -> Result<FormId, RestoreSkip> {
    let base = resolve_base(&*host, entry).ok_or_else(|| RestoreSkip::UnresolvableSource {
        file: entry.source.clone(),
        id: entry.base_id,
    })?;
    if registry.has_base(base.id) {
        return Err(RestoreSkip::AlreadyMaintained(base.id));
    }

    let factory = AbilityFactory { forms };
    let converted = factory.create_converted(host, allocator, &base, explicit(entry.converted))?;
    let debuff = match factory.create_debuff(host, allocator, &base, 0.0, explicit(entry.debuff)) {
        Ok(id) => id,
        Err(e) => {
            allocator.free(converted);
            host.delete_ability(converted);
            return Err(e.into());
        }
    };

    let is_conjure = any_archetype_is(&*host, &base, Archetype::SummonCreature);
    registry.insert(MaintainedPair::new(base.id, converted, debuff, is_conjure));
    tracing::debug!(base = %base.id, %converted, %debuff, is_conjure, "Restored pair");
    Ok(base.id)
}
