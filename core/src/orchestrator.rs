//! Maintenance orchestrator
//!
//! Owns the engine state (registry, allocator, supervisor, restorer) and
//! exposes the entry points the host drives:
//!
//! - [`MaintenanceOrchestrator::on_ability_cast`] / [`MaintenanceOrchestrator::maintain_ability`]
//! - [`MaintenanceOrchestrator::tick`] on every frame
//! - [`MaintenanceOrchestrator::handle`] for game lifecycle events
//! - settings-menu hooks ([`MaintenanceOrchestrator::apply_setting_change`],
//!   [`MaintenanceOrchestrator::set_fx_enabled`],
//!   [`MaintenanceOrchestrator::settings_menu_closed`],
//!   [`MaintenanceOrchestrator::maintained_listing`])
//!
//! The host is passed into every call; the orchestrator never holds it.

use serde::Serialize;
use thiserror::Error;
use upkeep_types::{SettingChange, UpkeepSettings};

use crate::allocator::IdAllocator;
use crate::config::ConfigStore;
use crate::effects::{EffectRestorer, silencer};
use crate::experience::{EXPERIENCE_INTERVAL, award_experience};
use crate::factory::{AbilityFactory, FactoryError};
use crate::host::{
    ActorId, ActorValue, Archetype, Equipped, FormId, Hand, Host, SystemForms, any_archetype_is,
};
use crate::persistence::{
    CodecError, CosaveLocator, CosaveStore, PersistError, RestoreOutcome, restore_entries, snapshot,
};
use crate::policy::{CostCalculator, EligibilityPolicy, IneligibleReason};
use crate::registry::{MaintainedPair, MaintainedRegistry};
use crate::supervisor::{TickContext, UpkeepSupervisor, is_bound_weapon};

/// Seconds between eviction-watch ticks
pub const WATCH_INTERVAL: f32 = 0.1;
/// Seconds between validation passes
pub const VALIDATION_INTERVAL: f32 = 0.5;
/// Entries shown in the settings-menu listing
pub const LISTING_LIMIT: usize = 31;

const UNKNOWN_NAME: &str = "<Unknown Spell>";

#[derive(Debug, Error)]
pub enum MaintainError {
    #[error("cannot maintain {name}: {reason}")]
    Ineligible { name: String, reason: IneligibleReason },
    #[error("need {needed} to maintain, {available} available")]
    InsufficientResource { needed: f32, available: f32 },
    #[error("{0} is already maintained")]
    AlreadyMaintained(FormId),
    #[error("unknown ability {0}")]
    UnknownAbility(FormId),
    #[error(transparent)]
    Factory(#[from] FactoryError),
}

/// Game lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    DataLoaded,
    PreLoadGame { save_name: String },
    NewGame,
    PostLoadGame,
    SaveGame,
}

/// One row of the settings-menu listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub slot: usize,
    pub name: String,
    pub fx_enabled: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct TickTimers {
    watch: f32,
    validation: f32,
    experience: f32,
}

#[derive(Debug)]
pub struct MaintenanceOrchestrator {
    settings: UpkeepSettings,
    forms: SystemForms,
    registry: MaintainedRegistry,
    allocator: IdAllocator,
    supervisor: UpkeepSupervisor,
    restorer: EffectRestorer,
    config: Option<ConfigStore>,
    cosaves: CosaveStore,
    locator: CosaveLocator,
    timers: TickTimers,
}

impl MaintenanceOrchestrator {
    pub fn new(settings: UpkeepSettings, forms: SystemForms) -> Self {
        let locator = CosaveLocator::from_settings(&settings.diagnostics);
        Self {
            settings,
            forms,
            registry: MaintainedRegistry::new(),
            allocator: IdAllocator::new(),
            supervisor: UpkeepSupervisor::new(),
            restorer: EffectRestorer::new(),
            config: None,
            cosaves: CosaveStore::new(),
            locator,
            timers: TickTimers::default(),
        }
    }

    /// Persist settings and silenced names through `store`.
    pub fn with_config(mut self, store: ConfigStore) -> Self {
        self.config = Some(store);
        self
    }

    pub fn with_locator(mut self, locator: CosaveLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn settings(&self) -> &UpkeepSettings {
        &self.settings
    }

    pub fn registry(&self) -> &MaintainedRegistry {
        &self.registry
    }

    pub fn allocator(&self) -> &IdAllocator {
        &self.allocator
    }

    pub fn restorer(&self) -> &EffectRestorer {
        &self.restorer
    }

    pub fn supervisor(&self) -> &UpkeepSupervisor {
        &self.supervisor
    }

    fn split<'a, H: Host + ?Sized>(&'a mut self, host: &'a mut H) -> (&'a mut UpkeepSupervisor, TickContext<'a, H>) {
        (
            &mut self.supervisor,
            TickContext {
                host,
                registry: &mut self.registry,
                allocator: &mut self.allocator,
                restorer: &mut self.restorer,
                settings: &self.settings,
                forms: &self.forms,
            },
        )
    }

    // ─── Conversion ──────────────────────────────────────────────────────────

    /// Maintain `ability` when the player casts it with maintain mode on.
    /// Returns whether a conversion happened.
    pub fn on_ability_cast<H: Host + ?Sized>(&mut self, host: &mut H, actor: ActorId, ability: FormId) -> bool {
        if actor != host.player() || !host.maintain_mode_enabled() {
            return false;
        }
        if self.registry.is_converted(ability) {
            return false;
        }
        self.maintain_ability(host, ability, actor).is_ok()
    }

    /// Convert `base_id` into an endless ability plus cost debuff on `actor`.
    /// Returns the converted ability id.
    pub fn maintain_ability<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        base_id: FormId,
        actor: ActorId,
    ) -> Result<FormId, MaintainError> {
        let base = host
            .ability(base_id)
            .cloned()
            .ok_or(MaintainError::UnknownAbility(base_id))?;
        tracing::info!(ability = %base.name, id = %base.id, "Maintain requested");

        let policy = EligibilityPolicy {
            forms: &self.forms,
            allow_bound_weapons: self.settings.general.allow_bound_weapons,
            free_ids: self.allocator.free_count(),
        };
        if let Err(reason) = policy.check(&*host, &base, actor) {
            tracing::info!(ability = %base.name, %reason, "Ability not eligible");
            host.notify(&format!("Cannot maintain {}.", base.name));
            return Err(MaintainError::Ineligible {
                name: base.name.clone(),
                reason,
            });
        }

        let base_cost = host.ability_cost(base.id, Some(actor));
        let cost = CostCalculator::from(&self.settings.costs).calculate(&*host, &base, actor);
        let available = host.actor_value(actor, ActorValue::Magicka);
        if cost > available + base_cost {
            host.notify(&format!("Need {} Magicka to maintain {}.", cost as u32, base.name));
            return Err(MaintainError::InsufficientResource {
                needed: cost,
                available,
            });
        }

        if self.registry.has_base(base.id) {
            tracing::info!(ability = %base.name, "Already maintained");
            return Err(MaintainError::AlreadyMaintained(base.id));
        }

        let factory = AbilityFactory { forms: &self.forms };
        let converted = factory.create_converted(host, &mut self.allocator, &base, None)?;
        let debuff = match factory.create_debuff(host, &mut self.allocator, &base, cost, None) {
            Ok(id) => id,
            Err(e) => {
                self.allocator.free(converted);
                host.delete_ability(converted);
                return Err(e.into());
            }
        };

        host.dispel(actor, base.id);
        host.restore_actor_value(actor, ActorValue::Magicka, base_cost);

        let is_conjure = any_archetype_is(&*host, &base, Archetype::SummonCreature);
        if is_conjure {
            tracing::debug!(ability = %base.name, "Conjure conversion");
            let (supervisor, mut ctx) = self.split(host);
            supervisor.open_eviction_window(&mut ctx, actor);
        }

        let mut pair = MaintainedPair::new(base.id, converted, debuff, is_conjure);
        if self.settings.general.silence_fx || self.registry.is_silenced_ability(&base) {
            silencer::silence(host, &mut self.restorer, &mut pair);
        }

        if is_bound_weapon(&*host, base.id) {
            let held = Equipped::Ability(base.id);
            if host.equipped(actor, Hand::Left) == held {
                host.equip_ability(actor, converted, Hand::Left);
            } else if host.equipped(actor, Hand::Right) == held {
                host.equip_ability(actor, converted, Hand::Right);
            }
        } else {
            host.add_ability(actor, converted);
        }
        host.add_ability(actor, debuff);

        self.registry.insert(pair);
        host.set_toggle_list(&self.registry.bases());

        tracing::info!(ability = %base.name, %converted, %debuff, cost, "Maintaining ability");
        host.notify(&format!("Maintaining {} for {} Magicka.", base.name, cost as u32));
        Ok(converted)
    }

    /// Delete every derived ability and reset all engine state except the
    /// silenced-name set.
    pub fn purge_all<H: Host + ?Sized>(&mut self, host: &mut H) {
        tracing::info!(pairs = self.registry.len(), "Purging maintained abilities");
        for pair in self.registry.pairs() {
            host.delete_ability(pair.converted);
            host.delete_ability(pair.debuff);
        }
        host.set_toggle_list(&[]);
        self.registry.clear();
        self.allocator.clear();
        self.supervisor.clear_cache();
        self.restorer.clear();
    }

    /// Post-load pass: toggle list, debuff magnitudes, FX silencing.
    pub fn rebuild_after_load<H: Host + ?Sized>(&mut self, host: &mut H) {
        let player = host.player();
        host.set_toggle_list(&self.registry.bases());

        for pair in self.registry.sorted_pairs() {
            let magnitude = host
                .live_effects(player)
                .iter()
                .find(|e| e.ability == pair.debuff && e.caster == Some(player))
                .map(|e| e.magnitude.abs());
            let Some(magnitude) = magnitude else {
                continue;
            };
            if let Some(effect) = host.ability_mut(pair.debuff).and_then(|a| a.effects.first_mut()) {
                tracing::debug!(debuff = %pair.debuff, magnitude, "Restored debuff magnitude");
                effect.magnitude = magnitude;
            }
        }

        for base in self.registry.bases() {
            let silenced = self.settings.general.silence_fx
                || host
                    .ability(base)
                    .is_some_and(|a| self.registry.is_silenced_ability(a));
            if !silenced {
                continue;
            }
            if let Some(pair) = self.registry.get_by_base_mut(base) {
                tracing::debug!(base = %base, "Post-load silencing");
                silencer::silence(host, &mut self.restorer, pair);
            }
        }
    }

    // ─── Frame tick ──────────────────────────────────────────────────────────

    pub fn tick<H: Host + ?Sized>(&mut self, host: &mut H, delta: f32) {
        self.restorer.update(host, delta);

        self.timers.watch += delta;
        self.timers.validation += delta;
        self.timers.experience += delta;

        let actor = host.player();
        if self.timers.watch >= WATCH_INTERVAL {
            let (supervisor, mut ctx) = self.split(host);
            supervisor.update_conjure_watch(&mut ctx, actor);
            self.timers.watch = 0.0;
        }
        if self.timers.validation >= VALIDATION_INTERVAL {
            let elapsed = self.timers.validation;
            let (supervisor, mut ctx) = self.split(host);
            supervisor.validate(&mut ctx, actor);
            supervisor.check_backlash(&mut ctx, actor);
            supervisor.update_recasts(&mut ctx, actor, elapsed);
            self.timers.validation = 0.0;
        }
        if self.timers.experience >= EXPERIENCE_INTERVAL {
            award_experience(host, &self.registry, &self.settings, actor);
            let freed = self.allocator.reconcile(&self.registry.referenced_ids());
            if !freed.is_empty() {
                tracing::warn!(count = freed.len(), "Allocator held untracked identifiers");
            }
            self.timers.experience = 0.0;
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    pub fn handle<H: Host + ?Sized>(&mut self, host: &mut H, event: LifecycleEvent) {
        tracing::debug!(?event, "Lifecycle event");
        match event {
            LifecycleEvent::DataLoaded => self.load_configuration(),
            LifecycleEvent::PreLoadGame { save_name } => {
                self.purge_all(host);
                if let Err(e) = self.load_cosave(host, &save_name) {
                    tracing::warn!(save = %save_name, error = %e, "Cosave not restored");
                }
            }
            LifecycleEvent::NewGame => self.purge_all(host),
            LifecycleEvent::PostLoadGame => self.rebuild_after_load(host),
            LifecycleEvent::SaveGame => {
                if let Err(e) = self.save_game(host) {
                    tracing::error!(error = %e, "Failed to write cosave record");
                }
            }
        }
    }

    fn load_configuration(&mut self) {
        let Some(store) = &self.config else {
            return;
        };
        match store.load_settings() {
            Ok(settings) => {
                tracing::info!(path = %store.settings_path().display(), "Loaded settings");
                self.locator = CosaveLocator::from_settings(&settings.diagnostics);
                self.settings = settings;
            }
            Err(e) => tracing::warn!(error = %e, "Using current settings"),
        }
        match store.load_silenced() {
            Ok(names) => {
                self.registry.clear_silenced_names();
                for name in &names {
                    self.registry.add_silenced_name(name);
                }
                tracing::info!(count = names.len(), "Loaded silenced FX names");
            }
            Err(e) => tracing::warn!(error = %e, "Silenced FX names not loaded"),
        }
    }

    fn save_silenced_names(&self) {
        let Some(store) = &self.config else {
            return;
        };
        if let Err(e) = store.save_silenced(&self.registry.silenced_names()) {
            tracing::warn!(error = %e, "Failed to save silenced FX names");
        }
    }

    /// Read the cosave belonging to `save_name` and restore its pairs.
    pub fn load_cosave<H: Host + ?Sized>(&mut self, host: &mut H, save_name: &str) -> Result<RestoreOutcome, PersistError> {
        let path = self.locator.cosave_path(save_name, host)?;
        tracing::debug!(path = %path.display(), "Opening cosave");

        let entries = match self.cosaves.load(&path) {
            Ok(entries) => entries,
            Err(PersistError::MissingCosave(path)) => {
                tracing::info!(path = %path.display(), "No cosave found");
                host.alert(&format!(
                    "Unable to find the cosave for this save.\n\
                     Maintained abilities will be broken.\n\
                     Quit the game and fix this before continuing.\n\n{}",
                    path.display()
                ));
                return Err(PersistError::MissingCosave(path));
            }
            Err(PersistError::EmptyCosave(path)) => {
                tracing::warn!(path = %path.display(), "Cosave is empty");
                return Err(PersistError::EmptyCosave(path));
            }
            Err(PersistError::Codec(CodecError::HeaderNotFound)) => {
                tracing::info!("No maintained record in cosave");
                return Err(CodecError::HeaderNotFound.into());
            }
            Err(PersistError::Codec(e @ (CodecError::MalformedHeader { .. } | CodecError::Truncated { .. }))) => {
                tracing::error!(path = %path.display(), error = %e, "Maintained record rejected");
                host.alert(&format!(
                    "The maintained ability record in this cosave is damaged ({e}).\n\
                     Maintained abilities could not be restored.\n\n{}",
                    path.display()
                ));
                return Err(e.into());
            }
            Err(e) => return Err(e),
        };

        Ok(restore_entries(
            host,
            &mut self.registry,
            &mut self.allocator,
            &self.forms,
            &entries,
        ))
    }

    /// Encode the registry and hand it to the save transport.
    pub fn save_game<H: Host + ?Sized>(&mut self, host: &mut H) -> Result<usize, PersistError> {
        self.save_silenced_names();
        let entries = snapshot(&*host, &self.registry);
        let record = self.cosaves.encode(&entries)?;
        host.write_cosave_record(&record);
        tracing::info!(entries = entries.len(), bytes = record.len(), "Cosave record written");
        Ok(record.len())
    }

    // ─── Settings menu ───────────────────────────────────────────────────────

    pub fn apply_setting_change(&mut self, id: &str, value: f32) -> SettingChange {
        let change = self.settings.apply_change(id, value);
        match change {
            SettingChange::Applied => tracing::debug!(id, value, "Setting changed"),
            SettingChange::UnknownId => tracing::warn!(id, "Unknown setting id"),
        }
        change
    }

    /// Record a per-name FX choice. Applied when the menu closes.
    pub fn set_fx_enabled(&mut self, name: &str, enabled: bool) {
        if name.is_empty() {
            return;
        }
        tracing::debug!(name, enabled, "FX choice");
        if enabled {
            self.registry.remove_silenced_name(name);
        } else {
            self.registry.add_silenced_name(name);
        }
    }

    /// Persist the silenced names and bring every pair's visuals in line.
    pub fn settings_menu_closed<H: Host + ?Sized>(&mut self, host: &mut H) {
        self.save_silenced_names();

        let global = self.settings.general.silence_fx;
        for base in self.registry.bases() {
            let named = host
                .ability(base)
                .is_some_and(|a| self.registry.is_silenced_ability(a));
            let Some(pair) = self.registry.get_by_base_mut(base) else {
                continue;
            };
            if global || named {
                silencer::silence(host, &mut self.restorer, pair);
            } else {
                silencer::unsilence(host, pair);
            }
        }
    }

    /// Up to [`LISTING_LIMIT`] maintained abilities, ordered by base id.
    pub fn maintained_listing<H: Host + ?Sized>(&self, host: &H) -> Vec<ListingEntry> {
        self.registry
            .bases()
            .into_iter()
            .take(LISTING_LIMIT)
            .enumerate()
            .map(|(index, base)| {
                let name = host
                    .ability(base)
                    .map_or_else(|| UNKNOWN_NAME.to_string(), |a| a.name.clone());
                let fx_enabled = !self.registry.is_silenced(&name);
                ListingEntry {
                    slot: index + 1,
                    name,
                    fx_enabled,
                }
            })
            .collect()
    }
}
