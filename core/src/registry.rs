//! Authoritative table of maintained conversions
//!
//! ```text
//!   base ──► MaintainedPair { converted, debuff, silenced FX, recast state }
//!   converted ──► base          (reverse index, kept in sync by insert/erase)
//! ```
//!
//! The registry also owns the deferred re-equip set and the set of ability
//! names whose visuals the player chose to keep silenced.

use std::collections::BTreeSet;

use hashbrown::{HashMap, HashSet};

use crate::host::{Ability, FormId, ShaderAlpha, ShaderId};

/// How a single sub-effect's visuals were suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceMode {
    /// The setting's persist-visual flag was cleared
    PersistToggle,
    /// The setting's shader alpha ratios were zeroed
    ShaderFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SilencedEffectRecord {
    pub setting: FormId,
    pub mode: SilenceMode,
    /// Persist flag value before silencing (PersistToggle)
    pub had_flag_set: bool,
    pub shader: Option<ShaderId>,
    /// Captured alpha ratios (ShaderFallback); `None` marks the snapshot invalid
    pub alpha_snapshot: Option<ShaderAlpha>,
}

/// One base ability converted into a maintained ability plus its cost debuff.
#[derive(Debug, Clone, PartialEq)]
pub struct MaintainedPair {
    pub base: FormId,
    pub converted: FormId,
    pub debuff: FormId,
    pub silenced_effects: Vec<SilencedEffectRecord>,
    /// Base ability summons a creature
    pub is_conjure: bool,
    pub recast_queued: bool,
    pub recast_remaining: f32,
}

impl MaintainedPair {
    pub fn new(base: FormId, converted: FormId, debuff: FormId, is_conjure: bool) -> Self {
        Self {
            base,
            converted,
            debuff,
            silenced_effects: Vec::new(),
            is_conjure,
            recast_queued: false,
            recast_remaining: 0.0,
        }
    }

    pub fn has_silenced_fx(&self) -> bool {
        !self.silenced_effects.is_empty()
    }

    pub fn needs_recast_update(&self) -> bool {
        self.is_conjure && self.recast_queued
    }

    pub fn queue_recast(&mut self, delay: f32) {
        self.recast_queued = true;
        self.recast_remaining = delay;
    }

    pub fn cancel_recast(&mut self) {
        self.recast_queued = false;
        self.recast_remaining = 0.0;
    }
}

#[derive(Debug, Default)]
pub struct MaintainedRegistry {
    pairs: HashMap<FormId, MaintainedPair>,
    by_converted: HashMap<FormId, FormId>,
    /// (converted, base) awaiting a hand re-equip
    deferred: BTreeSet<(FormId, FormId)>,
    silenced_names: HashSet<String>,
}

impl MaintainedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Pairs ───────────────────────────────────────────────────────────────

    /// Insert a pair, replacing any existing entry for the same base.
    pub fn insert(&mut self, pair: MaintainedPair) {
        if let Some(old) = self.pairs.remove(&pair.base) {
            self.by_converted.remove(&old.converted);
        }
        self.by_converted.insert(pair.converted, pair.base);
        self.pairs.insert(pair.base, pair);
    }

    pub fn erase_by_base(&mut self, base: FormId) -> Option<MaintainedPair> {
        let pair = self.pairs.remove(&base)?;
        self.by_converted.remove(&pair.converted);
        Some(pair)
    }

    pub fn get_by_base(&self, base: FormId) -> Option<&MaintainedPair> {
        self.pairs.get(&base)
    }

    pub fn get_by_base_mut(&mut self, base: FormId) -> Option<&mut MaintainedPair> {
        self.pairs.get_mut(&base)
    }

    pub fn base_of_converted(&self, converted: FormId) -> Option<FormId> {
        self.by_converted.get(&converted).copied()
    }

    pub fn has_base(&self, base: FormId) -> bool {
        self.pairs.contains_key(&base)
    }

    pub fn is_converted(&self, id: FormId) -> bool {
        self.by_converted.contains_key(&id)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &MaintainedPair> {
        self.pairs.values()
    }

    pub fn pairs_mut(&mut self) -> impl Iterator<Item = &mut MaintainedPair> {
        self.pairs.values_mut()
    }

    /// Base ids in ascending order
    pub fn bases(&self) -> Vec<FormId> {
        let mut bases: Vec<FormId> = self.pairs.keys().copied().collect();
        bases.sort_unstable();
        bases
    }

    /// Pairs ordered by base id
    pub fn sorted_pairs(&self) -> Vec<&MaintainedPair> {
        let mut pairs: Vec<&MaintainedPair> = self.pairs.values().collect();
        pairs.sort_unstable_by_key(|p| p.base);
        pairs
    }

    /// Every converted and debuff identifier still referenced
    pub fn referenced_ids(&self) -> HashSet<FormId> {
        self.pairs
            .values()
            .flat_map(|p| [p.converted, p.debuff])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Drop every pair and deferred action. Silenced names survive.
    pub fn clear(&mut self) {
        self.pairs.clear();
        self.by_converted.clear();
        self.deferred.clear();
    }

    // ─── Deferred re-equip ───────────────────────────────────────────────────

    pub fn defer_dispel(&mut self, converted: FormId, base: FormId) {
        self.deferred.insert((converted, base));
    }

    pub fn is_deferred(&self, converted: FormId, base: FormId) -> bool {
        self.deferred.contains(&(converted, base))
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Visit every deferred action. Setting `erase` drops the entry once
    /// the visitor returns.
    pub fn for_each_deferred<F>(&mut self, mut visitor: F)
    where
        F: FnMut(FormId, FormId, &mut bool),
    {
        self.deferred.retain(|&(converted, base)| {
            let mut erase = false;
            visitor(converted, base, &mut erase);
            !erase
        });
    }

    // ─── Silenced names ──────────────────────────────────────────────────────

    pub fn add_silenced_name(&mut self, name: &str) {
        if !name.is_empty() {
            self.silenced_names.insert(name.to_string());
        }
    }

    pub fn remove_silenced_name(&mut self, name: &str) {
        self.silenced_names.remove(name);
    }

    pub fn clear_silenced_names(&mut self) {
        self.silenced_names.clear();
    }

    pub fn is_silenced(&self, name: &str) -> bool {
        !name.is_empty() && self.silenced_names.contains(name)
    }

    /// Matches the ability's display name or its editor id.
    pub fn is_silenced_ability(&self, ability: &Ability) -> bool {
        self.is_silenced(&ability.name)
            || ability
                .editor_id
                .as_deref()
                .is_some_and(|id| self.is_silenced(id))
    }

    /// Silenced names in sorted order
    pub fn silenced_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.silenced_names.iter().cloned().collect();
        names.sort();
        names
    }
}
