//! Bounded identifier allocator for runtime-created abilities
//!
//! A fixed window of 64 form ids is mapped one-to-one onto the bits of a
//! `u64` mask:
//!
//! ```text
//!   form id = BASE_OFFSET + local id      local id = MIN_LOCAL_ID + bit index
//!   0xFF03F800  ->  bit 0
//!   0xFF03F83F  ->  bit 63
//! ```
//!
//! Allocation always takes the lowest free bit, so freed slots are reused
//! smallest-first and ids stay stable across identical session histories.

use hashbrown::HashSet;

use thiserror::Error;

use crate::host::FormId;

const BASE_OFFSET: u32 = 0xFF03_F000;
const MIN_LOCAL_ID: u32 = 0x800;
const MAX_LOCAL_ID: u32 = 0x83F;

pub const TOTAL_IDS: u32 = MAX_LOCAL_ID - MIN_LOCAL_ID + 1;

const FULL_MASK: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("no free identifiers left")]
    Exhausted,
    #[error("identifier {0} is outside the managed range")]
    OutOfRange(FormId),
    #[error("identifier {0} is already allocated")]
    Conflict(FormId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdAllocator {
    mask: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the lowest free identifier.
    pub fn allocate(&mut self) -> Result<FormId, AllocationError> {
        if self.mask == FULL_MASK {
            tracing::error!("No free identifiers available");
            return Err(AllocationError::Exhausted);
        }
        let index = (!self.mask).trailing_zeros();
        self.mask |= 1u64 << index;
        Ok(index_to_id(index))
    }

    /// Reserve an exact identifier (restore path). Fails without mutating
    /// state when the id is out of range or already taken.
    pub fn allocate_specific(&mut self, id: FormId) -> Result<FormId, AllocationError> {
        let Some(index) = id_to_index(id) else {
            tracing::error!(id = %id, "Identifier out of managed range");
            return Err(AllocationError::OutOfRange(id));
        };
        let bit = 1u64 << index;
        if self.mask & bit != 0 {
            tracing::warn!(id = %id, "Identifier already allocated");
            return Err(AllocationError::Conflict(id));
        }
        self.mask |= bit;
        tracing::debug!(id = %id, index, "Allocated exact identifier");
        Ok(id)
    }

    /// Release an identifier. Unknown or unallocated ids are ignored.
    pub fn free(&mut self, id: FormId) {
        if let Some(index) = id_to_index(id) {
            self.mask &= !(1u64 << index);
        }
    }

    pub fn is_allocated(&self, id: FormId) -> bool {
        id_to_index(id).is_some_and(|index| self.mask & (1u64 << index) != 0)
    }

    pub fn free_count(&self) -> u32 {
        TOTAL_IDS - self.mask.count_ones()
    }

    pub fn allocated_count(&self) -> u32 {
        self.mask.count_ones()
    }

    pub fn clear(&mut self) {
        if self.mask != 0 {
            tracing::info!(released = self.mask.count_ones(), "Releasing all identifiers");
        }
        self.mask = 0;
    }

    /// Free every allocated identifier not present in `live`.
    ///
    /// Returns the identifiers that were released.
    pub fn reconcile(&mut self, live: &HashSet<FormId>) -> Vec<FormId> {
        let referenced = live
            .iter()
            .filter_map(|id| id_to_index(*id))
            .fold(0u64, |acc, index| acc | (1u64 << index));

        let mut stale = self.mask & !referenced;
        let mut released = Vec::new();
        while stale != 0 {
            let index = stale.trailing_zeros();
            stale &= stale - 1;
            let id = index_to_id(index);
            tracing::info!(id = %id, "Freeing stale identifier");
            self.mask &= !(1u64 << index);
            released.push(id);
        }
        released
    }
}

fn index_to_id(index: u32) -> FormId {
    FormId(BASE_OFFSET + MIN_LOCAL_ID + index)
}

fn id_to_index(id: FormId) -> Option<u32> {
    let local = id.0.checked_sub(BASE_OFFSET)?;
    (MIN_LOCAL_ID..=MAX_LOCAL_ID)
        .contains(&local)
        .then(|| local - MIN_LOCAL_ID)
}
