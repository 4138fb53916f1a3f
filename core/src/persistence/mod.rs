//! Cosave persistence: binary codec, restore mapping and file access.

pub mod codec;
pub mod cosave;
pub mod restore;

pub use codec::{CodecError, PersistedEntry};
pub use cosave::{CosaveLocator, CosaveStore, PersistError};
pub use restore::{RestoreOutcome, RestoreSkip, restore_entries, snapshot};
