pub mod allocator;
pub mod config;
pub mod effects;
pub mod experience;
pub mod factory;
pub mod host;
pub mod orchestrator;
pub mod persistence;
pub mod policy;
pub mod registry;
pub mod sim;
pub mod supervisor;


// Re-exports for convenience
pub use allocator::{AllocationError, IdAllocator};
pub use config::{ConfigError, ConfigStore};
pub use factory::{AbilityFactory, FactoryError};
pub use host::*;
pub use orchestrator::{LifecycleEvent, ListingEntry, MaintainError, MaintenanceOrchestrator};
pub use persistence::{CodecError, CosaveLocator, CosaveStore, PersistError};
pub use registry::{MaintainedPair, MaintainedRegistry, SilenceMode, SilencedEffectRecord};
pub use sim::SimHost;
pub use supervisor::UpkeepSupervisor;
