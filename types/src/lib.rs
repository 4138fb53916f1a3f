//! Shared configuration types for the upkeep maintenance engine.
//!
//! These types are deserialized from the user's settings file and are also
//! consumed by tooling (the validate binary), so they carry no engine logic
//! beyond defaults and live-setting application.

pub mod settings;

pub use settings::{
    CostSettings, DiagnosticsSettings, ExperienceSettings, GeneralSettings, LogLevel,
    MinionSettings, SettingChange, UpkeepSettings,
};
