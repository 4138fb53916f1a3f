//! User-tunable settings.
//!
//! Every field has a default so a partial (or missing) settings file still
//! produces a usable configuration.

use serde::{Deserialize, Serialize};

/// Top-level settings document (`settings.toml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UpkeepSettings {
    pub general: GeneralSettings,
    pub costs: CostSettings,
    pub experience: ExperienceSettings,
    pub minions: MinionSettings,
    pub diagnostics: DiagnosticsSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Suppress persistent visuals of every maintained ability
    pub silence_fx: bool,
    /// Allow conjured-weapon abilities to be maintained
    pub allow_bound_weapons: bool,
    /// Dispel the original effect immediately when a maintained ability is dropped
    pub instant_dispel: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            silence_fx: false,
            allow_bound_weapons: true,
            instant_dispel: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostSettings {
    /// Reference duration (seconds) at which upkeep equals the base cost.
    /// Zero disables duration scaling.
    pub neutral_duration: i64,
    /// Exponent applied to the live/nominal duration ratio
    pub duration_exponent: f32,
}

impl Default for CostSettings {
    fn default() -> Self {
        Self {
            neutral_duration: 60,
            duration_exponent: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceSettings {
    pub multiplier: f32,
}

impl Default for ExperienceSettings {
    fn default() -> Self {
        Self { multiplier: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinionSettings {
    /// Seconds to wait before re-summoning a maintained conjuration
    pub recast_delay: f32,
}

impl Default for MinionSettings {
    fn default() -> Self {
        Self { recast_delay: 3.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsSettings {
    pub log_level: LogLevel,
    /// Explicit saves directory, for setups where the game redirects saves
    pub saves_path: Option<String>,
    /// Folder name under `My Games` used to locate the default saves directory
    pub game_folder: String,
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            saves_path: None,
            game_folder: "Skyrim Special Edition".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Outcome of applying a live settings-changed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingChange {
    Applied,
    UnknownId,
}

impl UpkeepSettings {
    /// Apply a `"<key>:<Section>"` change pushed by the in-game settings menu.
    ///
    /// Boolean settings treat any non-zero value as `true`.
    pub fn apply_change(&mut self, id: &str, value: f32) -> SettingChange {
        match id {
            "bDoSilenceFX:General" => self.general.silence_fx = value != 0.0,
            "bAllowBoundWeapons:General" => self.general.allow_bound_weapons = value != 0.0,
            "bInstantDispel:General" => self.general.instant_dispel = value != 0.0,
            "iCostBaseDuration:Costs" => self.costs.neutral_duration = value as i64,
            "fUpkeepDurationExponent:Costs" => self.costs.duration_exponent = value,
            "fMaintainedExpMultiplier:Experience" => self.experience.multiplier = value,
            "fConjureRespawnDelay:Minions" => self.minions.recast_delay = value,
            _ => return SettingChange::UnknownId,
        }
        SettingChange::Applied
    }
}
