use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use upkeep_core::host::{Archetype, Delivery, FormId, Host, SourceRef};
use upkeep_core::persistence::{CosaveStore, PersistedEntry, codec, snapshot};
use upkeep_core::sim::{SimHost, spell};
use upkeep_core::{CodecError, ConfigStore, MaintenanceOrchestrator, PersistError};
use upkeep_types::{LogLevel, UpkeepSettings};

const LOG_DIR_ENV: &str = "UPKEEP_LOG_DIR";
const LOG_FILE: &str = "upkeep-validate.log";
/// Simulated frame time (60 fps)
const FRAME: f32 = 1.0 / 60.0;

#[derive(Parser)]
#[command(version, about = "Inspect upkeep cosaves and run simulated sessions")]
struct Cli {
    /// Write logs to this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Directory holding settings.toml and silenced_fx.toml
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a cosave blob for the maintained-ability record and print it
    Inspect {
        #[arg(short, long)]
        path: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Maintain a few abilities on a simulated player and run the tick loop
    Simulate {
        /// Frames to run at 60 fps
        #[arg(short, long, default_value_t = 600)]
        ticks: u32,
        /// Also write the resulting cosave to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum ValidateError {
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("{}: {source}", path.display())]
    Codec { path: PathBuf, source: CodecError },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn main() {
    let cli = Cli::parse();

    // Explicit directories are always read; the platform default only when it
    // already holds a settings file.
    let store = cli.config_dir.clone().map(ConfigStore::new).or_else(|| {
        ConfigStore::default_location().filter(|store| store.settings_path().exists())
    });
    let settings = match store.as_ref().map(ConfigStore::load_settings).transpose() {
        Ok(settings) => settings.unwrap_or_default(),
        Err(e) => {
            eprintln!("upkeep-validate: {e}");
            std::process::exit(1);
        }
    };
    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| std::env::var_os(LOG_DIR_ENV).map(PathBuf::from));
    init_logging(settings.diagnostics.log_level, log_dir.as_deref());
    match &store {
        Some(store) => tracing::info!(dir = %store.dir().display(), "Loaded settings"),
        None => tracing::info!("Using default settings"),
    }

    let result = match cli.command {
        Commands::Inspect { path, json } => inspect(&path, json),
        Commands::Simulate { ticks, out } => simulate(settings, ticks, out.as_deref()),
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "Command failed");
        eprintln!("upkeep-validate: {e}");
        std::process::exit(1);
    }
}

/// Initialize logging to `log_dir` if given, otherwise stderr.
/// `RUST_LOG` overrides the configured level.
fn init_logging(level: LogLevel, log_dir: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    if let Some(dir) = log_dir {
        let appender = fs::create_dir_all(dir).ok().and_then(|_| {
            RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(LOG_FILE)
                .build(dir)
                .ok()
        });
        if let Some(appender) = appender {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_ansi(false)
                .with_writer(appender)
                .init();
            return;
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

// ═══════════════════════════════════════════════════════════════════════════════
// Inspect
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct InspectReport<'a> {
    path: String,
    size: usize,
    offset: usize,
    entries: &'a [PersistedEntry],
}

fn inspect(path: &Path, json: bool) -> Result<(), ValidateError> {
    let store = CosaveStore::new();
    let bytes = store.read_blob(path)?;
    let codec_error = |source| ValidateError::Codec {
        path: path.to_path_buf(),
        source,
    };
    let offset = codec::find_header(&bytes).map_err(codec_error)?;
    let entries = codec::decode_at(&bytes, offset).map_err(codec_error)?;
    tracing::debug!(offset, entries = entries.len(), "Decoded cosave");

    if json {
        let report = InspectReport {
            path: path.display().to_string(),
            size: bytes.len(),
            offset,
            entries: &entries,
        };
        let text = serde_json::to_string_pretty(&report)?;
        println!("{text}");
        return Ok(());
    }

    println!(
        "{}: {} bytes, record at offset {}, {} entries",
        path.display(),
        bytes.len(),
        offset,
        entries.len()
    );
    for (i, entry) in entries.iter().enumerate() {
        println!(
            "  [{i:2}] {:<28} base 0x{:08X}  converted {}  debuff {}",
            entry.source, entry.base_id, entry.converted, entry.debuff
        );
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Simulate
// ═══════════════════════════════════════════════════════════════════════════════

const ARMOR_SETTING: FormId = FormId(0x0005_AD5C);
const LIGHT_SETTING: FormId = FormId(0x0001_B2F1);
const FAMILIAR_SETTING: FormId = FormId(0x0006_40B7);
const OAKFLESH: FormId = FormId(0x0005_AD5D);
const CANDLELIGHT: FormId = FormId(0x0004_3324);
const FAMILIAR: FormId = FormId(0x0006_40B6);

fn scenario_host() -> SimHost {
    let mut host = SimHost::new();
    host.define_setting(ARMOR_SETTING, "Oakflesh", Archetype::ValueModifier).fx_persist = true;
    host.define_setting(LIGHT_SETTING, "Candlelight", Archetype::Light);
    host.define_setting(FAMILIAR_SETTING, "Summon Familiar", Archetype::SummonCreature);

    let mut oakflesh = spell(OAKFLESH, "Oakflesh", ARMOR_SETTING, 90.0);
    oakflesh.source = Some(SourceRef {
        file: "Skyrim.esm".to_string(),
        local_id: OAKFLESH.0,
    });
    host.define_ability(oakflesh, 50.0);
    host.define_ability(spell(CANDLELIGHT, "Candlelight", LIGHT_SETTING, 60.0), 20.0);
    let mut familiar = spell(FAMILIAR, "Conjure Familiar", FAMILIAR_SETTING, 60.0);
    familiar.delivery = Delivery::Aimed;
    familiar.skill = Some("Conjuration".to_string());
    host.define_ability(familiar, 60.0);
    host
}

fn simulate(settings: UpkeepSettings, ticks: u32, out: Option<&Path>) -> Result<(), ValidateError> {
    let mut host = scenario_host();
    let mut engine = MaintenanceOrchestrator::new(settings, host.forms.clone());
    let player = host.player();

    for ability in [OAKFLESH, CANDLELIGHT, FAMILIAR] {
        host.cast_immediate(player, ability, None);
        engine.on_ability_cast(&mut host, player, ability);
    }
    for _ in 0..ticks {
        engine.tick(&mut host, FRAME);
    }
    tracing::info!(ticks, pairs = engine.registry().len(), "Simulation finished");

    for text in &host.notifications {
        println!("notify: {text}");
    }
    for text in &host.alerts {
        println!("alert:  {text}");
    }
    println!("maintained after {:.1}s:", ticks as f32 * FRAME);
    for entry in engine.maintained_listing(&host) {
        let fx = if entry.fx_enabled { "fx on" } else { "fx off" };
        println!("  {:2}. {:<24} {fx}", entry.slot, entry.name);
    }

    let written = engine.save_game(&mut host)?;
    println!("cosave record: {written} bytes");

    if let Some(path) = out {
        let entries = snapshot(&host, engine.registry());
        CosaveStore::new().write(path, &entries)?;
        println!("wrote {}", path.display());
    }
    Ok(())
}
