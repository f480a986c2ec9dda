//! # Pulseline CLI (`pulse`)
//!
//! The `pulse` binary is the primary interface for Pulseline. It provides
//! commands for database initialization, GDPR archive import, manual folder
//! import, device management, incremental sync, and store statistics.
//!
//! ## Usage
//!
//! ```bash
//! pulse --config ./config/pulse.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pulse init` | Create the SQLite database and run schema migrations |
//! | `pulse import <archive.zip>` | Ingest a GDPR export archive |
//! | `pulse import-folder <dir>` | Ingest binary device files from a folder |
//! | `pulse devices detect` | Find sync-client device folders |
//! | `pulse devices list` | List registered device targets |
//! | `pulse devices register <id> <path>` | Register a device folder |
//! | `pulse sync <device-id\|all>` | Incrementally sync device folders |
//! | `pulse stats` | Show what's in the store |

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use pulseline::config::{self, Config};
use pulseline::progress::ProgressMode;
use pulseline::report::{ImportSummary, SyncSummary};
use pulseline::store::Store;
use pulseline::{db, devices, migrate, pipeline, stats, sync};

/// Pulseline CLI — a local-first ingestion and sync pipeline for wearable
/// fitness data.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pulse.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pulse",
    about = "Pulseline — a local-first ingestion and sync pipeline for wearable fitness data",
    version,
    long_about = "Pulseline ingests vendor GDPR export archives and live device-sync folders \
    into a local SQLite store, producing a normalized, deduplicated time series of sleep, \
    activity, HRV, stress, and related wellness data."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pulse.toml`. Database, import, and sync
    /// settings are read from this file.
    #[arg(long, global = true, default_value = "./config/pulse.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (the
    /// imported-file ledger, device targets, and one table per data
    /// category). This command is idempotent — running it multiple times
    /// is safe.
    Init,

    /// Import a GDPR export archive.
    ///
    /// Extracts the ZIP into a scratch directory, categorizes every file,
    /// parses binary device files and categorized JSON documents, and
    /// ingests the records with content-hash deduplication. Re-importing
    /// the same archive is a no-op.
    Import {
        /// Path to the export archive (.zip).
        archive: PathBuf,

        /// Keep the extraction scratch directory for debugging.
        #[arg(long)]
        keep_scratch: bool,

        /// Print the result summary as JSON on stdout.
        #[arg(long)]
        json: bool,

        /// Progress output: `off`, `human`, or `json` (stderr).
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Import binary device files from a local folder.
    ///
    /// Recursively parses every device file under the folder and ingests
    /// the records, tagged with the `manual` source.
    ImportFolder {
        /// Folder to scan.
        folder: PathBuf,

        /// Print the result summary as JSON on stdout.
        #[arg(long)]
        json: bool,

        /// Progress output: `off`, `human`, or `json` (stderr).
        #[arg(long)]
        progress: Option<String>,
    },

    /// Manage device-sync targets.
    Devices {
        #[command(subcommand)]
        action: DevicesAction,
    },

    /// Incrementally sync device folders.
    ///
    /// Scans each target folder read-only, skips files whose stored
    /// size/mtime are unchanged, and parses/ingests only new or changed
    /// files. Pass `all` to sync every enabled target.
    Sync {
        /// Device identifier, or `all` for every enabled target.
        target: String,

        /// Override the device folder path (single-device sync only).
        #[arg(long)]
        path: Option<PathBuf>,

        /// Print the result summary as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Show store statistics.
    ///
    /// Per-category record counts and date ranges, the file ledger by
    /// source, and registered device targets.
    Stats,
}

/// Device management subcommands.
#[derive(Subcommand)]
enum DevicesAction {
    /// Detect device folders under the sync-client root.
    ///
    /// Uses `[sync].devices_root` from the config, or the platform default
    /// when unset. Folders without device files are skipped.
    Detect {
        /// Override the sync-client root directory.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Register every detected device as an enabled sync target.
        #[arg(long)]
        register: bool,
    },

    /// List registered device targets.
    List,

    /// Register a device folder as a sync target.
    Register {
        /// Device identifier (the vendor's folder name).
        id: String,
        /// Path to the device folder.
        path: PathBuf,
        /// Display name; defaults to the identifier.
        #[arg(long)]
        name: Option<String>,
    },

    /// Enable a device target.
    Enable { id: String },

    /// Disable a device target. Disabled targets are skipped by `sync all`.
    Disable { id: String },
}

fn progress_mode(flag: Option<&str>) -> anyhow::Result<ProgressMode> {
    match flag {
        None => Ok(ProgressMode::default_for_tty()),
        Some("off") => Ok(ProgressMode::Off),
        Some("human") => Ok(ProgressMode::Human),
        Some("json") => Ok(ProgressMode::Json),
        Some(other) => bail!("unknown progress mode: '{}'. Must be off, human, or json.", other),
    }
}

fn print_import_summary(summary: &ImportSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("import {}", summary.source_path);
    println!("  files found: {}", summary.total_files_found);
    println!("  processed: {}", summary.total_files_processed);
    println!("  records inserted: {}", summary.total_records_inserted);
    if summary.records_updated > 0 {
        println!("  records updated: {}", summary.records_updated);
    }
    println!("  duplicates skipped: {}", summary.duplicates_skipped);
    println!("  errors: {}", summary.errors);
    println!("  success rate: {:.1}%", summary.success_rate);
    for detail in &summary.error_details {
        println!("  error: {} [{}]: {}", detail.file, detail.category, detail.error);
    }
    if let Some(path) = &summary.extract_path {
        println!("  scratch kept: {}", path);
    }
    if summary.success {
        println!("ok");
    } else {
        println!("completed with errors");
    }
    Ok(())
}

fn print_sync_summary(summary: &SyncSummary) {
    println!("sync {}", summary.device_id);
    println!("  scanned: {}", summary.files_scanned);
    println!("  new: {}", summary.files_new);
    println!("  changed: {}", summary.files_changed);
    println!("  unchanged: {}", summary.files_unchanged);
    println!("  errors: {}", summary.files_errored);
    println!("  records inserted: {}", summary.records_inserted);
    for detail in &summary.errors {
        println!("  error: {}: {}", detail.file, detail.error);
    }
}

async fn open_store(config: &Config) -> anyhow::Result<Store> {
    let pool = db::connect(&config.db.path).await?;
    Ok(Store::new(pool))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pulseline=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }

        Commands::Import {
            archive,
            keep_scratch,
            json,
            progress,
        } => {
            let store = open_store(&cfg).await?;
            let reporter = progress_mode(progress.as_deref())?.reporter();
            let opts = pipeline::ImportOptions {
                keep_scratch: keep_scratch || cfg.import.keep_scratch,
            };
            let summary = pipeline::import_archive(&store, &archive, &opts, reporter.as_ref())
                .await
                .with_context(|| format!("importing {}", archive.display()))?;
            print_import_summary(&summary, json)?;
        }

        Commands::ImportFolder {
            folder,
            json,
            progress,
        } => {
            let store = open_store(&cfg).await?;
            let reporter = progress_mode(progress.as_deref())?.reporter();
            let summary = pipeline::import_fit_folder(&store, &folder, reporter.as_ref())
                .await
                .with_context(|| format!("importing {}", folder.display()))?;
            print_import_summary(&summary, json)?;
        }

        Commands::Devices { action } => {
            let store = open_store(&cfg).await?;
            match action {
                DevicesAction::Detect { root, register } => {
                    let root = root
                        .or_else(|| cfg.sync.devices_root.clone())
                        .or_else(devices::default_sync_root)
                        .context("no sync-client root configured and no platform default")?;
                    let detected = devices::detect_devices(&root)?;
                    if detected.is_empty() {
                        println!("No devices found under {}", root.display());
                    }
                    for device in &detected {
                        println!(
                            "{}  {}  ({} files)",
                            device.device_id, device.display_name, device.file_count
                        );
                        if register {
                            devices::register_device(
                                store.pool(),
                                &device.device_id,
                                &device.path,
                                &device.display_name,
                                device.file_count as i64,
                            )
                            .await?;
                        }
                    }
                    if register && !detected.is_empty() {
                        println!("Registered {} device(s).", detected.len());
                    }
                }
                DevicesAction::List => {
                    let targets = devices::list_devices(store.pool(), false).await?;
                    if targets.is_empty() {
                        println!("No devices registered.");
                    }
                    for t in &targets {
                        println!(
                            "{}  {}  enabled={}  path={}",
                            t.device_id, t.display_name, t.enabled, t.device_path
                        );
                    }
                }
                DevicesAction::Register { id, path, name } => {
                    let display = name.unwrap_or_else(|| id.clone());
                    devices::register_device(
                        store.pool(),
                        &id,
                        &path.display().to_string(),
                        &display,
                        0,
                    )
                    .await?;
                    println!("Registered device {}.", id);
                }
                DevicesAction::Enable { id } => {
                    devices::set_enabled(store.pool(), &id, true).await?;
                    println!("Enabled device {}.", id);
                }
                DevicesAction::Disable { id } => {
                    devices::set_enabled(store.pool(), &id, false).await?;
                    println!("Disabled device {}.", id);
                }
            }
        }

        Commands::Sync { target, path, json } => {
            let store = open_store(&cfg).await?;
            let exclude = cfg.sync.exclude_set()?;

            if target == "all" {
                let all = sync::sync_all_enabled(&store, &exclude).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&all)?);
                } else {
                    for summary in &all.device_summaries {
                        print_sync_summary(summary);
                    }
                    println!(
                        "synced {} device(s): {} new, {} changed, {} unchanged, {} errors, {} records",
                        all.devices_synced,
                        all.total_files_new,
                        all.total_files_changed,
                        all.total_files_unchanged,
                        all.total_files_errored,
                        all.total_records_inserted
                    );
                }
            } else {
                let device_path = match path {
                    Some(p) => p,
                    None => {
                        let targets = devices::list_devices(store.pool(), false).await?;
                        let target_row = targets
                            .iter()
                            .find(|t| t.device_id == target)
                            .with_context(|| format!("unknown device: {}", target))?;
                        PathBuf::from(&target_row.device_path)
                    }
                };
                let summary = sync::sync_device(&store, &target, &device_path, &exclude).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                } else {
                    print_sync_summary(&summary);
                    println!("ok");
                }
            }
        }

        Commands::Stats => {
            let pool = db::connect(&cfg.db.path).await?;
            stats::run_stats(&pool, Path::new(&cfg.db.path)).await?;
            pool.close().await;
        }
    }

    Ok(())
}
