//! Agora Catalog maintenance tool
//!
//! Operational companion to the admin surface: initializes the stores and
//! runs reconciliation on a schedule (e.g. from cron) instead of waiting for
//! an admin to notice drift.
//!
//! ## Usage
//!
//! ```bash
//! # Create the data directory, stores, and a default config
//! agora-catalog init
//!
//! # Repair one root category, or every root
//! agora-catalog reconcile local-businesses
//! agora-catalog reconcile --all
//!
//! # Show store statistics
//! agora-catalog stats
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agora_catalog::services::events::spawn_logging_listener;
use agora_catalog::{CatalogService, Config};

#[derive(Parser, Debug)]
#[command(name = "agora-catalog")]
#[command(about = "Catalog taxonomy and business registry maintenance")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "AGORA_CATALOG_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides config)
    #[arg(long, env = "AGORA_CATALOG_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the data directory, stores, and a default config file
    Init,
    /// Rebuild leaf lists from the business registry
    Reconcile {
        /// Root category id to reconcile
        root_id: Option<String>,
        /// Reconcile every root category
        #[arg(long)]
        all: bool,
    },
    /// Show store statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            let default = Config::default();
            if default.config_path().exists() {
                Config::load(default.config_path())?
            } else {
                default
            }
        }
    };
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    let service = CatalogService::open(&config).context("failed to open catalog stores")?;
    let _listener = spawn_logging_listener(service.events());

    match args.command {
        Command::Init => {
            config
                .save(config.config_path())
                .context("failed to write config")?;
            info!(
                data_dir = %config.data_dir.display(),
                "Initialized catalog stores"
            );
        }
        Command::Reconcile { root_id, all } => {
            let roots: Vec<String> = if all {
                service.list_roots()?.into_iter().map(|r| r.id).collect()
            } else {
                match root_id {
                    Some(id) => vec![id],
                    None => anyhow::bail!("pass a root category id or --all"),
                }
            };

            if roots.is_empty() {
                warn!("No root categories to reconcile");
            }

            for root in roots {
                let report = service
                    .reconcile(&root)
                    .with_context(|| format!("reconcile failed for '{}'", root))?;
                if report.is_clean() {
                    info!(root = %root, total = report.total, "Already consistent");
                } else {
                    info!(
                        root = %root,
                        added = report.added,
                        removed = report.removed,
                        refreshed = report.refreshed,
                        orphaned = report.orphaned,
                        total = report.total,
                        "Repaired"
                    );
                }
            }
        }
        Command::Stats => {
            let registry = service.registry_stats()?;
            let roots = service.list_roots()?;
            let leaves: usize = roots.iter().map(|r| r.leaf_ids().len()).sum();
            println!("root categories: {}", roots.len());
            println!("leaves:          {}", leaves);
            println!("businesses:      {}", registry.total);
            println!("  active:        {}", registry.active);
            println!("  uncategorized: {}", registry.uncategorized);
        }
    }

    Ok(())
}
