//! couchmirror CLI
//!
//! Mirrors the catalog manifest into CouchDB.
//!
//! # Commands
//!
//! - `world` - Synchronize world content (or one component of it)
//! - `assets` - Ingest the snapshot, write metadata, sync gear and dyes
//! - `all` - `world` followed by `assets`
//! - `manifest` - Print a summary of the current manifest descriptor

mod commands;

use clap::{Parser, Subcommand};
use couchmirror_core::{AssetSteps, CatalogClient, DocumentSynchronizer, MirrorConfig};
use couchmirror_http::{CatalogConfig, CouchConfig, CouchStore, HttpCatalog, ZipSqliteOpener};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Mirror the catalog manifest into CouchDB.
#[derive(Parser)]
#[command(name = "couchmirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Catalog API key
    #[arg(global = true, long, env = "BUNGIE_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// CouchDB server URL
    #[arg(
        global = true,
        long,
        env = "COUCHDB_URL",
        default_value = "http://localhost:5984"
    )]
    couch_url: String,

    /// CouchDB user
    #[arg(global = true, long, env = "COUCHDB_USER")]
    couch_user: Option<String>,

    /// CouchDB password
    #[arg(global = true, long, env = "COUCHDB_PASSWORD", hide_env_values = true)]
    couch_password: Option<String>,

    /// Content language
    #[arg(global = true, short, long, default_value = "en")]
    language: String,

    /// Directory for snapshot extraction (defaults to the system temp dir)
    #[arg(global = true, long)]
    scratch_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize world content
    World {
        /// Only synchronize this world component
        #[arg(short, long)]
        component: Option<String>,
    },

    /// Synchronize binary-published assets
    Assets {
        /// Skip snapshot download and ingestion
        #[arg(long)]
        skip_snapshot: bool,

        /// Skip gear definitions and dyes
        #[arg(long)]
        skip_gear: bool,
    },

    /// Synchronize world content, then assets
    All,

    /// Print a summary of the manifest descriptor
    Manifest {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let api_key = cli
        .api_key
        .clone()
        .ok_or("catalog API key required (--api-key or BUNGIE_KEY)")?;
    let catalog = HttpCatalog::new(CatalogConfig::new(api_key))?;
    let manifest = catalog.fetch_manifest_descriptor().await?;

    if let Commands::Manifest { format } = &cli.command {
        commands::manifest::run(&manifest, &cli.language, format)?;
        return Ok(());
    }

    let mut couch = CouchConfig::new(cli.couch_url.clone());
    if let Some(user) = &cli.couch_user {
        couch = couch.with_credentials(user, cli.couch_password.clone().unwrap_or_default());
    }
    let store = Arc::new(CouchStore::new(couch)?);
    let sync = DocumentSynchronizer::new(store);

    let mut config = MirrorConfig::new().with_language(cli.language.clone());
    if let Some(dir) = &cli.scratch_dir {
        config = config.with_scratch_dir(dir);
    }

    match cli.command {
        Commands::World { component } => {
            commands::world::run(&sync, &catalog, &manifest, &config, component.as_deref())
                .await?;
        }
        Commands::Assets {
            skip_snapshot,
            skip_gear,
        } => {
            let steps = AssetSteps {
                snapshot: !skip_snapshot,
                metadata: true,
                gear: !skip_gear,
            };
            let opener = Arc::new(ZipSqliteOpener);
            commands::assets::run(&sync, &catalog, opener, &manifest, &config, steps).await?;
        }
        Commands::All => {
            commands::world::run(&sync, &catalog, &manifest, &config, None).await?;
            commands::assets::run(
                &sync,
                &catalog,
                Arc::new(ZipSqliteOpener),
                &manifest,
                &config,
                AssetSteps::all(),
            )
            .await?;
        }
        Commands::Manifest { .. } => {}
    }

    let totals = sync.counts();
    tracing::info!(
        created = totals.created,
        updated = totals.updated,
        unchanged = totals.unchanged,
        "run complete"
    );
    Ok(())
}
