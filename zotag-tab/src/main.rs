//! zotag-tab - tag count tables and charts for a Zotero library
//!
//! `serve` runs the HTTP service, `query` prints one evaluation as JSON and
//! `purge` clears the query and/or image caches.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use zotag_common::config::{default_config_path, load_toml_config_or_default, RootFolderInitializer};
use zotag_tab::aggregate::Aggregator;
use zotag_tab::cache::{QueryCache, SqliteQueryCache};
use zotag_tab::chart::ImageStore;
use zotag_tab::client::ZoteroClient;
use zotag_tab::config::{resolve_zotero_settings, TabConfig, MODULE_NAME};
use zotag_tab::params::{QueryParams, ValuesType};
use zotag_tab::purge::CachePurger;
use zotag_tab::{build_router, AppState};

/// Command-line arguments for zotag-tab
#[derive(Parser, Debug)]
#[command(name = "zotag-tab")]
#[command(about = "Tag counts and cross-tabulations over a Zotero library")]
#[command(version)]
struct Cli {
    /// TOML config file (default: <config dir>/zotag/zotag-tab.toml)
    #[arg(short, long, env = "ZOTAG_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the query cache and rendered charts
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Listen address (overrides [server] bind)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Evaluate one query and print its rows as JSON
    Query {
        /// X axis tag (repeatable, at least one)
        #[arg(short = 'x', long = "x", required = true)]
        tags_x: Vec<String>,

        /// Y axis tag (repeatable)
        #[arg(short = 'y', long = "y")]
        tags_y: Vec<String>,

        /// Filter tag; prefix with '-' to exclude (repeatable)
        #[arg(short, long, allow_hyphen_values = true)]
        filter: Vec<String>,

        /// raw, percent or percent_matches
        #[arg(long, default_value = "raw")]
        values: String,
    },
    /// Clear cached query results and/or rendered charts (both by default)
    Purge {
        #[arg(long)]
        queries: bool,
        #[arg(long)]
        images: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(|| default_config_path(MODULE_NAME));
    let toml_config = load_toml_config_or_default(config_path.as_deref());
    let config = TabConfig::resolve(&toml_config, cli.root_folder.clone());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("Starting zotag-tab v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    RootFolderInitializer::new(config.root_folder.clone()).ensure_directory_exists()?;
    info!("Query cache: {}", config.database_path.display());

    let cache: Arc<dyn QueryCache> = Arc::new(
        SqliteQueryCache::open(&config.database_path)
            .await
            .context("Failed to open query cache")?,
    );
    let images = ImageStore::new(config.image_dir.clone(), config.image_url.clone());

    match cli.command {
        Command::Purge { queries, images: purge_images } => {
            let purger = CachePurger::new(cache, images);
            let summary = match (queries, purge_images) {
                (true, false) => purger.purge_queries().await?,
                (false, true) => purger.purge_images().await?,
                _ => purger.purge_all().await?,
            };
            println!(
                "Purged {} cached queries and {} images",
                summary.queries, summary.images
            );
        }
        Command::Query {
            tags_x,
            tags_y,
            filter,
            values,
        } => {
            let aggregator = build_aggregator(&toml_config, &config, cache)?;
            let params = QueryParams {
                tags_x,
                tags_y,
                filter,
                values_type: values.parse::<ValuesType>()?,
                ..Default::default()
            };
            let data = aggregator.tabulate(&params).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Command::Serve { bind } => {
            let aggregator = Arc::new(build_aggregator(&toml_config, &config, cache)?);
            let app = build_router(AppState::new(aggregator, images));

            let bind = bind.unwrap_or_else(|| config.bind.clone());
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("Failed to bind {}", bind))?;
            info!("zotag-tab listening on http://{}", bind);
            info!("Health check: http://{}/health", bind);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            info!("zotag-tab stopped");
        }
    }

    Ok(())
}

fn build_aggregator(
    toml_config: &zotag_common::config::TomlConfig,
    config: &TabConfig,
    cache: Arc<dyn QueryCache>,
) -> Result<Aggregator> {
    let settings = resolve_zotero_settings(toml_config)?;
    info!("Zotero library: {}", settings.items_url());

    let client = Arc::new(ZoteroClient::new(settings)?);
    Ok(Aggregator::new(cache, client, config.fetch_concurrency))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
