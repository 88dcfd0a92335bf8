//! Auralist - media library catalog and remote mirror
//!
//! Indexes a local media tree into a catalog and keeps a remote copy of it in step over SSH,
//! moving only the bytes the destination does not already have.

mod display;
mod json_output;

use anyhow::{bail, Context, Result};
use auralist_catalog::{CatalogStore, JsonCatalog};
use auralist_config::{Config, ConfigLoader, LoggingConfig};
use auralist_index::{local_host_name, CrawlStats, Crawler, CrawlerConfig};
use auralist_remote::{ReconnectingSession, SshConfig, SshConnector};
use auralist_sync::{SyncEngine, SyncSettings, SyncStats};
use clap::{Parser, Subcommand};
use console::style;
use json_output::{CommandResultJson, IndexStatsJson, SyncStatsJson};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Auralist - media library catalog and remote mirror
#[derive(Parser)]
#[command(
    name = "auralist",
    version = env!("CARGO_PKG_VERSION"),
    about = "Media library catalog and remote mirror",
    long_about = "Auralist indexes a local media tree into a catalog of checksummed records\n\
                  and mirrors it to a remote host over SSH. Files already present at the\n\
                  destination, or under a previous remote layout, are never transferred again."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index new files under the search directory
    Index,
    /// Push pending records to the remote destination
    Sync {
        /// Process a single batch and exit
        #[arg(long)]
        once: bool,
    },
    /// Index once, then keep syncing until interrupted
    Run,
    /// Remove every record from the catalog
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
    /// Show configuration
    Config {
        /// Show the default configuration instead of the loaded one
        #[arg(long)]
        default: bool,
        /// Write the configuration to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { default, output } = &cli.command {
        return config_command(&cli, *default, output.as_deref());
    }

    let config = load_config(cli.config.as_deref())?;
    init_logging(&cli, &config.logging)?;
    info!("Auralist v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Index => {
            let catalog = open_catalog(&config).await?;
            index_command(&cli, &config, catalog).await?;
        }
        Commands::Sync { once } => {
            let catalog = open_catalog(&config).await?;
            sync_command(&cli, &config, catalog, once).await?;
        }
        Commands::Run => {
            let catalog = open_catalog(&config).await?;
            index_command(&cli, &config, catalog.clone()).await?;
            sync_command(&cli, &config, catalog, false).await?;
        }
        Commands::Reset { yes } => {
            reset_command(&cli, &config, yes).await?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load_default(),
    };
    config.context("Failed to load configuration")
}

fn init_logging(cli: &Cli, logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log filter")?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

async fn open_catalog(config: &Config) -> Result<Arc<JsonCatalog>> {
    let catalog = JsonCatalog::open(&config.catalog.path)
        .await
        .with_context(|| format!("Failed to open catalog {}", config.catalog.path.display()))?;
    Ok(Arc::new(catalog))
}

fn local_host(config: &Config) -> Result<String> {
    match config.index.host_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Ok(local_host_name()?),
    }
}

async fn index_command(cli: &Cli, config: &Config, catalog: Arc<JsonCatalog>) -> Result<CrawlStats> {
    let host = local_host(config)?;
    info!(root = %config.index.search_directory, host = %host, "Starting index");

    let mut crawler_config = CrawlerConfig::new(&config.index.search_directory, host.as_str());
    crawler_config.limits = config.index.batch_limits()?;
    crawler_config.extensions = config.index.extensions.clone();

    let spinner = (!cli.quiet && !cli.json).then(|| {
        display::create_spinner(&format!("Indexing {}", config.index.search_directory))
    });
    let result = Crawler::new(catalog, crawler_config).index().await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let stats = result.context("Indexing failed")?;

    if cli.json {
        json_output::print_json(&CommandResultJson::new(
            "index",
            &host,
            IndexStatsJson::from(&stats),
        ))?;
    } else if !cli.quiet {
        display::print_crawl_stats(&stats);
    }
    Ok(stats)
}

async fn sync_command(
    cli: &Cli,
    config: &Config,
    catalog: Arc<JsonCatalog>,
    once: bool,
) -> Result<SyncStats> {
    config.validate_for_sync()?;
    let host = local_host(config)?;

    let session = Arc::new(ReconnectingSession::new(
        SshConnector::new(SshConfig::from_remote(&config.remote)),
        config.remote.reconnect_policy(),
    ));
    let engine = SyncEngine::new(catalog, session, SyncSettings::from_config(config)?, host.as_str());

    if !cli.quiet && !cli.json {
        println!(
            "{} Mirroring to {}:{}",
            style("⟲").blue().bold(),
            style(&config.remote.host).cyan(),
            style(&config.remote.destination_root).cyan()
        );
    }

    let stats = if once {
        engine.run_once().await?
    } else {
        if !cli.quiet && !cli.json {
            display::display_info("Syncing until interrupted, press Ctrl-C to stop");
        }
        engine.run(shutdown_signal()).await?
    };

    if cli.json {
        json_output::print_json(&CommandResultJson::new(
            "sync",
            &host,
            SyncStatsJson::from(&stats),
        ))?;
    } else if !cli.quiet {
        display::print_sync_stats(&stats);
    }
    Ok(stats)
}

async fn reset_command(cli: &Cli, config: &Config, yes: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to delete every catalog record without --yes");
    }

    let catalog = open_catalog(config).await?;
    let removed = catalog.delete_all().await?;
    warn!(removed, "Catalog reset");

    if !cli.quiet && !cli.json {
        display::display_warning(&format!(
            "Removed {} records from {}",
            removed,
            catalog.path().display()
        ));
    }
    Ok(())
}

fn config_command(cli: &Cli, default: bool, output: Option<&Path>) -> Result<()> {
    let config = if default {
        Config::default()
    } else {
        load_config(cli.config.as_deref())?
    };

    match output {
        Some(path) => {
            ConfigLoader::save_to_file(&config, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !cli.quiet {
                display::display_success(&format!("Configuration written to {}", path.display()));
            }
        }
        None => print!("{}", ConfigLoader::render(&config, Path::new("auralist.yaml"))?),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
