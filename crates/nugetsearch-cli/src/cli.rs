//! Exposes the command line application.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nugetsearch_icons::config::Config;
use nugetsearch_icons::metrics;
use tracing::level_filters::LevelFilter;

use crate::{fetch, logging};

/// Icon manager commands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Load icons through the icon manager and print the outcome of each.
    Fetch(FetchArgs),
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// The icon URLs to load.
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Maximum number of concurrent downloads, overriding the configuration file.
    #[arg(long, value_name = "N")]
    pub capacity: Option<usize>,

    /// How long to wait for all icons to finish loading.
    #[arg(long, value_name = "DURATION", default_value = "60s")]
    pub timeout: humantime::Duration,
}

/// Command line interface parser.
#[derive(Debug, Parser)]
#[command(name = "nugetsearch-icons", version)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// The log level, overriding the configuration file.
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LevelFilter>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::get(cli.config()).context("failed loading config")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    let _sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: Some(env!("CARGO_PKG_VERSION").into()),
        ..Default::default()
    });

    // SAFETY: the runtime is not started yet, this is still single-threaded.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        metrics::configure_statsd(
            &config.metrics.prefix,
            statsd.as_str(),
            config.metrics.custom_tags.clone(),
        )
        .context("failed to configure statsd")?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("nugetsearch-icons")
        .build()
        .context("failed to start the runtime")?;

    match cli.command {
        Command::Fetch(args) => runtime
            .block_on(fetch::run(&config, args))
            .context("failed to fetch icons"),
    }
}
