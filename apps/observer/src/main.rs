#![warn(clippy::all, clippy::pedantic)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use logger::LevelFilter;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uppe_observer::Orchestrator;
use uppe_observer::config::{self, Config};

/// Probe endpoints on a schedule and log every outcome.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Config file, defaults to $XDG_CONFIG_HOME/uppe/observer.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the probe pipeline until interrupted
    Observe(ObserveArgs),
    /// Print the effective configuration
    Config {
        /// Write the effective configuration to the config path
        #[arg(long)]
        write: bool,
    },
}

#[derive(Debug, Args)]
struct ObserveArgs {
    /// JSON file listing the endpoints to probe
    #[arg(long)]
    definitions: PathBuf,

    /// File results are appended to, one JSON object per line
    #[arg(long)]
    results: PathBuf,

    /// Number of concurrent probe workers
    #[arg(long)]
    workers: Option<usize>,
}

impl Cli {
    fn log_level(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (true, _) => LevelFilter::WARN,
            (false, 0) => LevelFilter::INFO,
            (false, 1) => LevelFilter::DEBUG,
            (false, _) => LevelFilter::TRACE,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.log_level());

    match cli.command {
        Command::Observe(ref args) => observe(cli.config.clone(), args).await,
        Command::Config { write } => show_config(cli.config.clone(), write),
    }
}

async fn observe(config_path: Option<PathBuf>, args: &ObserveArgs) -> Result<()> {
    let mut config = Config::from_config(config_path.as_ref()).context("failed to load configuration")?;
    if let Some(workers) = args.workers {
        config.pipeline.workers = workers;
    }

    let orchestrator = Orchestrator::from_config(&config)?;
    info!(
        definitions = %args.definitions.display(),
        results = %args.results.display(),
        workers = orchestrator.settings().workers,
        "starting observer"
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    orchestrator
        .observe(&args.definitions, &args.results, cancel)
        .await
        .context("observe failed")?;

    Ok(())
}

fn show_config(config_path: Option<PathBuf>, write: bool) -> Result<()> {
    if !write {
        let config = Config::from_config(config_path.as_ref()).context("failed to load configuration")?;
        print!("{config}");
        return Ok(());
    }

    // Writing may create the file, so a missing one starts from defaults.
    let path = config::resolve_config_path(config_path.as_deref())?;
    let config = Config::load_or_default(&path).context("failed to load configuration")?;
    print!("{config}");

    config.write_config(&path)?;
    info!(path = %path.display(), "configuration written");
    Ok(())
}

/// Wait for SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
