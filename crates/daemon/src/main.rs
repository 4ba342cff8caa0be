//! MergeWatch daemon entry point.
//!
//! Loads configuration, wires the change source, git runner, resolution
//! agent and worker pool together, and runs the polling loop until a
//! shutdown signal arrives.

mod signals;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mergewatch_core::config::MergeWatchConfig;
use mergewatch_core::conflict::AgentDelegate;
use mergewatch_core::git::{GitRunner, IntegrationRunner};
use mergewatch_core::poller::Poller;
use mergewatch_core::pool::WorkerPool;
use mergewatch_core::registry::ProcessedRegistry;
use mergewatch_core::source::GitHubChangeSource;
use mergewatch_core::worker::{MergeWorker, WorkerSettings};

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// MergeWatch: merges open pull requests into the integration branch.
#[derive(Parser, Debug)]
#[command(name = "mergewatch", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "mergewatch.toml")]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll and merge until interrupted, then wait for running merges.
    Run,

    /// Run a single poll cycle, wait for its merges, and exit.
    Once,

    /// Print a default configuration file to stdout.
    InitConfig,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig = cli.command {
        print!("{}", MergeWatchConfig::default_template());
        return Ok(());
    }

    let config = MergeWatchConfig::load_and_resolve(&cli.config)
        .context("failed to load configuration file")?;

    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.watcher.log_level);
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();

    info!("========================================");
    info!("  MergeWatch v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file   : {}", cli.config.display());
    info!("Repository    : {}", config.github.repo);
    info!("Working copy  : {}", config.repository.working_copy.display());
    info!(
        "Integration   : {}/{}",
        config.repository.remote, config.repository.base_branch
    );
    info!("Poll interval : {}s", config.watcher.poll_interval_secs);
    info!("Max parallel  : {}", config.watcher.max_parallel_merges);
    info!("Agent         : {}", config.agent.command);
    info!("Log level     : {}", log_level);
    info!("========================================");

    let poller = build_poller(&config)?;

    let stats = match cli.command {
        Commands::Run => {
            info!("press Ctrl+C to stop (running merges are allowed to finish)");
            let shutdown = signals::setup_signal_handlers();
            poller.run(shutdown).await
        }
        Commands::Once => {
            let cycle = poller.poll_once().await;
            info!(
                open = cycle.open,
                submitted = cycle.submitted,
                "single poll cycle submitted"
            );
            poller.drain().await
        }
        Commands::InitConfig => return Ok(()),
    };

    info!(
        completed = stats.completed,
        published = stats.published,
        "MergeWatch stopped."
    );
    Ok(())
}

/// Wire every component from the loaded configuration.
fn build_poller(config: &MergeWatchConfig) -> Result<Poller> {
    let runner: Arc<dyn IntegrationRunner> = Arc::new(
        GitRunner::new(
            &config.repository.working_copy,
            config.repository.git_binary.clone(),
        )
        .context("failed to open working copy")?,
    );
    info!(
        "Git runner initialized at {}",
        config.repository.working_copy.display()
    );

    let delegate = Arc::new(AgentDelegate::new(config.agent.clone(), runner.clone()));

    let source = Arc::new(
        GitHubChangeSource::new(
            config.github.api_url.clone(),
            config.github.repo.clone(),
            config.repository.base_branch.clone(),
            config.github.token.clone(),
        )
        .context("failed to create GitHub client")?,
    );

    let worker = Arc::new(MergeWorker::new(
        runner,
        delegate,
        WorkerSettings::from(config),
    ));
    let pool = WorkerPool::spawn(config.watcher.max_parallel_merges, worker, None);

    Ok(Poller::new(
        source,
        Arc::new(ProcessedRegistry::new()),
        pool,
        Duration::from_secs(config.watcher.poll_interval_secs),
    ))
}
