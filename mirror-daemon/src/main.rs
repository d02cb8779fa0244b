use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::MirrorConfig;
use mirror::{RunReport, StateStore, SyncEngine, SyncMode, SyncService};

#[derive(Parser)]
#[command(name = "mirror-daemon")]
#[command(about = "Two-folder mirror sync daemon")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync service with watchers in the foreground
    Run,
    /// Perform one full sync and exit
    Sync {
        /// Sync mode: pull, push, or both
        #[arg(long, default_value = "both")]
        mode: String,

        /// Copy every file even when versions already match
        #[arg(long)]
        overwrite: bool,
    },
    /// Show the persisted baseline without touching either tree
    Status,
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigActions,
    },
}

#[derive(Subcommand)]
enum ConfigActions {
    /// Print the effective configuration
    Show,
    /// Write a commented starter configuration
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config::default_config_path);

    match cli.command {
        Commands::Run => run_service(&config_path).await,
        Commands::Sync { mode, overwrite } => run_once(&config_path, &mode, overwrite).await,
        Commands::Status => show_status(&config_path).await,
        Commands::Config { action } => match action {
            ConfigActions::Show => show_config(&config_path).await,
            ConfigActions::Init => init_config(&config_path).await,
        },
    }
}

async fn run_service(config_path: &Path) -> Result<()> {
    let config = load_config(config_path).await?;
    let _guard = init_logging(&config.daemon)?;
    config.validate()?;

    info!(path = %config_path.display(), "Loaded configuration");

    let mut service = SyncService::new(config.sync);
    service.start().await?;

    info!("Sync service running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Received shutdown signal, stopping watchers");
    service.shutdown().await;
    Ok(())
}

async fn run_once(config_path: &Path, mode: &str, overwrite: bool) -> Result<()> {
    let config = load_config(config_path).await?;
    let _guard = init_logging(&config.daemon)?;
    config.validate()?;
    let mode = parse_mode(mode)?;

    let engine = SyncEngine::new(config.sync);
    let report = engine.run(mode, overwrite).await?;
    print_report(&report);

    if report.is_clean() {
        Ok(())
    } else {
        anyhow::bail!("{} items failed to sync", report.failed)
    }
}

async fn show_status(config_path: &Path) -> Result<()> {
    let config = load_config(config_path).await?;
    let store = StateStore::new(config.sync.state_file_path());
    let state = store.load().await;

    println!("Sync enabled: {}", config.sync.enabled);
    println!("Local folder: {}", config.sync.local_folder.display());
    println!("Sync folder:  {}", config.sync.sync_folder.display());
    println!("State file:   {}", store.path().display());
    match state.saved_at {
        Some(saved_at) => println!("Last saved:   {}", saved_at),
        None => println!("Last saved:   never"),
    }
    println!(
        "Baseline entries: {} local, {} remote",
        state.last_local_data.len(),
        state.last_remote_data.len()
    );
    Ok(())
}

async fn show_config(config_path: &Path) -> Result<()> {
    let config = load_config(config_path).await?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

async fn init_config(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        anyhow::bail!(
            "Refusing to overwrite existing configuration at {}",
            config_path.display()
        );
    }
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(config_path, config::CONFIG_TEMPLATE).await?;
    println!("Configuration written to {}", config_path.display());
    Ok(())
}

async fn load_config(config_path: &Path) -> Result<MirrorConfig> {
    MirrorConfig::load(config_path)
        .await
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))
}

fn parse_mode(mode: &str) -> Result<SyncMode> {
    match mode.to_lowercase().as_str() {
        "pull" => Ok(SyncMode::Pull),
        "push" => Ok(SyncMode::Push),
        "both" => Ok(SyncMode::Both),
        other => anyhow::bail!("Unknown sync mode: {} (expected pull, push, or both)", other),
    }
}

fn print_report(report: &RunReport) {
    let took = report.finished_at - report.started_at;
    println!("Run {} finished in {} ms", report.run_id, took.num_milliseconds());
    println!("  applied:      {}", report.applied);
    println!("  deleted:      {}", report.deleted);
    println!("  echo skipped: {}", report.echo_skipped);
    println!("  failed:       {}", report.failed);
}

/// Console logging always, plus a non-blocking file layer when one is
/// configured. The returned guard must stay alive for the process lifetime
/// or buffered log lines are lost.
fn init_logging(settings: &config::DaemonSettings) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "mirror={0},mirror_daemon={0}",
            settings.log_level
        ))
    });

    let (file_layer, guard) = if let Some(log_path) = &settings.log_file {
        let dir = match log_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let file_name = log_path
            .file_name()
            .unwrap_or_else(|| OsStr::new("mirror-daemon.log"));

        let (non_blocking, guard) = tracing_appender::non_blocking(rolling::never(dir, file_name));
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}
