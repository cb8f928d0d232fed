//! netcfgd entry point.
//!
//! Validates, renders or applies a declarative network configuration. In
//! `run` mode the daemon also starts the enabled applications and keeps
//! them up until a shutdown or reboot is requested.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use osd_common::{
    Application, ApplicationRegistry, CancellationToken, CommandRunner, ControlAction,
    LifecycleEvents, SystemRunner,
};
use osd_netcfgd::config_file::DEFAULT_CONFIG_PATH;
use osd_netcfgd::system::export_proxy_variables;
use osd_netcfgd::{
    generate, generate_timesync, load_network_config, validate, DaemonConfig, NetworkApplier,
};

/// Appliance network configuration daemon
#[derive(Parser, Debug)]
#[command(name = "netcfgd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Daemon configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a network configuration without touching the host
    Validate { file: PathBuf },

    /// Print the units a network configuration would produce
    Render { file: PathBuf },

    /// Apply a network configuration and wait for it to converge
    Apply { file: PathBuf },

    /// Apply, start applications and wait for a shutdown request
    Run { file: PathBuf },
}

/// Initialize tracing/logging.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Cancels `cancel` and fires a shutdown event on SIGINT or SIGTERM.
fn spawn_signal_handler(cancel: CancellationToken, events: LifecycleEvents) {
    tokio::spawn(async move {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Received SIGINT, shutting down");
                        events.trigger(ControlAction::Shutdown);
                        cancel.cancel();
                    }
                    return;
                }
            };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
        events.trigger(ControlAction::Shutdown);
        cancel.cancel();
    });
}

fn cmd_validate(file: &Path) -> anyhow::Result<()> {
    let network = load_network_config(file)?;
    validate(&network)?;
    println!("{}: valid", file.display());
    Ok(())
}

fn cmd_render(file: &Path) -> anyhow::Result<()> {
    let network = load_network_config(file)?;
    validate(&network)?;

    for unit in generate(&network) {
        println!("# {}\n{}", unit.name, unit.contents);
    }
    if let Some(timesync) = generate_timesync(network.ntp.as_ref()) {
        println!("# timesyncd\n{}", timesync);
    }
    Ok(())
}

async fn cmd_apply(
    config: &DaemonConfig,
    runner: Arc<dyn CommandRunner>,
    file: &Path,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let network = load_network_config(file)?;
    validate(&network)?;
    // The env file is written by the apply itself; this process's own
    // environment follows here, before any command is spawned.
    export_proxy_variables(network.proxy.as_ref());

    let applier = NetworkApplier::new(runner, config);
    applier
        .apply(&network, config.apply_timeout(), cancel)
        .await
        .with_context(|| format!("Failed to apply {}", file.display()))?;
    Ok(())
}

async fn cmd_run(
    config: &DaemonConfig,
    runner: Arc<dyn CommandRunner>,
    file: &Path,
    cancel: &CancellationToken,
    events: &LifecycleEvents,
) -> anyhow::Result<()> {
    cmd_apply(config, runner.clone(), file, cancel).await?;

    let registry = ApplicationRegistry::with_builtins();
    let mut started: Vec<Box<dyn Application>> = Vec::new();
    for name in &config.applications.enabled {
        let app = registry.load(name, runner.clone());
        if let Err(e) = app.start(cancel).await {
            error!(application = %name, "Failed to start application: {}", e);
            continue;
        }
        started.push(app);
    }

    info!(applications = started.len(), "Waiting for a control event");
    let action = events.wait().await;
    info!(action = %action, "Control event received");

    // The signal handler may have cancelled the shared token already.
    let stop = CancellationToken::new();
    for app in started.iter().rev() {
        if let Err(e) = app.stop(&stop).await {
            warn!(application = %app.name(), "Failed to stop application: {}", e);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging();

    let config = match DaemonConfig::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("netcfgd error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let events = LifecycleEvents::new();
    spawn_signal_handler(cancel.clone(), events.clone());

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new());
    let result = match &args.command {
        Command::Validate { file } => cmd_validate(file),
        Command::Render { file } => cmd_render(file),
        Command::Apply { file } => cmd_apply(&config, runner, file, &cancel).await,
        Command::Run { file } => cmd_run(&config, runner, file, &cancel, &events).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("netcfgd error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
