//! Preview Supervisor - live-preview process lifecycle management.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use preview_supervisor::broadcast::{spawn_heartbeat, StatusBroadcaster};
use preview_supervisor::config::{ConfigLoader, ConfigOverrides, PreviewConfig};
use preview_supervisor::reclaim::{spawn_sweeper, WorkspaceReclaimer};
use preview_supervisor::server::PreviewServer;
use preview_supervisor::supervisor::ProcessSupervisor;

#[derive(Parser)]
#[command(
    name = "preview-supervisor",
    about = "Run, watch and reclaim live-preview dev servers",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the preview control API.
    Serve {
        /// Host address to bind to.
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on.
        #[arg(short, long)]
        port: Option<u16>,
        /// Path to a config file (overrides $PREVIEW_SUPERVISOR_CONFIG and the search path).
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

async fn serve(config: PreviewConfig) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancellationToken::new();
    let broadcaster = StatusBroadcaster::new(config.broadcast.subscriber_capacity);
    let reclaimer = WorkspaceReclaimer::new(config.workspace.grace());
    let supervisor =
        ProcessSupervisor::new(config.clone(), broadcaster.clone(), reclaimer.clone())?;

    let heartbeat = spawn_heartbeat(broadcaster, config.broadcast.heartbeat(), cancel.clone());
    let sweeper = spawn_sweeper(
        reclaimer.clone(),
        config.workspace.sweep_interval(),
        cancel.clone(),
    );

    let server =
        PreviewServer::new(supervisor.clone(), cancel.clone()).with_config(config.server.clone());
    let mut server_task = tokio::spawn(server.run());

    let finished_early = tokio::select! {
        result = &mut server_task => Some(result),
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Shutdown requested");
            None
        }
    };

    cancel.cancel();
    supervisor.shutdown().await;
    let removed = reclaimer.force_cleanup_all();
    tracing::info!(removed, "Workspaces cleaned up");

    let server_result = match finished_early {
        Some(result) => result,
        None => server_task.await,
    };
    let _ = tokio::join!(heartbeat, sweeper);

    server_result??;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve { host, port, config } => {
            let loader = config.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
            let overrides = ConfigOverrides { host, port };
            let result = match loader.load_with(&overrides) {
                Ok(config) => serve(config).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                tracing::error!(error = %e, "Preview supervisor failed");
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
    }
}
