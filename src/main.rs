use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipeline_core::AppConfig;
use pipeline_infrastructure::{init_logging, init_metrics};
use tokio::signal;
use tracing::{info, warn};

mod app;

use app::Application;

#[derive(Debug, Parser)]
#[command(name = "pipelines", version, about = "Pipeline execution control plane")]
struct Cli {
    /// TOML configuration file; defaults are searched when omitted.
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<String>,

    /// Overrides `observability.log_level`.
    #[arg(short, long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API server.
    Serve {
        /// Do not apply database migrations at start-up.
        #[arg(long)]
        skip_migrations: bool,
    },
    /// Apply database migrations and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).with_context(|| {
        format!(
            "Failed to load configuration{}",
            cli.config
                .as_deref()
                .map(|path| format!(" from {path}"))
                .unwrap_or_default()
        )
    })?;
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    init_logging(&config.observability)?;

    match cli.command {
        Command::Migrate => app::migrate(&config).await,
        Command::Serve { skip_migrations } => {
            init_metrics(&config.observability)?;
            info!(version = env!("CARGO_PKG_VERSION"), "Starting pipelines server");
            let application = Application::new(config, !skip_migrations).await?;
            application.serve(wait_for_shutdown_signal()).await
        }
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
