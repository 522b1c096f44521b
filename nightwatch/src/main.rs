//! night-watch daemon entry point: parses the single configuration-path
//! argument, initializes logging from it, wires up the `Runtime`, starts
//! the task lifecycle engine, and — when enabled — serves the Control
//! API until a shutdown signal arrives.

mod api;
mod runtime;

use std::path::PathBuf;

use clap::Parser;
use shared::runtime_config::LogFormat;
use shared::RuntimeConfig;
use tracing::{error, info};

use crate::runtime::Runtime;

/// Command-line arguments for the night-watch daemon.
#[derive(Parser, Debug)]
#[command(name = "night-watch")]
#[command(about = "Monitoring daemon that evaluates tasks against providers on a schedule", long_about = None)]
struct CliArgs {
    /// Path to the main YAML configuration file.
    #[arg(value_name = "CONFIG_PATH")]
    config_path: PathBuf,
}

fn init_logging(config: &shared::runtime_config::LoggingConfig) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender =
        tracing_appender::rolling::daily(&config.directory, &config.file_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("night_watch={0},nightwatch={0},shared={0}", config.level)));

    match config.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(non_blocking)
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(non_blocking)
                .init();
        }
    }

    guard
}

#[tokio::main]
async fn main() {
    let cli_args = CliArgs::parse();

    let config = match RuntimeConfig::load(&cli_args.config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: failed to load configuration: {e}");
            std::process::exit(255);
        }
    };

    let _log_guard = init_logging(&config.logging);

    info!(config_path = %cli_args.config_path.display(), "night-watch starting up");

    let runtime = Runtime::new(config);

    if let Err(e) = runtime.task_manager.start().await {
        error!("failed to start task manager: {e:#}");
        std::process::exit(2);
    }

    let webserver_handle = if runtime.config.config.webserver_enabled {
        Some(spawn_webserver(runtime.clone()))
    } else {
        info!("webserver disabled, running without the Control API");
        None
    };

    wait_for_shutdown_signal().await;

    info!("shutdown signal received, stopping task manager");
    if let Err(e) = runtime
        .task_manager
        .stop(Some(std::time::Duration::from_secs(30)))
        .await
    {
        error!("error while stopping task manager: {e:#}");
    }

    if let Some(handle) = webserver_handle {
        handle.abort();
    }

    info!("night-watch shut down cleanly");
    std::process::exit(0);
}

fn spawn_webserver(runtime: std::sync::Arc<Runtime>) -> tokio::task::JoinHandle<()> {
    let port = runtime.config.config.webserver_port;
    tokio::spawn(async move {
        let state = api::AppState { runtime };
        let app = api::create_router(state);
        let addr = format!("0.0.0.0:{port}");
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("failed to bind Control API listener on {addr}: {e}");
                return;
            }
        };
        info!(address = %addr, "Control API listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!("Control API server error: {e}");
        }
    })
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
        info!("received Ctrl+C");
    }
}
