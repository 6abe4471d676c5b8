//! Multiplay bridge - console host
//!
//! Runs the status bridge standalone: loads the YAML config with hot reload,
//! logs variable and feedback changes, and optionally accepts console commands.

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use multiplay_bridge::cli::{self, ConsoleCommand};
use multiplay_bridge::config::ConfigWatcher;
use multiplay_bridge::MultiplayBridge;

/// Multiplay bridge - track a Multiplay device's status over OSC
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Read commands from the terminal
    #[arg(long)]
    repl: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting Multiplay bridge...");
    info!("Configuration file: {}", args.config);

    let (config_watcher, initial_config) = ConfigWatcher::new(args.config.clone()).await?;
    info!("Configuration loaded successfully with hot-reload enabled");

    let bridge = MultiplayBridge::new(initial_config)?;

    bridge.subscribe_variables(|vars| {
        for var in vars {
            debug!(variable = var.id, value = %var.value, "Variable updated");
        }
        Ok(())
    });

    bridge.init().await?;

    run_app(&bridge, config_watcher, args.repl, shutdown_signal()).await?;

    bridge.destroy().await;
    info!("Multiplay bridge shutdown complete");
    Ok(())
}

async fn run_app(
    bridge: &MultiplayBridge,
    mut config_watcher: ConfigWatcher,
    repl: bool,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let (console_tx, mut console_rx) = mpsc::unbounded_channel();
    if repl {
        cli::spawn_repl(console_tx)?;
        cli::print_help();
    } else {
        drop(console_tx);
    }

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(new_config) = config_watcher.next_config() => {
                info!("📝 Configuration file changed, applying...");
                if let Err(e) = bridge.config_updated(new_config).await {
                    warn!("⚠️  Failed to apply config: {}", e);
                }
            }

            Some(command) = console_rx.recv() => {
                match command {
                    ConsoleCommand::Status => cli::print_status(bridge),
                    ConsoleCommand::Help => cli::print_help(),
                    ConsoleCommand::Send { address, args } => {
                        if let Err(e) = bridge.send_command(&address, args).await {
                            warn!("Failed to send {}: {}", address, e);
                        }
                    }
                    ConsoleCommand::Quit => {
                        info!("Quit requested");
                        break;
                    }
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
