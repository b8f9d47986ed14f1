//! Padrelay Daemon - Main Entry Point
//!
//! Loads the macro directory, listens for relay clients and drives one
//! virtual gamepad per connected client.

use clap::Parser;
use padrelay_common::tracing;
use padrelayd::config::DaemonConfig;
use padrelayd::control::{self, ControlPlane};
use padrelayd::controller::UinputFactory;
use padrelayd::macro_table::MacroTable;
use padrelayd::server::RelayServer;
use padrelayd::DaemonState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "padrelayd", about = "Relay network macro triggers to a virtual gamepad", version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, value_name = "PATH", default_value = "padrelayd.yaml")]
    config: PathBuf,

    /// Macro directory (overrides the configuration)
    #[arg(long, value_name = "DIR")]
    macros: Option<PathBuf>,

    /// Listen port (overrides the configuration)
    #[arg(long)]
    port: Option<u16>,

    /// Compile every macro, report and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let loaded = DaemonConfig::load(&cli.config).await?;
    let config_missing = loaded.is_none();
    let mut config = loaded.unwrap_or_default();
    if let Some(macros) = cli.macros {
        config.macros.directory = macros;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Starting Padrelay Daemon v{}", env!("CARGO_PKG_VERSION"));
    if config_missing {
        warn!("Configuration file {} not found, using defaults", cli.config.display());
    }

    let macro_dir = config.macros.directory.clone();
    let macros = match MacroTable::load(&macro_dir).await {
        Ok(table) => Arc::new(table),
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };
    info!("{} macros loaded from {}", macros.len().await, macro_dir.display());

    if cli.check {
        return Ok(());
    }

    let controllers = Arc::new(UinputFactory {
        uinput_path: config.controller.uinput_path.clone(),
        device_name: config.controller.device_name.clone(),
    });
    let state = Arc::new(DaemonState {
        session: config.session_settings(),
        handshake_timeout: config.handshake_timeout(),
        ..DaemonState::new(Arc::clone(&macros), controllers)
    });

    // Operator console
    {
        let control = Arc::clone(&state.control);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            control::console_monitor(&control, stdin.lock());
        });
    }

    tokio::spawn(watch_signals(Arc::clone(&state.control)));
    tokio::spawn(reload_macros(Arc::clone(&state.control), macros, macro_dir));

    let server = RelayServer::bind(
        config.listen_address(),
        config.server.backlog,
        Arc::clone(&state),
    )?;
    server.run().await;

    info!(
        "Padrelay Daemon shutdown complete after {:?}",
        state.start_time.elapsed()
    );
    Ok(())
}

/// Translate process signals into control plane requests
async fn watch_signals(control: Arc<ControlPlane>) {
    let (mut terminate, mut interrupt, mut hangup) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::hangup()),
    ) {
        (Ok(terminate), Ok(interrupt), Ok(hangup)) => (terminate, interrupt, hangup),
        _ => {
            error!("Failed to install signal handlers");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = terminate.recv() => {
                info!("Received SIGTERM, shutting down gracefully");
                control.request_shutdown();
            }
            _ = interrupt.recv() => {
                info!("Received SIGINT, shutting down gracefully");
                control.request_shutdown();
            }
            _ = hangup.recv() => control.request_reload(),
            _ = control.cancelled() => break,
        }
    }
}

/// Recompile the macro directory whenever a reload is requested
async fn reload_macros(control: Arc<ControlPlane>, macros: Arc<MacroTable>, directory: PathBuf) {
    loop {
        tokio::select! {
            _ = control.reload_requested() => {
                if let Err(e) = macros.reload(&directory).await {
                    error!("Macro reload failed, keeping current macros: {}", e);
                }
            }
            _ = control.cancelled() => break,
        }
    }
}
