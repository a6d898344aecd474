//! Gridscape Game Server
//!
//! TCP MMO server with grid-based area-of-interest synchronization.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gridscape_server::config::ServerConfig;
use gridscape_server::net::handler::ConnectionHandler;
use gridscape_server::state::AppState;
use gridscape_server::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = ServerConfig::load().await?;

    // Initialize logging
    init_logging(config.debug, config.log_json);

    info!("╔══════════════════════════════════════════════╗");
    info!("║        Gridscape Game Server v{}          ║", VERSION);
    info!("╚══════════════════════════════════════════════╝");
    if config.config_path.exists() {
        info!(
            "Configuration loaded from: {}",
            config.config_path.display()
        );
    } else {
        warn!(
            "No configuration file at {}, using defaults",
            config.config_path.display()
        );
    }

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let state = Arc::new(AppState::new(config.clone(), shutdown_tx.clone())?);

    // Periodic world statistics
    let stats_handle = if config.stats_interval_secs > 0 {
        let stats_state = state.clone();
        let mut stats_shutdown_rx = shutdown_tx.subscribe();
        let period = Duration::from_secs(config.stats_interval_secs);
        Some(tokio::spawn(async move {
            stats_state
                .world
                .run_stats(period, &mut stats_shutdown_rx)
                .await;
        }))
    } else {
        None
    };

    // Start TCP listener for game connections
    let game_addr: SocketAddr = config.bind_address().parse()?;
    let game_listener = TcpListener::bind(game_addr).await?;
    info!("Game server listening on: {}", game_addr);

    // Spawn game connection acceptor
    let game_state = state.clone();
    let mut game_shutdown_rx = shutdown_tx.subscribe();
    let game_handle = tokio::spawn(async move {
        accept_game_connections(game_listener, game_state, &mut game_shutdown_rx).await;
    });

    info!("Server startup complete!");
    info!(
        columns = state.world.grid().columns(),
        rows = state.world.grid().rows(),
        "{} is ready for connections",
        config.server_name
    );

    // Wait for shutdown signal
    wait_for_shutdown(shutdown_tx.clone()).await;

    info!("Shutting down server...");

    // Wait for handlers to finish
    let _ = game_handle.await;
    if let Some(handle) = stats_handle {
        let _ = handle.await;
    }

    // Cleanup
    state.session_manager.disconnect_all();
    info!(
        remaining_players = state.world.player_count(),
        "All sessions disconnected"
    );

    info!("Server shutdown complete. Goodbye!");
    Ok(())
}

/// Initialize the logging/tracing system
///
/// `RUST_LOG` overrides the default filter. With `json` every event is one
/// JSON object per line.
fn init_logging(debug: bool, json: bool) {
    let default_filter = if debug {
        "debug,gridscape_server=trace"
    } else {
        "info,gridscape_server=debug"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_current_span(false),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_level(true),
            )
            .init();
    }
}

/// Accept incoming game (TCP) connections
async fn accept_game_connections(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        info!("New game connection from: {}", addr);
                        let handler = ConnectionHandler::new(state.clone());
                        tokio::spawn(async move {
                            if let Err(e) = handler.handle_tcp(stream, addr).await {
                                warn!("Game connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept game connection: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Game connection acceptor shutting down");
                break;
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
}
