//! Application state module
//!
//! Contains the shared state used across all server connections.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::game::handlers::game_router;
use crate::game::world::World;
use crate::net::router::Router;
use crate::net::session::SessionManager;

/// Application state shared across all connections
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Session manager for tracking connected clients
    pub session_manager: SessionManager,
    /// Game world state
    pub world: Arc<World>,
    /// Inbound message router with the world's hooks installed
    pub router: Router,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Create the application state from configuration
    pub fn new(config: ServerConfig, shutdown_tx: broadcast::Sender<()>) -> Result<Self> {
        let world = Arc::new(World::from_config(&config)?);
        let router = game_router(world.clone());

        let session_manager = SessionManager::with_limits(
            config.max_players as usize,
            config.outbound_queue_size,
        );

        info!(
            max_players = config.max_players,
            outbound_queue_size = config.outbound_queue_size,
            handlers = router.handler_count(),
            "Application state initialized"
        );

        Ok(Self {
            config,
            session_manager,
            world,
            router,
            shutdown_tx,
        })
    }

    /// Subscribe to the shutdown signal
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}
