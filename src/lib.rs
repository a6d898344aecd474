//! Gridscape Game Server Library
//!
//! This library provides the core functionality for the Gridscape game server:
//! a TCP MMO world whose players only hear about the players near them.
//!
//! ## Modules
//!
//! - `config` - Server configuration management
//! - `error` - Error types and result definitions
//! - `game` - AOI grid, world registry, players and view synchronization
//! - `net` - Connections, sessions, routing and the TCP connection handler
//! - `protocol` - Frame codec and message payloads

pub mod config;
pub mod error;
pub mod game;
pub mod net;
pub mod protocol;
pub mod state;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{GridscapeError, Result};
pub use state::AppState;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
