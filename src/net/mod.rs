//! Networking module
//!
//! This module handles all network-related functionality for the Gridscape server:
//! - The `Connection` abstraction the game core sends through
//! - Session management and per-session outbound queues
//! - Framed TCP transport and outbound throttling
//! - Message routing and the connection lifecycle

pub mod buffer;
pub mod connection;
pub mod handler;
pub mod router;
pub mod session;
pub mod throttle;
pub mod transport;

pub use connection::{Connection, PropertyBag, PropertyValue, PID_PROPERTY};
pub use router::{ConnectionHooks, MessageHandler, Request, Router};
pub use session::{Session, SessionId, SessionManager};
