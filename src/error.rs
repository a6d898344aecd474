//! Error handling module
//!
//! Defines custom error types for the Gridscape server.

use std::io;

use thiserror::Error;

/// Main error type for the Gridscape server
#[derive(Error, Debug)]
pub enum GridscapeError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Protocol-related errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Game logic errors
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Network-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Too many connections: {0}")]
    TooManyConnections(usize),

    #[error("Write buffer full")]
    WriteBufferFull,

    #[error("Read error: {0}")]
    ReadError(String),

    #[error("Write error: {0}")]
    WriteError(String),
}

/// Protocol-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Packet too large: {size} bytes (max: {max})")]
    PacketTooLarge { size: usize, max: usize },

    #[error("Malformed message {msg_id}: {reason}")]
    MalformedMessage { msg_id: u32, reason: String },
}

/// Game logic errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GameError {
    #[error("Player not found: {0}")]
    PlayerNotFound(i32),

    #[error("Invalid player state: {0}")]
    InvalidPlayerState(String),

    #[error("Invalid grid layout: {0}")]
    InvalidGrid(String),

    #[error("Invalid spawn area: {0}")]
    InvalidSpawn(String),

    #[error("Connection has no player attached")]
    NoPlayerAttached,

    #[error("World full")]
    WorldFull,
}

/// Result type alias for Gridscape operations
pub type Result<T> = std::result::Result<T, GridscapeError>;
