//! Player view synchronization module
//!
//! Computes which players must be told that someone appeared, departed or
//! moved, and fans the notices out through each player's connection.

pub mod view_sync;

pub use view_sync::{
    broadcast_chat, sync_departure, sync_eviction, sync_move, sync_spawn, CellDiff,
    SyncReport,
};
