//! Game module
//!
//! This module contains the core game logic for the Gridscape server:
//! - AOI grid (spatial index of players by cell)
//! - World registry (connected players, id allocation, spawn placement)
//! - Player entities (position, cell, lifecycle, outbound messages)
//! - View synchronization (appear / depart / move fan-out)
//! - Message handlers and connection hooks

pub mod aoi;
pub mod handlers;
pub mod player;
pub mod sync;
pub mod world;

pub use aoi::{AoiGrid, Cell, CellId};
pub use player::{Player, PlayerId, PlayerState, Position, Transition};
pub use world::{World, WorldStats};
