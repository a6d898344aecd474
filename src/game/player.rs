//! Player module
//!
//! Per-connection player state:
//! - Identity and the connection handle used for outbound messages
//! - Position and the last known AOI cell
//! - Lifecycle state (connecting -> active -> disconnected)
//!
//! Position and cell membership change together under the player's own lock,
//! so a player's grid entry always matches its position. The lock is never
//! held while sending.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::game::aoi::{AoiGrid, CellId};
use crate::net::connection::Connection;
use crate::protocol::frame::Frame;
use crate::protocol::packets::Packet;

/// Player identifier, allocated by the world starting at 1
pub type PlayerId = i32;

/// Position on the world plane
///
/// `x` and `z` are planar, `y` is elevation and `v` the heading in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub v: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32, v: f32) -> Self {
        Self { x, y, z, v }
    }

    /// Planar position at ground level facing 0 degrees
    pub fn planar(x: f32, z: f32) -> Self {
        Self::new(x, 0.0, z, 0.0)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// Player lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerState {
    /// Created but not yet placed in the world
    Connecting,
    /// Placed in the grid and receiving updates
    Active,
    /// Removed from the grid; terminal
    Disconnected,
}

impl PlayerState {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerState::Connecting => "Connecting",
            PlayerState::Active => "Active",
            PlayerState::Disconnected => "Disconnected",
        }
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Cell change produced by one position update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    /// Cell before the update; `None` when spawning
    pub from: Option<CellId>,
    /// Cell after the update; `None` when leaving the world
    pub to: Option<CellId>,
    /// Position after the update (last position when leaving)
    pub position: Position,
}

impl Transition {
    /// Whether the update moved the player into a different cell
    pub fn crossed_cells(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug)]
struct Motion {
    position: Position,
    cell: Option<CellId>,
    state: PlayerState,
}

/// A connected player
pub struct Player {
    id: PlayerId,
    connection: Arc<dyn Connection>,
    motion: Mutex<Motion>,
}

impl Player {
    /// Create a player at `position`; it is not in the grid until [`Player::enter`]
    pub fn new(id: PlayerId, connection: Arc<dyn Connection>, position: Position) -> Self {
        Self {
            id,
            connection,
            motion: Mutex::new(Motion {
                position,
                cell: None,
                state: PlayerState::Connecting,
            }),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn position(&self) -> Position {
        self.motion.lock().position
    }

    /// Last known cell
    pub fn cell(&self) -> Option<CellId> {
        self.motion.lock().cell
    }

    pub fn state(&self) -> PlayerState {
        self.motion.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == PlayerState::Active
    }

    /// Insert into the grid at the current position and become active
    ///
    /// Returns `None` unless the player was still connecting.
    pub fn enter(&self, grid: &AoiGrid) -> Option<Transition> {
        let mut motion = self.motion.lock();
        if motion.state != PlayerState::Connecting {
            return None;
        }

        let gid = grid.insert(self.id, motion.position.x, motion.position.z);
        motion.cell = Some(gid);
        motion.state = PlayerState::Active;

        Some(Transition {
            from: None,
            to: Some(gid),
            position: motion.position,
        })
    }

    /// Update the position and grid membership as one step
    ///
    /// Returns `None` when the player is not active; the update is dropped.
    pub fn relocate(&self, grid: &AoiGrid, position: Position) -> Option<Transition> {
        let mut motion = self.motion.lock();
        if motion.state != PlayerState::Active {
            debug!(
                player_id = self.id,
                state = %motion.state,
                "Ignoring position update"
            );
            return None;
        }

        let from = motion.cell;
        let to = grid.cell_id_for(position.x, position.z);
        match from {
            Some(old) => grid.move_between(self.id, old, to),
            None => {
                grid.insert_at(self.id, to);
            }
        }
        motion.position = position;
        motion.cell = Some(to);

        Some(Transition {
            from,
            to: Some(to),
            position,
        })
    }

    /// Leave the grid and become disconnected
    ///
    /// Returns `None` if the player had already left.
    pub fn detach(&self, grid: &AoiGrid) -> Option<Transition> {
        let mut motion = self.motion.lock();
        if motion.state == PlayerState::Disconnected {
            return None;
        }

        let from = motion.cell.take();
        if let Some(gid) = from {
            grid.remove(self.id, gid);
        }
        motion.state = PlayerState::Disconnected;

        Some(Transition {
            from,
            to: None,
            position: motion.position,
        })
    }

    /// Send an already-encoded frame
    ///
    /// Failures are logged and dropped; returns whether the frame was queued.
    pub fn send_frame(&self, frame: &Frame) -> bool {
        self.send_raw(frame.msg_id, frame.payload.clone())
    }

    /// Encode and send a packet
    pub fn send<P: Packet>(&self, packet: &P) -> bool {
        self.send_raw(P::msg_id(), packet.to_payload())
    }

    fn send_raw(&self, msg_id: u32, payload: Bytes) -> bool {
        match self.connection.send(msg_id, payload) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    player_id = self.id,
                    session_id = self.connection.id(),
                    msg_id = msg_id,
                    error = %e,
                    "Failed to send message"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let motion = self.motion.lock();
        f.debug_struct("Player")
            .field("id", &self.id)
            .field("session_id", &self.connection.id())
            .field("position", &motion.position)
            .field("cell", &motion.cell)
            .field("state", &motion.state)
            .finish()
    }
}
