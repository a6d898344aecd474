//! View synchronization
//!
//! Decides who has to hear about a player's spawn, move or departure and
//! sends the notices. Every function here runs after the player's own
//! position lock has been released, and a failed send to one peer never
//! stops the rest of the fan-out.
//!
//! For a move between cells the two 3x3 neighborhoods are diffed:
//! - cells only in the old view: both sides get a departure notice
//! - cells only in the new view: both sides get an appearance notice
//! - cells in both views: peers get the moved position
//!
//! so a peer receives exactly one notice per transition.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::game::aoi::{AoiGrid, CellId};
use crate::game::player::{Player, PlayerId, Transition};
use crate::game::world::World;
use crate::protocol::frame::Frame;
use crate::protocol::packets::{
    BroadcastPacket, DepartedPacket, PlayerSnapshot, SyncPlayersPacket,
};

/// Cells entering, leaving and staying in view across one transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellDiff {
    pub leaving: Vec<CellId>,
    pub entering: Vec<CellId>,
    pub retained: Vec<CellId>,
}

impl CellDiff {
    /// Diff the neighborhoods of two cells; `None` stands for "no view"
    pub fn between(grid: &AoiGrid, from: Option<CellId>, to: Option<CellId>) -> Self {
        let old = from.map(|gid| grid.neighborhood_of(gid)).unwrap_or_default();
        let new = to.map(|gid| grid.neighborhood_of(gid)).unwrap_or_default();

        let old_set: HashSet<CellId> = old.iter().copied().collect();
        let new_set: HashSet<CellId> = new.iter().copied().collect();

        Self {
            leaving: old
                .iter()
                .copied()
                .filter(|gid| !new_set.contains(gid))
                .collect(),
            entering: new
                .iter()
                .copied()
                .filter(|gid| !old_set.contains(gid))
                .collect(),
            retained: new
                .iter()
                .copied()
                .filter(|gid| old_set.contains(gid))
                .collect(),
        }
    }

    /// Whether the view is unchanged
    pub fn is_unchanged(&self) -> bool {
        self.leaving.is_empty() && self.entering.is_empty()
    }
}

/// Counts of notices sent by one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Appearance notices delivered (either direction)
    pub appeared: usize,
    /// Departure notices delivered (either direction)
    pub departed: usize,
    /// Moved-position notices delivered
    pub moved: usize,
    /// Chat lines delivered
    pub chat: usize,
    /// Sends that failed and were dropped
    pub failed: usize,
}

impl SyncReport {
    /// Total notices delivered
    pub fn delivered(&self) -> usize {
        self.appeared + self.departed + self.moved + self.chat
    }
}

#[derive(Clone, Copy)]
enum Notice {
    Appeared,
    Departed,
    Moved,
    Chat,
}

impl SyncReport {
    fn record(&mut self, notice: Notice, sent: bool) {
        if !sent {
            self.failed += 1;
            return;
        }
        match notice {
            Notice::Appeared => self.appeared += 1,
            Notice::Departed => self.departed += 1,
            Notice::Moved => self.moved += 1,
            Notice::Chat => self.chat += 1,
        }
    }

    fn deliver(&mut self, to: &Player, frame: &Frame, notice: Notice) {
        let sent = to.send_frame(frame);
        self.record(notice, sent);
    }
}

fn peers_except(players: Vec<Arc<Player>>, id: PlayerId) -> Vec<Arc<Player>> {
    players.into_iter().filter(|peer| peer.id() != id).collect()
}

/// Initial sync after a player enters the world
///
/// The player gets its own spawn position, every peer in view gets an
/// appearance notice, and the player gets a snapshot of those peers.
pub fn sync_spawn(world: &World, player: &Player, transition: &Transition) -> SyncReport {
    let mut report = SyncReport::default();
    let Some(gid) = transition.to else {
        return report;
    };

    let appear = Frame::from_packet(&BroadcastPacket::position(
        player.id(),
        transition.position,
    ));
    report.deliver(player, &appear, Notice::Appeared);

    let peers = peers_except(world.players_around(gid), player.id());
    for peer in &peers {
        report.deliver(peer, &appear, Notice::Appeared);
    }

    let snapshot = SyncPlayersPacket {
        players: peers
            .iter()
            .map(|peer| PlayerSnapshot {
                pid: peer.id(),
                position: peer.position(),
            })
            .collect(),
    };
    let sent = player.send(&snapshot);
    report.record(Notice::Appeared, sent);

    debug!(
        player_id = player.id(),
        cell = gid,
        peers = peers.len(),
        "Spawn synced"
    );
    report
}

/// Sync after a position update
pub fn sync_move(world: &World, player: &Player, transition: &Transition) -> SyncReport {
    let mut report = SyncReport::default();
    let id = player.id();
    let position = transition.position;
    let moved = Frame::from_packet(&BroadcastPacket::moved(id, position));

    if !transition.crossed_cells() {
        if let Some(gid) = transition.to {
            for peer in peers_except(world.players_around(gid), id) {
                report.deliver(&peer, &moved, Notice::Moved);
            }
        }
        return report;
    }

    let diff = CellDiff::between(world.grid(), transition.from, transition.to);

    let departed = Frame::from_packet(&DepartedPacket { pid: id });
    for peer in peers_except(world.players_in_cells(&diff.leaving), id) {
        report.deliver(&peer, &departed, Notice::Departed);
        let sent = player.send(&DepartedPacket { pid: peer.id() });
        report.record(Notice::Departed, sent);
    }

    let appeared = Frame::from_packet(&BroadcastPacket::position(id, position));
    for peer in peers_except(world.players_in_cells(&diff.entering), id) {
        report.deliver(&peer, &appeared, Notice::Appeared);
        let sent = player.send(&BroadcastPacket::position(peer.id(), peer.position()));
        report.record(Notice::Appeared, sent);
    }

    for peer in peers_except(world.players_in_cells(&diff.retained), id) {
        report.deliver(&peer, &moved, Notice::Moved);
    }

    debug!(
        player_id = id,
        from = ?transition.from,
        to = ?transition.to,
        leaving_cells = diff.leaving.len(),
        entering_cells = diff.entering.len(),
        "Cell change synced"
    );
    report
}

/// Tell everyone who could see a departing player that it is gone
///
/// The departing player's own connection is closing, so it gets nothing.
pub fn sync_departure(world: &World, player: &Player, transition: &Transition) -> SyncReport {
    let Some(gid) = transition.from else {
        return SyncReport::default();
    };
    sync_eviction(world, player.id(), gid)
}

/// Departure notices for an id last seen in `gid`, by id alone
///
/// Used when the player entity is already gone from the registry.
pub fn sync_eviction(world: &World, id: PlayerId, gid: CellId) -> SyncReport {
    let mut report = SyncReport::default();
    let departed = Frame::from_packet(&DepartedPacket { pid: id });
    for peer in peers_except(world.players_around(gid), id) {
        report.deliver(&peer, &departed, Notice::Departed);
    }
    report
}

/// World chat: every registered player hears it, the sender included
pub fn broadcast_chat(world: &World, sender: PlayerId, content: &str) -> SyncReport {
    let mut report = SyncReport::default();
    let chat = Frame::from_packet(&BroadcastPacket::chat(sender, content));
    for player in world.all_players() {
        report.deliver(&player, &chat, Notice::Chat);
    }
    report
}
