//! Game message handlers
//!
//! Connect/disconnect hooks and the inbound move and chat handlers. These are
//! the only places where the transport meets the world.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{GameError, GridscapeError, ProtocolError, Result};
use crate::game::player::{Player, PlayerId};
use crate::game::sync::{
    broadcast_chat, sync_departure, sync_eviction, sync_move, sync_spawn,
};
use crate::game::world::World;
use crate::net::connection::{Connection, PID_PROPERTY};
use crate::net::router::{ConnectionHooks, MessageHandler, Request, Router};
use crate::protocol::packets::{
    MessageId, MovePacket, Packet, PacketDecodeError, SyncPidPacket, TalkPacket,
};

/// Player id attached to a connection, if any
pub fn attached_player_id(connection: &dyn Connection) -> Option<PlayerId> {
    connection
        .property(PID_PROPERTY)
        .and_then(|value| value.as_int())
        .and_then(|id| PlayerId::try_from(id).ok())
}

fn decode<P: Packet>(request: &Request) -> Result<P> {
    P::from_payload(&request.payload).map_err(|e: PacketDecodeError| {
        GridscapeError::Protocol(ProtocolError::MalformedMessage {
            msg_id: request.msg_id,
            reason: e.to_string(),
        })
    })
}

fn player_for(world: &World, request: &Request) -> Result<Arc<Player>> {
    let id =
        attached_player_id(request.connection.as_ref()).ok_or(GameError::NoPlayerAttached)?;
    world
        .get_player(id)
        .ok_or_else(|| GameError::PlayerNotFound(id).into())
}

/// Spawns a player for every new connection and removes it on disconnect
pub struct WorldHooks {
    world: Arc<World>,
}

impl WorldHooks {
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }
}

impl ConnectionHooks for WorldHooks {
    fn on_connect(&self, connection: &Arc<dyn Connection>) {
        let id = self.world.allocate_id();
        let position = self.world.spawn_position();
        let player = Arc::new(Player::new(id, connection.clone(), position));

        let transition = match self.world.add_player(player.clone()) {
            Ok(transition) => transition,
            Err(e) => {
                warn!(
                    session_id = connection.id(),
                    player_id = id,
                    error = %e,
                    "Failed to add player to world"
                );
                return;
            }
        };

        connection.set_property(PID_PROPERTY, id.into());
        player.send(&SyncPidPacket { pid: id });

        let report = sync_spawn(&self.world, &player, &transition);

        info!(
            session_id = connection.id(),
            player_id = id,
            position = %position,
            cell = ?transition.to,
            online = self.world.player_count(),
            "Player joined"
        );
        debug!(player_id = id, report = ?report, "Spawn fan-out");
    }

    fn on_disconnect(&self, connection: &Arc<dyn Connection>) {
        let Some(id) = attached_player_id(connection.as_ref()) else {
            debug!(
                session_id = connection.id(),
                "Disconnect without an attached player"
            );
            return;
        };

        let Some(player) = self.world.get_player(id) else {
            // Owning cell is unknown here
            let evicted = self.world.grid().evict(id);
            if let Some(gid) = evicted {
                let report = sync_eviction(&self.world, id, gid);
                debug!(player_id = id, report = ?report, "Departure fan-out");
            }
            warn!(
                session_id = connection.id(),
                player_id = id,
                cell = ?evicted,
                "Disconnecting player already gone from the world"
            );
            connection.remove_property(PID_PROPERTY);
            return;
        };

        if let Some(transition) = player.detach(self.world.grid()) {
            let report = sync_departure(&self.world, &player, &transition);
            debug!(player_id = id, report = ?report, "Departure fan-out");
        }
        self.world.remove_player(id);
        connection.remove_property(PID_PROPERTY);

        info!(
            session_id = connection.id(),
            player_id = id,
            online = self.world.player_count(),
            "Player left"
        );
    }
}

/// Handles position updates (message 3)
pub struct MoveHandler {
    world: Arc<World>,
}

impl MoveHandler {
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }
}

impl MessageHandler for MoveHandler {
    fn handle(&self, request: &Request) -> Result<()> {
        let packet: MovePacket = decode(request)?;
        let player = player_for(&self.world, request)?;

        let Some(transition) = player.relocate(self.world.grid(), packet.position) else {
            return Ok(());
        };

        let report = sync_move(&self.world, &player, &transition);
        debug!(
            player_id = player.id(),
            position = %transition.position,
            from = ?transition.from,
            to = ?transition.to,
            report = ?report,
            "Player moved"
        );
        Ok(())
    }
}

/// Handles world chat (message 2)
pub struct ChatHandler {
    world: Arc<World>,
}

impl ChatHandler {
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }
}

impl MessageHandler for ChatHandler {
    fn handle(&self, request: &Request) -> Result<()> {
        let packet: TalkPacket = decode(request)?;
        let player = player_for(&self.world, request)?;

        let report = broadcast_chat(&self.world, player.id(), &packet.content);
        debug!(
            player_id = player.id(),
            len = packet.content.len(),
            report = ?report,
            "Chat broadcast"
        );
        Ok(())
    }
}

/// Build a router with the world hooks and game handlers installed
pub fn game_router(world: Arc<World>) -> Router {
    let mut router = Router::new();
    router.set_hooks(Arc::new(WorldHooks::new(world.clone())));
    router.register(
        MessageId::Move.as_u32(),
        Arc::new(MoveHandler::new(world.clone())),
    );
    router.register(MessageId::Talk.as_u32(), Arc::new(ChatHandler::new(world)));
    router
}
