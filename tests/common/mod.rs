//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use gridscape_server::config::{AoiConfig, SpawnConfig};
use gridscape_server::error::{NetworkError, Result};
use gridscape_server::game::handlers::game_router;
use gridscape_server::game::player::{PlayerId, Position};
use gridscape_server::game::world::World;
use gridscape_server::net::{
    Connection, PropertyBag, PropertyValue, Request, Router, PID_PROPERTY,
};
use gridscape_server::protocol::{
    BroadcastBody, BroadcastPacket, MessageId, MovePacket, Packet, ServerMessage, TalkPacket,
};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Connection that records every message sent to it
pub struct RecordingConnection {
    id: u64,
    sent: Mutex<Vec<(u32, Bytes)>>,
    failing: AtomicBool,
    properties: PropertyBag,
}

impl RecordingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::SeqCst),
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            properties: PropertyBag::new(),
        })
    }

    /// Make every later send fail as if the peer had gone away
    pub fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Decoded messages received so far, draining the record
    pub fn take(&self) -> Vec<ServerMessage> {
        std::mem::take(&mut *self.sent.lock())
            .into_iter()
            .map(|(msg_id, payload)| {
                ServerMessage::decode(msg_id, &payload).expect("server sent undecodable message")
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn pid(&self) -> Option<PlayerId> {
        self.property(PID_PROPERTY)
            .and_then(|value| value.as_int())
            .map(|id| id as PlayerId)
    }
}

impl Connection for RecordingConnection {
    fn id(&self) -> u64 {
        self.id
    }

    fn send(&self, msg_id: u32, payload: Bytes) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NetworkError::ConnectionClosed.into());
        }
        self.sent.lock().push((msg_id, payload));
        Ok(())
    }

    fn property(&self, key: &str) -> Option<PropertyValue> {
        self.properties.get(key)
    }

    fn set_property(&self, key: &str, value: PropertyValue) {
        self.properties.set(key, value)
    }

    fn remove_property(&self, key: &str) -> Option<PropertyValue> {
        self.properties.remove(key)
    }
}

/// 250 x 250 plane split into 5 x 5 cells of 50 units
pub fn small_layout() -> AoiConfig {
    AoiConfig {
        min_x: 0.0,
        max_x: 250.0,
        columns: 5,
        min_z: 0.0,
        max_z: 250.0,
        rows: 5,
    }
}

/// A world plus its router, wired the way the server wires them
pub struct Harness {
    pub world: Arc<World>,
    pub router: Router,
}

impl Harness {
    /// Every player spawns exactly at `(x, z)`
    pub fn new(x: f32, z: f32) -> Self {
        let spawn = SpawnConfig {
            origin_x: x,
            origin_z: z,
            jitter_x: 0.0,
            jitter_z: 0.0,
        };
        let world = Arc::new(World::new(small_layout(), spawn, 1000).unwrap());
        let router = game_router(world.clone());
        Self { world, router }
    }

    /// Connect a new client and return its connection
    pub fn connect(&self) -> Arc<RecordingConnection> {
        let conn = RecordingConnection::new();
        let dyn_conn: Arc<dyn Connection> = conn.clone();
        self.router.connect(&dyn_conn);
        conn
    }

    /// Connect a client and move it to `(x, z)`, then clear everyone's records
    pub fn connect_at(
        &self,
        x: f32,
        z: f32,
        others: &[&Arc<RecordingConnection>],
    ) -> Arc<RecordingConnection> {
        let conn = self.connect();
        self.move_to(&conn, x, z);
        conn.clear();
        for other in others {
            other.clear();
        }
        conn
    }

    pub fn disconnect(&self, conn: &Arc<RecordingConnection>) {
        let dyn_conn: Arc<dyn Connection> = conn.clone();
        self.router.disconnect(&dyn_conn);
    }

    pub fn move_to(&self, conn: &Arc<RecordingConnection>, x: f32, z: f32) {
        let payload = MovePacket {
            position: Position::new(x, 0.0, z, 0.0),
        }
        .to_payload();
        self.dispatch(conn, MessageId::Move, payload);
    }

    pub fn talk(&self, conn: &Arc<RecordingConnection>, content: &str) {
        let payload = TalkPacket {
            content: content.to_string(),
        }
        .to_payload();
        self.dispatch(conn, MessageId::Talk, payload);
    }

    fn dispatch(&self, conn: &Arc<RecordingConnection>, msg_id: MessageId, payload: Bytes) {
        self.try_dispatch(conn, msg_id.as_u32(), payload).unwrap();
    }

    /// Dispatch a raw message, returning the router's result
    pub fn try_dispatch(
        &self,
        conn: &Arc<RecordingConnection>,
        msg_id: u32,
        payload: Bytes,
    ) -> Result<bool> {
        let dyn_conn: Arc<dyn Connection> = conn.clone();
        self.router.dispatch(&Request::new(msg_id, payload, dyn_conn))
    }
}

/// Ids from departure notices
pub fn departed(messages: &[ServerMessage]) -> Vec<PlayerId> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Departed(p) => Some(p.pid),
            _ => None,
        })
        .collect()
}

/// Ids from appearance (position) broadcasts
pub fn appeared(messages: &[ServerMessage]) -> Vec<PlayerId> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Broadcast(BroadcastPacket {
                pid,
                body: BroadcastBody::Position(_),
            }) => Some(*pid),
            _ => None,
        })
        .collect()
}

/// Ids from moved broadcasts
pub fn moved(messages: &[ServerMessage]) -> Vec<PlayerId> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Broadcast(BroadcastPacket {
                pid,
                body: BroadcastBody::Moved(_),
            }) => Some(*pid),
            _ => None,
        })
        .collect()
}

/// Chat lines as `(sender, text)`
pub fn chats(messages: &[ServerMessage]) -> Vec<(PlayerId, String)> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Broadcast(BroadcastPacket {
                pid,
                body: BroadcastBody::Chat(text),
            }) => Some((*pid, text.clone())),
            _ => None,
        })
        .collect()
}
