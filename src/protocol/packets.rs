//! Packet definitions module
//!
//! Defines the message id catalog and the payload structures exchanged with
//! game clients. Every payload is a little-endian binary struct written with
//! [`PacketBuffer`]; the frame header carrying the message id is handled by
//! [`crate::protocol::frame`].

use bytes::Bytes;

use crate::game::player::{PlayerId, Position};
use crate::net::buffer::PacketBuffer;

/// Message ids used on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageId {
    /// Server -> client: the connection's assigned player id
    SyncPid = 1,
    /// Client -> server: world chat
    Talk = 2,
    /// Client -> server: position update
    Move = 3,
    /// Server -> client: chat or position broadcast
    Broadcast = 200,
    /// Server -> client: a player left the receiver's view
    Departed = 201,
    /// Server -> client: snapshot of every visible peer
    SyncPlayers = 202,
}

impl MessageId {
    /// Get the raw id value
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Convert from a raw id
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::SyncPid),
            2 => Some(Self::Talk),
            3 => Some(Self::Move),
            200 => Some(Self::Broadcast),
            201 => Some(Self::Departed),
            202 => Some(Self::SyncPlayers),
            _ => None,
        }
    }
}

/// A payload that knows its message id and binary layout
pub trait Packet: Sized {
    /// The message id this payload travels under
    const MSG_ID: MessageId;

    /// Encode the payload into a buffer
    fn encode(&self, buffer: &mut PacketBuffer);

    /// Decode the payload from a buffer
    fn decode(buffer: &mut PacketBuffer) -> Result<Self, PacketDecodeError>;

    /// Get the raw message id for this payload type
    fn msg_id() -> u32 {
        Self::MSG_ID.as_u32()
    }

    /// Encode to a standalone payload
    fn to_payload(&self) -> Bytes {
        let mut buffer = PacketBuffer::with_capacity(32);
        self.encode(&mut buffer);
        buffer.freeze()
    }

    /// Decode from a complete payload, rejecting trailing bytes
    fn from_payload(payload: &[u8]) -> Result<Self, PacketDecodeError> {
        let mut buffer = PacketBuffer::from_bytes(payload);
        let packet = Self::decode(&mut buffer)?;
        if buffer.has_remaining() {
            return Err(PacketDecodeError::Malformed(format!(
                "{} trailing bytes",
                buffer.remaining()
            )));
        }
        Ok(packet)
    }
}

/// Packet decode error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketDecodeError {
    /// Not enough data in buffer
    InsufficientData { expected: usize, actual: usize },
    /// Invalid field value
    InvalidValue { field: String, value: String },
    /// Malformed packet structure
    Malformed(String),
}

impl std::fmt::Display for PacketDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketDecodeError::InsufficientData { expected, actual } => {
                write!(
                    f,
                    "Insufficient data: expected {} bytes, got {}",
                    expected, actual
                )
            }
            PacketDecodeError::InvalidValue { field, value } => {
                write!(f, "Invalid value for field '{}': {}", field, value)
            }
            PacketDecodeError::Malformed(msg) => {
                write!(f, "Malformed packet: {}", msg)
            }
        }
    }
}

impl std::error::Error for PacketDecodeError {}

fn write_position(buffer: &mut PacketBuffer, position: &Position) {
    buffer.write_f32(position.x);
    buffer.write_f32(position.y);
    buffer.write_f32(position.z);
    buffer.write_f32(position.v);
}

fn read_position(buffer: &mut PacketBuffer) -> Result<Position, PacketDecodeError> {
    Ok(Position {
        x: buffer.read_f32()?,
        y: buffer.read_f32()?,
        z: buffer.read_f32()?,
        v: buffer.read_f32()?,
    })
}

// ============ Client -> Server ============

/// World chat request (message 2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TalkPacket {
    pub content: String,
}

impl Packet for TalkPacket {
    const MSG_ID: MessageId = MessageId::Talk;

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_string(&self.content);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, PacketDecodeError> {
        Ok(Self {
            content: buffer.read_string()?,
        })
    }
}

/// Position update request (message 3)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovePacket {
    pub position: Position,
}

impl Packet for MovePacket {
    const MSG_ID: MessageId = MessageId::Move;

    fn encode(&self, buffer: &mut PacketBuffer) {
        write_position(buffer, &self.position);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, PacketDecodeError> {
        Ok(Self {
            position: read_position(buffer)?,
        })
    }
}

// ============ Server -> Client ============

/// Assigned player id (message 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPidPacket {
    pub pid: PlayerId,
}

impl Packet for SyncPidPacket {
    const MSG_ID: MessageId = MessageId::SyncPid;

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_i32(self.pid);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, PacketDecodeError> {
        Ok(Self {
            pid: buffer.read_i32()?,
        })
    }
}

/// A player is no longer visible to the receiver (message 201)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepartedPacket {
    pub pid: PlayerId,
}

impl Packet for DepartedPacket {
    const MSG_ID: MessageId = MessageId::Departed;

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_i32(self.pid);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, PacketDecodeError> {
        Ok(Self {
            pid: buffer.read_i32()?,
        })
    }
}

/// Body of a broadcast; the discriminant is the wire `tp` field
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastBody {
    /// tp = 1: world chat line
    Chat(String),
    /// tp = 2: position used for spawn and for entering a view
    Position(Position),
    /// tp = 4: position after a move
    Moved(Position),
}

impl BroadcastBody {
    /// Wire type code
    pub fn tp(&self) -> u8 {
        match self {
            BroadcastBody::Chat(_) => 1,
            BroadcastBody::Position(_) => 2,
            BroadcastBody::Moved(_) => 4,
        }
    }
}

/// Chat or position broadcast (message 200)
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastPacket {
    pub pid: PlayerId,
    pub body: BroadcastBody,
}

impl BroadcastPacket {
    /// A chat line from `pid`
    pub fn chat(pid: PlayerId, content: impl Into<String>) -> Self {
        Self {
            pid,
            body: BroadcastBody::Chat(content.into()),
        }
    }

    /// `pid` is standing at `position` (spawn or view enter)
    pub fn position(pid: PlayerId, position: Position) -> Self {
        Self {
            pid,
            body: BroadcastBody::Position(position),
        }
    }

    /// `pid` moved to `position`
    pub fn moved(pid: PlayerId, position: Position) -> Self {
        Self {
            pid,
            body: BroadcastBody::Moved(position),
        }
    }
}

impl Packet for BroadcastPacket {
    const MSG_ID: MessageId = MessageId::Broadcast;

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_i32(self.pid);
        buffer.write_u8(self.body.tp());
        match &self.body {
            BroadcastBody::Chat(content) => buffer.write_string(content),
            BroadcastBody::Position(position) | BroadcastBody::Moved(position) => {
                write_position(buffer, position)
            }
        }
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, PacketDecodeError> {
        let pid = buffer.read_i32()?;
        let body = match buffer.read_u8()? {
            1 => BroadcastBody::Chat(buffer.read_string()?),
            2 => BroadcastBody::Position(read_position(buffer)?),
            4 => BroadcastBody::Moved(read_position(buffer)?),
            other => {
                return Err(PacketDecodeError::InvalidValue {
                    field: "tp".to_string(),
                    value: other.to_string(),
                })
            }
        };
        Ok(Self { pid, body })
    }
}

/// One entry of a [`SyncPlayersPacket`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSnapshot {
    pub pid: PlayerId,
    pub position: Position,
}

/// Snapshot of every peer the receiver can see (message 202)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlayersPacket {
    pub players: Vec<PlayerSnapshot>,
}

impl Packet for SyncPlayersPacket {
    const MSG_ID: MessageId = MessageId::SyncPlayers;

    fn encode(&self, buffer: &mut PacketBuffer) {
        let count = self.players.len().min(u16::MAX as usize);
        buffer.write_u16(count as u16);
        for snapshot in &self.players[..count] {
            buffer.write_i32(snapshot.pid);
            write_position(buffer, &snapshot.position);
        }
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, PacketDecodeError> {
        let count = buffer.read_u16()? as usize;
        let mut players = Vec::with_capacity(count);
        for _ in 0..count {
            players.push(PlayerSnapshot {
                pid: buffer.read_i32()?,
                position: read_position(buffer)?,
            });
        }
        Ok(Self { players })
    }
}

/// Any message the server sends, decoded from its frame
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    SyncPid(SyncPidPacket),
    Broadcast(BroadcastPacket),
    Departed(DepartedPacket),
    SyncPlayers(SyncPlayersPacket),
}

impl ServerMessage {
    /// Decode a server -> client message from its id and payload
    pub fn decode(msg_id: u32, payload: &[u8]) -> Result<Self, PacketDecodeError> {
        match MessageId::from_u32(msg_id) {
            Some(MessageId::SyncPid) => SyncPidPacket::from_payload(payload).map(Self::SyncPid),
            Some(MessageId::Broadcast) => {
                BroadcastPacket::from_payload(payload).map(Self::Broadcast)
            }
            Some(MessageId::Departed) => DepartedPacket::from_payload(payload).map(Self::Departed),
            Some(MessageId::SyncPlayers) => {
                SyncPlayersPacket::from_payload(payload).map(Self::SyncPlayers)
            }
            _ => Err(PacketDecodeError::InvalidValue {
                field: "msg_id".to_string(),
                value: msg_id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: f32, z: f32) -> Position {
        Position::new(x, 0.0, z, 90.0)
    }

    #[test]
    fn test_message_ids() {
        assert_eq!(MessageId::SyncPid.as_u32(), 1);
        assert_eq!(MessageId::Broadcast.as_u32(), 200);
        assert_eq!(MessageId::from_u32(202), Some(MessageId::SyncPlayers));
        assert_eq!(MessageId::from_u32(99), None);
        assert_eq!(BroadcastPacket::msg_id(), 200);
    }

    #[test]
    fn test_move_packet_layout() {
        let payload = MovePacket {
            position: pos(1.0, 2.0),
        }
        .to_payload();

        // x, y, z, v as four little-endian floats
        assert_eq!(payload.len(), 16);
        assert_eq!(&payload[..4], &1.0f32.to_le_bytes());
        assert_eq!(&payload[8..12], &2.0f32.to_le_bytes());
    }

    #[test]
    fn test_broadcast_type_codes() {
        let chat = BroadcastPacket::chat(7, "hi");
        let spawn = BroadcastPacket::position(7, pos(1.0, 1.0));
        let moved = BroadcastPacket::moved(7, pos(1.0, 1.0));

        assert_eq!(chat.to_payload()[4], 1);
        assert_eq!(spawn.to_payload()[4], 2);
        assert_eq!(moved.to_payload()[4], 4);
    }

    #[test]
    fn test_broadcast_rejects_unknown_type() {
        let mut buffer = PacketBuffer::new();
        buffer.write_i32(1);
        buffer.write_u8(9);

        let err = BroadcastPacket::from_payload(buffer.as_bytes()).unwrap_err();
        assert!(matches!(err, PacketDecodeError::InvalidValue { .. }));
    }

    #[test]
    fn test_sync_players_decode() {
        let packet = SyncPlayersPacket {
            players: vec![
                PlayerSnapshot {
                    pid: 2,
                    position: pos(100.0, 120.0),
                },
                PlayerSnapshot {
                    pid: 3,
                    position: pos(101.0, 121.0),
                },
            ],
        };

        let decoded = ServerMessage::decode(202, &packet.to_payload()).unwrap();
        assert_eq!(decoded, ServerMessage::SyncPlayers(packet));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut buffer = PacketBuffer::new();
        buffer.write_i32(5);
        buffer.write_u8(0);

        assert!(matches!(
            SyncPidPacket::from_payload(buffer.as_bytes()),
            Err(PacketDecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_truncated_move_rejected() {
        let err = MovePacket::from_payload(&[0, 0, 0x20, 0x43]).unwrap_err();
        assert!(matches!(err, PacketDecodeError::InsufficientData { .. }));
    }

    #[test]
    fn test_client_messages_are_not_server_messages() {
        let payload = TalkPacket {
            content: "hello".to_string(),
        }
        .to_payload();
        assert!(ServerMessage::decode(MessageId::Talk.as_u32(), &payload).is_err());
    }
}
