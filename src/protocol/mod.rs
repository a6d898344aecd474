//! Protocol module
//!
//! Wire format for the Gridscape game protocol:
//! - Frame codec (length + message id header)
//! - Packet payloads and the message id catalog

pub mod frame;
pub mod packets;

pub use frame::{Frame, FrameDecoder, FRAME_HEADER_LEN};
pub use packets::{
    BroadcastBody, BroadcastPacket, DepartedPacket, MessageId, MovePacket, Packet,
    PacketDecodeError, PlayerSnapshot, ServerMessage, SyncPidPacket, SyncPlayersPacket,
    TalkPacket,
};
