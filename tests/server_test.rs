//! End-to-end tests of the connection handler
//!
//! Clients talk to the real handler over in-memory duplex streams using the
//! same frame codec the server uses.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use common::small_layout;
use gridscape_server::config::{ServerConfig, SpawnConfig};
use gridscape_server::error::{GridscapeError, ProtocolError, Result};
use gridscape_server::net::handler::ConnectionHandler;
use gridscape_server::net::transport::{FrameReader, FrameWriter};
use gridscape_server::protocol::{
    BroadcastBody, BroadcastPacket, DepartedPacket, Frame, MovePacket, ServerMessage,
    SyncPidPacket, TalkPacket,
};
use gridscape_server::game::player::Position;
use gridscape_server::AppState;

const WAIT: Duration = Duration::from_secs(5);

struct Client {
    reader: FrameReader<ReadHalf<DuplexStream>>,
    writer: FrameWriter<WriteHalf<DuplexStream>>,
    task: JoinHandle<Result<()>>,
}

impl Client {
    async fn recv(&mut self) -> ServerMessage {
        let frame = timeout(WAIT, self.reader.read_frame())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .expect("server closed the stream");
        ServerMessage::decode(frame.msg_id, &frame.payload).unwrap()
    }

    async fn send(&mut self, frame: Frame) {
        self.writer.write_frame(&frame).await.unwrap();
    }

    /// Read the three spawn frames and return the assigned id
    async fn handshake(&mut self) -> i32 {
        let pid = match self.recv().await {
            ServerMessage::SyncPid(SyncPidPacket { pid }) => pid,
            other => panic!("expected SyncPid, got {:?}", other),
        };
        assert!(matches!(
            self.recv().await,
            ServerMessage::Broadcast(BroadcastPacket {
                body: BroadcastBody::Position(_),
                ..
            })
        ));
        assert!(matches!(self.recv().await, ServerMessage::SyncPlayers(_)));
        pid
    }
}

fn test_state() -> (Arc<AppState>, broadcast::Sender<()>) {
    let config = ServerConfig {
        aoi: small_layout(),
        spawn: SpawnConfig {
            origin_x: 160.0,
            origin_z: 134.0,
            jitter_x: 0.0,
            jitter_z: 0.0,
        },
        ..ServerConfig::default()
    };
    let (shutdown_tx, _) = broadcast::channel(1);
    let state = Arc::new(AppState::new(config, shutdown_tx.clone()).unwrap());
    (state, shutdown_tx)
}

fn connect(state: &Arc<AppState>) -> Client {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    let (client_read, client_write) = tokio::io::split(client);

    let handler = ConnectionHandler::new(state.clone());
    let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
    let task = tokio::spawn(async move {
        handler
            .handle_stream(server_read, server_write, addr)
            .await
    });

    Client {
        reader: FrameReader::new(client_read, 64 * 1024),
        writer: FrameWriter::new(client_write),
        task,
    }
}

#[tokio::test]
async fn test_two_clients_see_each_other() {
    let (state, _shutdown_tx) = test_state();

    let mut alice = connect(&state);
    let alice_id = alice.handshake().await;

    let mut bob = connect(&state);
    let bob_id = bob.handshake().await;
    assert_ne!(alice_id, bob_id);

    // Alice is told Bob appeared
    match alice.recv().await {
        ServerMessage::Broadcast(BroadcastPacket {
            pid,
            body: BroadcastBody::Position(position),
        }) => {
            assert_eq!(pid, bob_id);
            assert_eq!((position.x, position.z), (160.0, 134.0));
        }
        other => panic!("expected Bob's position, got {:?}", other),
    }

    // Bob moves within the cell; Alice sees it
    bob.send(Frame::from_packet(&MovePacket {
        position: Position::new(170.0, 0.0, 140.0, 90.0),
    }))
    .await;
    match alice.recv().await {
        ServerMessage::Broadcast(BroadcastPacket {
            pid,
            body: BroadcastBody::Moved(position),
        }) => {
            assert_eq!(pid, bob_id);
            assert_eq!(position, Position::new(170.0, 0.0, 140.0, 90.0));
        }
        other => panic!("expected Bob's move, got {:?}", other),
    }

    // Chat reaches both, sender included
    alice
        .send(Frame::from_packet(&TalkPacket {
            content: "hi bob".to_string(),
        }))
        .await;
    for client in [&mut alice, &mut bob] {
        assert_eq!(
            client.recv().await,
            ServerMessage::Broadcast(BroadcastPacket::chat(alice_id, "hi bob"))
        );
    }

    // Alice hangs up; Bob is told she left
    let Client {
        reader,
        writer,
        task,
    } = alice;
    drop(reader);
    drop(writer);
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();

    assert_eq!(
        bob.recv().await,
        ServerMessage::Departed(DepartedPacket { pid: alice_id })
    );
    assert_eq!(state.world.player_count(), 1);
    assert_eq!(state.session_manager.count(), 1);
}

#[tokio::test]
async fn test_oversized_frame_closes_connection() {
    let (state, _shutdown_tx) = test_state();

    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    let (_client_read, mut client_write) = tokio::io::split(client);

    let handler = ConnectionHandler::new(state.clone());
    let addr: SocketAddr = "127.0.0.1:40001".parse().unwrap();
    let task = tokio::spawn(async move {
        handler
            .handle_stream(server_read, server_write, addr)
            .await
    });

    let mut header = BytesMut::new();
    header.put_u32_le(1_000_000);
    header.put_u32_le(2);
    client_write.write_all(&header).await.unwrap();

    let result = timeout(WAIT, task).await.unwrap().unwrap();
    assert!(matches!(
        result,
        Err(GridscapeError::Protocol(ProtocolError::PacketTooLarge { .. }))
    ));
    assert_eq!(state.world.player_count(), 0);
    assert_eq!(state.session_manager.count(), 0);
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let (state, shutdown_tx) = test_state();

    let mut client = connect(&state);
    client.handshake().await;
    assert_eq!(state.world.player_count(), 1);

    shutdown_tx.send(()).unwrap();

    let Client { task, .. } = client;
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
    assert_eq!(state.world.player_count(), 0);
}
