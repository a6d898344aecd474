//! Connection handler module
//!
//! Handles the lifecycle of client connections including:
//! - Session setup and the connect hook
//! - The writer task draining the session's outbound queue, paced by the
//!   outbound throttle
//! - The read loop decoding frames and dispatching them through the router
//! - The disconnect hook and session cleanup

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::error::{GridscapeError, NetworkError, Result};
use crate::net::connection::Connection;
use crate::net::router::Request;
use crate::net::session::{SessionId, SessionState};
use crate::net::throttle::OutboundThrottle;
use crate::net::transport::{FrameReader, FrameWriter};
use crate::protocol::frame::Frame;
use crate::AppState;

/// Connection handler for processing client connections
pub struct ConnectionHandler {
    /// Shared application state
    state: Arc<AppState>,
}

impl ConnectionHandler {
    /// Create a new connection handler
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Handle a TCP connection
    pub async fn handle_tcp(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(address = %addr, "Handling TCP connection");

        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        self.handle_stream(reader, writer, addr).await
    }

    /// Serve one connection over any split byte stream
    pub async fn handle_stream<R, W>(&self, reader: R, writer: W, addr: SocketAddr) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (session, outbound_rx) = self.state.session_manager.create_session(addr)?;
        let session_id = session.id;

        let throttle = OutboundThrottle::from_config(&self.state.config.throttle);
        let (close_tx, close_rx) = oneshot::channel();
        let writer_task = tokio::spawn(write_loop(
            FrameWriter::new(writer),
            outbound_rx,
            throttle,
            close_rx,
            session_id,
        ));

        let connection: Arc<dyn Connection> = session.clone();
        self.state.router.connect(&connection);

        let mut reader = FrameReader::new(reader, self.state.config.max_packet_size);
        let result = self.read_loop(&mut reader, &connection).await;

        debug!(session_id = session_id, "Connection handler ending");

        session.set_state(SessionState::Disconnecting);
        self.state.router.disconnect(&connection);
        self.state.session_manager.remove(session_id);

        let _ = close_tx.send(());
        match writer_task.await {
            Ok(Err(e)) => trace!(session_id = session_id, error = %e, "Writer ended with error"),
            Err(e) => warn!(session_id = session_id, error = %e, "Writer task failed"),
            Ok(Ok(())) => {}
        }

        info!(session_id = session_id, address = %addr, "Connection closed");
        result
    }

    /// Read frames and dispatch them until the peer leaves or the server stops
    async fn read_loop<R>(
        &self,
        reader: &mut FrameReader<R>,
        connection: &Arc<dyn Connection>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let session_id = connection.id();
        let mut shutdown_rx = self.state.shutdown_signal();

        loop {
            let frame = tokio::select! {
                frame = reader.read_frame() => frame,
                _ = shutdown_rx.recv() => {
                    debug!(session_id = session_id, "Server shutting down, closing connection");
                    return Ok(());
                }
            };

            let frame = match frame {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!(session_id = session_id, "Peer closed connection");
                    return Ok(());
                }
                Err(GridscapeError::Network(NetworkError::ReadError(reason))) => {
                    debug!(session_id = session_id, reason = %reason, "Read failed");
                    return Ok(());
                }
                Err(e) => {
                    warn!(session_id = session_id, error = %e, "Dropping connection");
                    return Err(e);
                }
            };

            if let Some(session) = self.state.session_manager.get(session_id) {
                session.touch();
            }

            let request = Request::new(frame.msg_id, frame.payload, connection.clone());
            if let Err(e) = self.state.router.dispatch(&request) {
                warn!(
                    session_id = session_id,
                    msg_id = request.msg_id,
                    error = %e,
                    "Failed to handle message"
                );
            }
        }
    }
}

/// Drain the outbound queue to the socket until closed
async fn write_loop<W>(
    mut writer: FrameWriter<W>,
    mut outbound_rx: mpsc::Receiver<Frame>,
    mut throttle: Option<OutboundThrottle>,
    mut close_rx: oneshot::Receiver<()>,
    session_id: SessionId,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            frame = outbound_rx.recv() => frame,
            _ = &mut close_rx => None,
        };
        let Some(frame) = frame else {
            break;
        };

        if let Some(throttle) = throttle.as_mut() {
            throttle.acquire().await;
        }
        writer.write_frame(&frame).await?;
    }

    if let Some(throttle) = &throttle {
        if throttle.delayed_count() > 0 {
            debug!(
                session_id = session_id,
                delayed = throttle.delayed_count(),
                "Outbound frames paced by throttle"
            );
        }
    }

    if let Err(e) = writer.shutdown().await {
        trace!(session_id = session_id, error = %e, "Error during writer shutdown");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_write_loop_drains_queue() {
        let first = Frame::new(1, 5i32.to_le_bytes().to_vec());
        let second = Frame::new(201, 6i32.to_le_bytes().to_vec());

        let mock = Builder::new()
            .write(&first.encode())
            .write(&second.encode())
            .build();

        let (tx, rx) = mpsc::channel(4);
        let (_close_tx, close_rx) = oneshot::channel();
        tx.send(first).await.unwrap();
        tx.send(second).await.unwrap();
        drop(tx);

        write_loop(FrameWriter::new(mock), rx, None, close_rx, 1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_loop_stops_on_close() {
        let mock = Builder::new().build();
        let (_tx, rx) = mpsc::channel::<Frame>(4);
        let (close_tx, close_rx) = oneshot::channel();
        close_tx.send(()).unwrap();

        write_loop(
            FrameWriter::new(mock),
            rx,
            Some(OutboundThrottle::new(1, 10)),
            close_rx,
            1,
        )
        .await
        .unwrap();
    }
}
