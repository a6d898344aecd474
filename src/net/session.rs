//! Session management module
//!
//! Manages client sessions including:
//! - Session lifecycle (creation, tracking, cleanup)
//! - The bounded outbound frame queue drained by the connection's writer task
//! - Per-session properties
//! - Thread-safe session registry

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{GridscapeError, NetworkError, Result};
use crate::net::connection::{Connection, PropertyBag, PropertyValue};
use crate::protocol::frame::Frame;

/// Unique session identifier
pub type SessionId = u64;

/// Session state in the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Connected and exchanging frames
    Connected,
    /// Session is disconnecting; new frames are refused
    Disconnecting,
    /// Session has been disconnected
    Disconnected,
}

impl SessionState {
    /// Check if the session still accepts outbound frames
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Connected)
    }

    /// Get a human-readable name for the state
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Connected => "Connected",
            SessionState::Disconnecting => "Disconnecting",
            SessionState::Disconnected => "Disconnected",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A connected client session
pub struct Session {
    /// Unique session identifier
    pub id: SessionId,
    /// Remote address of the client
    pub address: SocketAddr,
    /// Current session state
    state: RwLock<SessionState>,
    /// Per-session properties
    properties: PropertyBag,
    /// Time of session creation
    pub created_at: Instant,
    /// Time of last inbound activity
    last_activity: RwLock<Instant>,
    /// Outbound frame queue
    outbound_tx: mpsc::Sender<Frame>,
}

impl Session {
    /// Create a new session that queues outbound frames on `outbound_tx`
    pub fn new(id: SessionId, address: SocketAddr, outbound_tx: mpsc::Sender<Frame>) -> Self {
        let now = Instant::now();
        Self {
            id,
            address,
            state: RwLock::new(SessionState::Connected),
            properties: PropertyBag::new(),
            created_at: now,
            last_activity: RwLock::new(now),
            outbound_tx,
        }
    }

    /// Create a session together with the receiving end of its queue
    pub fn with_queue(
        id: SessionId,
        address: SocketAddr,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(id, address, tx), rx)
    }

    /// Get the current state
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Set the session state
    pub fn set_state(&self, new_state: SessionState) {
        let mut state = self.state.write();
        let old_state = *state;
        *state = new_state;
        debug!(
            session_id = self.id,
            old_state = %old_state,
            new_state = %new_state,
            "Session state changed"
        );
    }

    /// Check if the session still accepts outbound frames
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Update last activity time
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Get the last activity time
    pub fn last_activity(&self) -> Instant {
        *self.last_activity.read()
    }

    /// Get the idle duration
    pub fn idle_duration(&self) -> Duration {
        self.last_activity().elapsed()
    }

    /// Queue a frame without blocking
    pub fn try_send(&self, frame: Frame) -> Result<()> {
        if !self.is_active() {
            return Err(GridscapeError::Network(NetworkError::ConnectionClosed));
        }
        self.outbound_tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                GridscapeError::Network(NetworkError::WriteBufferFull)
            }
            mpsc::error::TrySendError::Closed(_) => {
                GridscapeError::Network(NetworkError::ConnectionClosed)
            }
        })
    }

    /// Number of additional frames the queue can take right now
    pub fn queue_capacity(&self) -> usize {
        self.outbound_tx.capacity()
    }
}

impl Connection for Session {
    fn id(&self) -> u64 {
        self.id
    }

    fn send(&self, msg_id: u32, payload: Bytes) -> Result<()> {
        self.try_send(Frame::new(msg_id, payload))
    }

    fn property(&self, key: &str) -> Option<PropertyValue> {
        self.properties.get(key)
    }

    fn set_property(&self, key: &str, value: PropertyValue) {
        self.properties.set(key, value);
    }

    fn remove_property(&self, key: &str) -> Option<PropertyValue> {
        self.properties.remove(key)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.address)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("state", &self.state())
            .field("properties", &self.properties)
            .field("created_at", &self.created_at)
            .field("idle_duration", &self.idle_duration())
            .finish()
    }
}

/// Thread-safe session manager
pub struct SessionManager {
    /// Map of session ID to session
    sessions: DashMap<SessionId, Arc<Session>>,
    /// Next session ID to assign
    next_id: AtomicU64,
    /// Maximum concurrent sessions
    max_sessions: usize,
    /// Capacity of each session's outbound queue
    queue_capacity: usize,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new() -> Self {
        Self::with_limits(2000, 1024)
    }

    /// Create a session manager with custom limits
    pub fn with_limits(max_sessions: usize, queue_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            max_sessions,
            queue_capacity,
        }
    }

    /// Create a new session and register it
    ///
    /// Returns the session and the receiving end of its outbound queue.
    pub fn create_session(
        &self,
        address: SocketAddr,
    ) -> Result<(Arc<Session>, mpsc::Receiver<Frame>)> {
        let current_count = self.sessions.len();
        if current_count >= self.max_sessions {
            warn!(
                address = %address,
                count = current_count,
                max = self.max_sessions,
                "Connection limit reached"
            );
            return Err(GridscapeError::Network(NetworkError::TooManyConnections(
                current_count,
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (session, outbound_rx) = Session::with_queue(id, address, self.queue_capacity);
        let session = Arc::new(session);

        self.sessions.insert(id, session.clone());

        info!(
            session_id = id,
            address = %address,
            "Session created"
        );

        Ok((session, outbound_rx))
    }

    /// Get a session by ID
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|r| r.clone())
    }

    /// Remove a session
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(&id).map(|(_, session)| session);
        if let Some(session) = &removed {
            session.set_state(SessionState::Disconnected);
            info!(
                session_id = id,
                address = %session.address,
                "Session removed"
            );
        }
        removed
    }

    /// Mark every session as disconnecting
    pub fn disconnect_all(&self) {
        for session in self.sessions.iter() {
            session.set_state(SessionState::Disconnecting);
        }
    }

    /// Get the count of active sessions
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Get all session IDs
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|r| *r.key()).collect()
    }

    /// Iterate over all sessions
    pub fn for_each<F>(&self, f: F)
    where
        F: Fn(&Arc<Session>),
    {
        for session in self.sessions.iter() {
            f(session.value());
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::PID_PROPERTY;

    fn test_address() -> SocketAddr {
        "127.0.0.1:43594".parse().unwrap()
    }

    #[test]
    fn test_session_creation() {
        let (session, _rx) = Session::with_queue(1, test_address(), 4);
        assert_eq!(session.id, 1);
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.is_active());
        assert_eq!(session.remote_addr(), Some(test_address()));
    }

    #[test]
    fn test_send_queues_frame() {
        let (session, mut rx) = Session::with_queue(1, test_address(), 4);

        session.send(200, Bytes::from_static(&[1, 2])).unwrap();

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.msg_id, 200);
        assert_eq!(&frame.payload[..], &[1, 2]);
    }

    #[test]
    fn test_send_full_queue() {
        let (session, _rx) = Session::with_queue(1, test_address(), 1);

        session.send(1, Bytes::new()).unwrap();
        let err = session.send(1, Bytes::new()).unwrap_err();
        assert!(matches!(
            err,
            GridscapeError::Network(NetworkError::WriteBufferFull)
        ));
    }

    #[test]
    fn test_send_after_close() {
        let (session, rx) = Session::with_queue(1, test_address(), 4);
        drop(rx);

        let err = session.send(1, Bytes::new()).unwrap_err();
        assert!(matches!(
            err,
            GridscapeError::Network(NetworkError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_send_while_disconnecting() {
        let (session, _rx) = Session::with_queue(1, test_address(), 4);
        session.set_state(SessionState::Disconnecting);

        assert!(session.send(1, Bytes::new()).is_err());
    }

    #[test]
    fn test_session_properties() {
        let (session, _rx) = Session::with_queue(1, test_address(), 4);

        session.set_property(PID_PROPERTY, 12.into());
        assert_eq!(
            session.property(PID_PROPERTY).and_then(|v| v.as_int()),
            Some(12)
        );
        assert!(session.remove_property(PID_PROPERTY).is_some());
        assert!(session.property(PID_PROPERTY).is_none());
    }

    #[test]
    fn test_session_manager_create_and_remove() {
        let manager = SessionManager::new();

        let (first, _rx1) = manager.create_session(test_address()).unwrap();
        let (second, _rx2) = manager.create_session(test_address()).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(manager.count(), 2);
        assert!(manager.get(first.id).is_some());

        let removed = manager.remove(first.id).unwrap();
        assert_eq!(removed.state(), SessionState::Disconnected);
        assert_eq!(manager.count(), 1);
        assert!(manager.get(first.id).is_none());
        assert!(manager.remove(first.id).is_none());
    }

    #[test]
    fn test_session_manager_limit() {
        let manager = SessionManager::with_limits(1, 4);

        let _first = manager.create_session(test_address()).unwrap();
        let err = manager.create_session(test_address()).unwrap_err();
        assert!(matches!(
            err,
            GridscapeError::Network(NetworkError::TooManyConnections(1))
        ));
    }

    #[test]
    fn test_session_touch() {
        let (session, _rx) = Session::with_queue(1, test_address(), 4);
        let before = session.last_activity();

        std::thread::sleep(Duration::from_millis(5));
        session.touch();

        assert!(session.last_activity() > before);
    }
}
