//! Message router
//!
//! Maps inbound message ids to handlers and carries the connection lifecycle
//! hooks. The router is built once at startup and shared read-only by every
//! connection task.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{trace, warn};

use crate::error::Result;
use crate::net::connection::Connection;

/// An inbound message together with the connection it arrived on
#[derive(Clone)]
pub struct Request {
    pub msg_id: u32,
    pub payload: Bytes,
    pub connection: Arc<dyn Connection>,
}

impl Request {
    pub fn new(msg_id: u32, payload: Bytes, connection: Arc<dyn Connection>) -> Self {
        Self {
            msg_id,
            payload,
            connection,
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("msg_id", &self.msg_id)
            .field("len", &self.payload.len())
            .field("connection", &self.connection.id())
            .finish()
    }
}

/// Handles one inbound message id
pub trait MessageHandler: Send + Sync {
    fn handle(&self, request: &Request) -> Result<()>;
}

/// Connection lifecycle callbacks, each invoked once per connection
pub trait ConnectionHooks: Send + Sync {
    fn on_connect(&self, connection: &Arc<dyn Connection>);
    fn on_disconnect(&self, connection: &Arc<dyn Connection>);
}

/// Dispatches inbound messages by id
#[derive(Default)]
pub struct Router {
    handlers: HashMap<u32, Arc<dyn MessageHandler>>,
    hooks: Option<Arc<dyn ConnectionHooks>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same id
    pub fn register(&mut self, msg_id: u32, handler: Arc<dyn MessageHandler>) {
        if self.handlers.insert(msg_id, handler).is_some() {
            warn!(msg_id = msg_id, "Replaced existing message handler");
        }
    }

    /// Install the connection lifecycle hooks
    pub fn set_hooks(&mut self, hooks: Arc<dyn ConnectionHooks>) {
        self.hooks = Some(hooks);
    }

    /// Check whether a handler is registered for `msg_id`
    pub fn has_handler(&self, msg_id: u32) -> bool {
        self.handlers.contains_key(&msg_id)
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Dispatch a request to its handler
    ///
    /// Returns `Ok(false)` when no handler is registered for the id; the
    /// message is dropped.
    pub fn dispatch(&self, request: &Request) -> Result<bool> {
        match self.handlers.get(&request.msg_id) {
            Some(handler) => {
                trace!(
                    session_id = request.connection.id(),
                    msg_id = request.msg_id,
                    "Dispatching message"
                );
                handler.handle(request)?;
                Ok(true)
            }
            None => {
                warn!(
                    session_id = request.connection.id(),
                    msg_id = request.msg_id,
                    len = request.payload.len(),
                    "No handler for message id"
                );
                Ok(false)
            }
        }
    }

    /// Run the connect hook
    pub fn connect(&self, connection: &Arc<dyn Connection>) {
        if let Some(hooks) = &self.hooks {
            hooks.on_connect(connection);
        }
    }

    /// Run the disconnect hook
    pub fn disconnect(&self, connection: &Arc<dyn Connection>) {
        if let Some(hooks) = &self.hooks {
            hooks.on_disconnect(connection);
        }
    }
}
