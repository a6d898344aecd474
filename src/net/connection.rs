//! Connection abstraction
//!
//! The game core talks to clients only through [`Connection`]: it hands over
//! an already-encoded payload and a message id, and keeps small per-connection
//! values (such as the attached player id) in the connection's property bag.

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use dashmap::DashMap;

use crate::error::Result;

/// Property key under which the attached player id is stored
pub const PID_PROPERTY: &str = "pid";

/// A value stored in a connection's property bag
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Int(i64),
}

impl PropertyValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(value) => Some(*value),
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(value as i64)
    }
}

/// Concurrent key/value store attached to a connection
#[derive(Default)]
pub struct PropertyBag {
    values: DashMap<String, PropertyValue>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<PropertyValue> {
        self.values.get(key).map(|entry| entry.value().clone())
    }

    pub fn set(&self, key: &str, value: PropertyValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn remove(&self, key: &str) -> Option<PropertyValue> {
        self.values.remove(key).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for PropertyBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.values
                    .iter()
                    .map(|entry| (entry.key().clone(), entry.value().clone())),
            )
            .finish()
    }
}

/// A client connection as seen by the game core
///
/// `send` must not block: implementations queue the frame and return
/// immediately, failing with a [`crate::error::NetworkError`] when the
/// connection is closed or its queue is full.
pub trait Connection: Send + Sync {
    /// Transport-level connection id
    fn id(&self) -> u64;

    /// Queue a message for delivery
    fn send(&self, msg_id: u32, payload: Bytes) -> Result<()>;

    /// Read a property
    fn property(&self, key: &str) -> Option<PropertyValue>;

    /// Set a property, replacing any previous value
    fn set_property(&self, key: &str, value: PropertyValue);

    /// Remove a property, returning its previous value
    fn remove_property(&self, key: &str) -> Option<PropertyValue>;

    /// Remote peer address, when the transport has one
    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }
}
