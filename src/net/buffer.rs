//! Packet buffer implementation
//!
//! Provides a byte buffer with the little-endian read/write operations used by
//! the Gridscape wire format:
//! - Integer types (byte, u16, i32, u32)
//! - IEEE-754 single precision floats
//! - Length-prefixed UTF-8 strings
//!
//! Reads are checked: running off the end of the buffer yields a
//! [`PacketDecodeError`] instead of a zero value, since every payload read here
//! comes from a client.

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::packets::PacketDecodeError;

/// Packet buffer for reading and writing game protocol data
#[derive(Debug, Clone, Default)]
pub struct PacketBuffer {
    /// Internal byte buffer
    data: BytesMut,
    /// Current read position
    read_pos: usize,
}

impl PacketBuffer {
    /// Create a new empty packet buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a packet buffer with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Create a packet buffer from existing bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            read_pos: 0,
        }
    }

    // ============ Properties ============

    /// Get the current read position
    #[inline]
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Get the total length of the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the number of bytes remaining to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    /// Check if there are bytes remaining to read
    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Get a reference to the underlying bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Freeze the written bytes into an immutable payload
    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }

    /// Reset read position to start
    pub fn reset(&mut self) {
        self.read_pos = 0;
    }

    fn take(&mut self, count: usize) -> Result<&[u8], PacketDecodeError> {
        if self.remaining() < count {
            return Err(PacketDecodeError::InsufficientData {
                expected: count,
                actual: self.remaining(),
            });
        }
        let start = self.read_pos;
        self.read_pos += count;
        Ok(&self.data[start..start + count])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], PacketDecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    // ============ Reading Methods (Little-Endian) ============

    /// Read an unsigned byte
    pub fn read_u8(&mut self) -> Result<u8, PacketDecodeError> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Read an unsigned little-endian short (2 bytes)
    pub fn read_u16(&mut self) -> Result<u16, PacketDecodeError> {
        self.take_array().map(u16::from_le_bytes)
    }

    /// Read a signed little-endian int (4 bytes)
    pub fn read_i32(&mut self) -> Result<i32, PacketDecodeError> {
        self.take_array().map(i32::from_le_bytes)
    }

    /// Read an unsigned little-endian int (4 bytes)
    pub fn read_u32(&mut self) -> Result<u32, PacketDecodeError> {
        self.take_array().map(u32::from_le_bytes)
    }

    /// Read a little-endian IEEE-754 float (4 bytes)
    pub fn read_f32(&mut self) -> Result<f32, PacketDecodeError> {
        self.take_array().map(f32::from_le_bytes)
    }

    /// Read a string prefixed with its u16 byte length
    pub fn read_string(&mut self) -> Result<String, PacketDecodeError> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| PacketDecodeError::InvalidValue {
            field: "string".to_string(),
            value: format!("{} bytes of invalid UTF-8", len),
        })
    }

    // ============ Writing Methods (Little-Endian) ============

    /// Write an unsigned byte
    pub fn write_u8(&mut self, value: u8) {
        self.data.put_u8(value);
    }

    /// Write an unsigned little-endian short (2 bytes)
    pub fn write_u16(&mut self, value: u16) {
        self.data.put_u16_le(value);
    }

    /// Write a signed little-endian int (4 bytes)
    pub fn write_i32(&mut self, value: i32) {
        self.data.put_i32_le(value);
    }

    /// Write an unsigned little-endian int (4 bytes)
    pub fn write_u32(&mut self, value: u32) {
        self.data.put_u32_le(value);
    }

    /// Write a little-endian IEEE-754 float (4 bytes)
    pub fn write_f32(&mut self, value: f32) {
        self.data.put_f32_le(value);
    }

    /// Write a string prefixed with its u16 byte length
    ///
    /// Strings longer than `u16::MAX` bytes are truncated at the last
    /// character boundary that fits.
    pub fn write_string(&mut self, value: &str) {
        let mut end = value.len().min(u16::MAX as usize);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        self.write_u16(end as u16);
        self.data.put_slice(&value.as_bytes()[..end]);
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.put_slice(bytes);
    }
}

impl From<&[u8]> for PacketBuffer {
    fn from(slice: &[u8]) -> Self {
        Self::from_bytes(slice)
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
