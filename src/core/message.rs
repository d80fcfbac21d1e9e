//! # Message Capability
//!
//! The interface every application message carried by the envelope layer
//! implements, plus the two concrete messages the chunk pipeline ships:
//! the bulk chunk-data carrier and the cache control message.
//!
//! A message knows its numeric type id, its declared version (checked against
//! the registry on decode), how to read and write its payload bytes, and what
//! to do when dispatched to a session (`run`). Payloads are raw big-endian
//! binary, not serde — the wire format predates this crate and is shared with
//! non-Rust peers.

use bytes::{BufMut, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::transport::session::Session;

/// One application message riding inside an envelope.
///
/// Implementations must be default-constructible through a registry factory so
/// the codec can instantiate a fresh, mutable instance per inbound envelope.
pub trait Message: Send + std::fmt::Debug {
    /// Numeric type id, unique within a registry.
    ///
    /// Must fit the signed wire header: at most
    /// [`crate::core::registry::MAX_TYPE_ID`]. The registry and codec both
    /// reject values above it.
    fn type_id(&self) -> u16;

    /// Declared payload version. Inbound envelopes carrying a different
    /// version for this type id are skipped, not decoded.
    fn version(&self) -> u16;

    /// Exact serialized payload size in bytes.
    fn payload_len(&self) -> usize;

    /// Deserialize from exactly the payload bytes the envelope declared.
    fn read_payload(&mut self, payload: &[u8]) -> Result<()>;

    /// Serialize the payload.
    fn write_payload(&self, out: &mut BytesMut);

    /// Per-type dispatch hook, invoked with the session that produced the
    /// envelope once decode succeeds.
    fn run(&self, session: &Session);
}

/// Type id of the bulk chunk-data message.
pub const CHUNK_DATA_TYPE_ID: u16 = 3;

/// Payload version of the bulk chunk-data message.
pub const CHUNK_DATA_VERSION: u16 = 1;

/// Bulk chunk snapshot carrier.
///
/// `data` is opaque block data, normally already reduced by the sender's
/// [`crate::cache::DeduplicationCache`]. Payload layout, big-endian:
/// `i32 x | i32 z | u8[..] data` (data runs to the envelope's declared
/// length).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkDataMessage {
    pub x: i32,
    pub z: i32,
    pub data: Vec<u8>,
}

impl ChunkDataMessage {
    pub fn new(x: i32, z: i32, data: Vec<u8>) -> Self {
        Self { x, z, data }
    }
}

impl Message for ChunkDataMessage {
    fn type_id(&self) -> u16 {
        CHUNK_DATA_TYPE_ID
    }

    fn version(&self) -> u16 {
        CHUNK_DATA_VERSION
    }

    fn payload_len(&self) -> usize {
        4 + 4 + self.data.len()
    }

    fn read_payload(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() < 8 {
            return Err(ProtocolError::MalformedPayload {
                type_id: CHUNK_DATA_TYPE_ID,
                reason: format!("chunk header needs 8 bytes, payload has {}", payload.len()),
            });
        }
        self.x = i32::from_be_bytes(payload[0..4].try_into().expect("length checked above"));
        self.z = i32::from_be_bytes(payload[4..8].try_into().expect("length checked above"));
        self.data = payload[8..].to_vec();
        Ok(())
    }

    fn write_payload(&self, out: &mut BytesMut) {
        out.put_i32(self.x);
        out.put_i32(self.z);
        out.put_slice(&self.data);
    }

    fn run(&self, session: &Session) {
        tracing::debug!(
            connection = session.connection(),
            x = self.x,
            z = self.z,
            bytes = self.data.len(),
            "chunk data message dispatched"
        );
    }
}

/// Type id of the cache control message.
pub const CACHE_CONTROL_TYPE_ID: u16 = 4;

/// Payload version of the cache control message.
pub const CACHE_CONTROL_VERSION: u16 = 1;

/// Cache control message: a client announcing a named control channel with an
/// opaque payload.
///
/// On the chunk-cache channel this enables deduplication for the session and
/// pre-seeds its hash set (see [`crate::cache::CONTROL_CHANNEL`]). Payload
/// layout, big-endian: `u16 channel_len | channel bytes | u8[..] payload`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheControlMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

impl CacheControlMessage {
    pub fn new(channel: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            channel: channel.into(),
            payload,
        }
    }
}

impl Message for CacheControlMessage {
    fn type_id(&self) -> u16 {
        CACHE_CONTROL_TYPE_ID
    }

    fn version(&self) -> u16 {
        CACHE_CONTROL_VERSION
    }

    fn payload_len(&self) -> usize {
        2 + self.channel.len() + self.payload.len()
    }

    fn read_payload(&mut self, payload: &[u8]) -> Result<()> {
        let malformed = |reason: String| ProtocolError::MalformedPayload {
            type_id: CACHE_CONTROL_TYPE_ID,
            reason,
        };

        if payload.len() < 2 {
            return Err(malformed("missing channel length".to_string()));
        }
        let channel_len =
            u16::from_be_bytes(payload[0..2].try_into().expect("length checked above")) as usize;
        if payload.len() < 2 + channel_len {
            return Err(malformed(format!(
                "channel name declared {channel_len} bytes, {} available",
                payload.len() - 2
            )));
        }

        self.channel = std::str::from_utf8(&payload[2..2 + channel_len])
            .map_err(|e| malformed(format!("channel name not UTF-8: {e}")))?
            .to_string();
        self.payload = payload[2 + channel_len..].to_vec();
        Ok(())
    }

    fn write_payload(&self, out: &mut BytesMut) {
        out.put_u16(self.channel.len() as u16);
        out.put_slice(self.channel.as_bytes());
        out.put_slice(&self.payload);
    }

    fn run(&self, session: &Session) {
        let payload = (!self.payload.is_empty()).then_some(self.payload.as_slice());
        if session.chunk_cache().handle_control_message(&self.channel, payload) {
            tracing::debug!(
                connection = session.connection(),
                channel = %self.channel,
                "session chunk cache enabled"
            );
        }
    }
}
