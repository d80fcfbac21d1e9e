//! # Envelope Codec
//!
//! Serialization and dispatch of the self-describing envelope that wraps
//! every application message inside the host transport's packet stream.
//!
//! ## Wire Format
//! ```text
//! [type_id i16] [version i16] [length u32] [payload u8; length]
//! ```
//! All fields big-endian. `type_id = -1` (with `version = -1`, `length = 0`)
//! is the explicit empty envelope: a legitimate no-op, never dispatched,
//! never an error.
//!
//! ## Decode path
//! Per envelope: read the header, resolve the type against the registry,
//! check the declared version, then either deserialize the payload through
//! the type's factory-built message or skip exactly `length` bytes. Unknown
//! types and version skew are *recoverable* — the stream stays aligned at the
//! next envelope boundary and the event is logged with enough context to
//! diagnose protocol skew between endpoints. Only a payload that fails to
//! deserialize inside its declared bounds is a hard per-envelope error.
//!
//! ## Security
//! The declared length is validated against the configured maximum before any
//! payload allocation.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::message::Message;
use crate::core::registry::{MessageTypeRegistry, MAX_TYPE_ID};
use crate::error::{ProtocolError, Result};

/// Envelope header size: type id + version + length.
pub const HEADER_LEN: usize = 2 + 2 + 4;

/// Type id marking an intentionally empty envelope.
pub const EMPTY_TYPE_ID: i16 = -1;

/// One framed envelope: header fields plus raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub type_id: i16,
    pub version: i16,
    pub payload: Bytes,
}

impl Envelope {
    /// The explicit empty envelope `(-1, -1, length 0)`.
    pub fn empty() -> Self {
        Self {
            type_id: EMPTY_TYPE_ID,
            version: -1,
            payload: Bytes::new(),
        }
    }

    /// Whether this is the empty/no-op marker.
    ///
    /// A negative type id or version denotes "no message"; such envelopes are
    /// never dispatched.
    pub fn is_empty_marker(&self) -> bool {
        self.type_id < 0 || self.version < 0
    }
}

/// Result of decoding one inbound envelope.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// Payload deserialized through the registered type's factory.
    Message(Box<dyn Message>),
    /// Explicit empty envelope; nothing to dispatch.
    Empty,
    /// Type id not in the registry; `length` payload bytes were skipped.
    SkippedUnknownType { type_id: i16 },
    /// Type resolved but the declared version differs from the registered
    /// one; `length` payload bytes were skipped.
    SkippedVersionMismatch {
        type_id: u16,
        declared: u16,
        registered: u16,
    },
}

/// Encoder/decoder for the envelope sub-protocol, bound to a type registry.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    registry: Arc<MessageTypeRegistry>,
    max_payload_size: usize,
}

impl EnvelopeCodec {
    /// Codec with the default payload ceiling.
    pub fn new(registry: Arc<MessageTypeRegistry>) -> Self {
        Self::with_max_payload_size(registry, MAX_PAYLOAD_SIZE)
    }

    /// Codec with an explicit payload ceiling.
    pub fn with_max_payload_size(registry: Arc<MessageTypeRegistry>, max_payload_size: usize) -> Self {
        Self {
            registry,
            max_payload_size,
        }
    }

    /// The registry this codec resolves type ids against.
    pub fn registry(&self) -> &Arc<MessageTypeRegistry> {
        &self.registry
    }

    /// Encode a message (or the explicit empty envelope for `None`).
    ///
    /// # Errors
    /// - [`ProtocolError::TypeIdOutOfRange`] / [`ProtocolError::VersionOutOfRange`]
    ///   — the message's id or version would flip negative in the signed
    ///   header and decode as the empty envelope on the peer
    /// - [`ProtocolError::OversizedEnvelope`] — the serialized payload exceeds
    ///   the configured maximum
    pub fn encode(&self, message: Option<&dyn Message>, out: &mut BytesMut) -> Result<()> {
        let Some(message) = message else {
            out.reserve(HEADER_LEN);
            out.put_i16(EMPTY_TYPE_ID);
            out.put_i16(-1);
            out.put_u32(0);
            return Ok(());
        };

        if message.type_id() > MAX_TYPE_ID {
            return Err(ProtocolError::TypeIdOutOfRange(message.type_id()));
        }
        if message.version() > MAX_TYPE_ID {
            return Err(ProtocolError::VersionOutOfRange(message.version()));
        }

        let mut payload = BytesMut::with_capacity(message.payload_len());
        message.write_payload(&mut payload);

        if payload.len() > self.max_payload_size {
            return Err(ProtocolError::OversizedEnvelope(payload.len()));
        }

        out.reserve(HEADER_LEN + payload.len());
        out.put_i16(message.type_id() as i16);
        out.put_i16(message.version() as i16);
        out.put_u32(payload.len() as u32);
        out.put_slice(&payload);
        Ok(())
    }

    /// Decode one envelope from the head of `buf`.
    ///
    /// Consumes exactly the envelope's bytes (header + declared length),
    /// leaving `buf` positioned at the next envelope boundary — including on
    /// the skip paths.
    ///
    /// # Errors
    /// - [`ProtocolError::TruncatedEnvelope`] — fewer bytes available than the
    ///   header or declared length requires
    /// - [`ProtocolError::OversizedEnvelope`] — declared length above the
    ///   configured maximum, rejected before allocation
    /// - [`ProtocolError::MalformedPayload`] — deserialization failed inside
    ///   the declared bounds
    pub fn decode<B: Buf>(&self, buf: &mut B) -> Result<DecodeOutcome> {
        if buf.remaining() < HEADER_LEN {
            return Err(ProtocolError::TruncatedEnvelope {
                needed: HEADER_LEN,
                available: buf.remaining(),
            });
        }

        let type_id = buf.get_i16();
        let version = buf.get_i16();
        let length = buf.get_u32() as usize;

        if length > self.max_payload_size {
            return Err(ProtocolError::OversizedEnvelope(length));
        }
        if buf.remaining() < length {
            return Err(ProtocolError::TruncatedEnvelope {
                needed: length,
                available: buf.remaining(),
            });
        }

        if type_id < 0 || version < 0 {
            buf.advance(length);
            trace!(type_id, version, "empty envelope");
            return Ok(DecodeOutcome::Empty);
        }

        let Some(message_type) = self.registry.resolve(type_id as u16) else {
            buf.advance(length);
            warn!(type_id, length, "unknown envelope type, skipping payload");
            return Ok(DecodeOutcome::SkippedUnknownType { type_id });
        };

        if message_type.version() != version as u16 {
            buf.advance(length);
            warn!(
                type_id,
                declared = version,
                registered = message_type.version(),
                length,
                "envelope version mismatch, skipping payload"
            );
            return Ok(DecodeOutcome::SkippedVersionMismatch {
                type_id: type_id as u16,
                declared: version as u16,
                registered: message_type.version(),
            });
        }

        let payload = buf.copy_to_bytes(length);
        let mut message = message_type.instantiate();
        message.read_payload(&payload).map_err(|e| match e {
            err @ ProtocolError::MalformedPayload { .. } => err,
            other => ProtocolError::MalformedPayload {
                type_id: type_id as u16,
                reason: other.to_string(),
            },
        })?;

        trace!(type_id, version, length, "envelope decoded");
        Ok(DecodeOutcome::Message(message))
    }
}

/// Length-framed stream codec for envelopes, for callers feeding a raw byte
/// stream instead of pre-framed packets.
///
/// Decoding yields whole [`Envelope`] frames without touching the registry;
/// pair with [`EnvelopeCodec::decode`] (or feed the payload onward) for
/// dispatch. Implements [`tokio_util::codec::Decoder`] and
/// [`Encoder<Envelope>`].
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeFramer {
    max_payload_size: usize,
}

impl Default for EnvelopeFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopeFramer {
    pub fn new() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }

    pub fn with_max_payload_size(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }
}

impl Decoder for EnvelopeFramer {
    type Item = Envelope;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let length = u32::from_be_bytes(
            src[4..8].try_into().expect("header length checked above"),
        ) as usize;
        if length > self.max_payload_size {
            return Err(ProtocolError::OversizedEnvelope(length));
        }
        if src.len() < HEADER_LEN + length {
            // Partial frame: reserve and wait for more bytes
            src.reserve(HEADER_LEN + length - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(HEADER_LEN + length);
        let type_id = frame.get_i16();
        let version = frame.get_i16();
        frame.advance(4);

        Ok(Some(Envelope {
            type_id,
            version,
            payload: frame.freeze(),
        }))
    }
}

impl Encoder<Envelope> for EnvelopeFramer {
    type Error = ProtocolError;

    fn encode(&mut self, envelope: Envelope, dst: &mut BytesMut) -> Result<()> {
        if envelope.payload.len() > self.max_payload_size {
            return Err(ProtocolError::OversizedEnvelope(envelope.payload.len()));
        }

        dst.reserve(HEADER_LEN + envelope.payload.len());
        dst.put_i16(envelope.type_id);
        dst.put_i16(envelope.version);
        dst.put_u32(envelope.payload.len() as u32);
        dst.put_slice(&envelope.payload);
        Ok(())
    }
}
