//! # subchannel-protocol
//!
//! Application sub-protocol core for a fixed, versioned binary client-server
//! transport: typed packet envelopes, registry-driven dispatch, and
//! content-addressed deduplication of bulk chunk payloads.
//!
//! ## What this crate does
//! - **Envelopes**: wraps arbitrary typed messages in a self-describing
//!   `(type_id, version, length, payload)` envelope that rides as one opaque
//!   packet inside the host transport's stream
//! - **Dispatch**: routes inbound envelopes to the correct handler by type id
//!   and version; unknown types and version skew are skipped, logged, and
//!   never fatal
//! - **Deduplication**: reduces periodic world-chunk snapshots by replacing
//!   every 2 KB partition the peer has already seen with a 9-byte tagged
//!   content-hash record
//!
//! ## What it does not do
//! The host wire protocol itself — outer framing, compression, encryption,
//! socket I/O — is out of scope. The host is visible only through the
//! [`transport::HostTransport`] install/remove capability.
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use bytes::BytesMut;
//! use subchannel_protocol::core::message::{ChunkDataMessage, CHUNK_DATA_TYPE_ID, CHUNK_DATA_VERSION};
//! use subchannel_protocol::core::{DecodeOutcome, EnvelopeCodec, MessageTypeRegistry};
//! use subchannel_protocol::cache::DeduplicationCache;
//!
//! # fn main() -> subchannel_protocol::error::Result<()> {
//! let registry = Arc::new(MessageTypeRegistry::new());
//! registry.register(CHUNK_DATA_TYPE_ID, CHUNK_DATA_VERSION, 1 << 20, || {
//!     Box::<ChunkDataMessage>::default()
//! })?;
//! let codec = EnvelopeCodec::new(registry);
//!
//! // Outbound: reduce the chunk snapshot, then wrap it in an envelope
//! let cache = DeduplicationCache::new();
//! let snapshot = vec![0u8; 8192];
//! let reduced = cache.transform(&snapshot);
//! let mut wire = BytesMut::new();
//! codec.encode(Some(&ChunkDataMessage::new(3, -7, reduced)), &mut wire)?;
//!
//! // Inbound: decode back through the same registry
//! let outcome = codec.decode(&mut wire.freeze())?;
//! assert!(matches!(outcome, DecodeOutcome::Message(_)));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod transport;
pub mod utils;

pub use crate::cache::{DeduplicationCache, ExpansionCache};
pub use crate::core::{
    DecodeOutcome, Envelope, EnvelopeCodec, EnvelopeFramer, Message, MessageTypeRegistry,
};
pub use crate::error::{ProtocolError, Result};
pub use crate::transport::{Session, SessionDirectory, TransportBinding};
