//! # Core Protocol Components
//!
//! The envelope sub-protocol: typed message framing and registry-driven
//! dispatch.
//!
//! ## Components
//! - **Message**: the capability every application message implements
//! - **Registry**: type id → descriptor (version, size hint, factory)
//! - **Envelope**: header codec, skip semantics, and the stream framer
//!
//! ## Wire Format
//! ```text
//! [type_id i16] [version i16] [length u32] [payload u8; length]
//! ```
//!
//! ## Security
//! - Declared payload lengths validated before allocation
//! - Unknown types and version skew skipped, never fatal to the connection

pub mod envelope;
pub mod message;
pub mod registry;

pub use envelope::{DecodeOutcome, Envelope, EnvelopeCodec, EnvelopeFramer};
pub use message::Message;
pub use registry::{MessageType, MessageTypeRegistry};
