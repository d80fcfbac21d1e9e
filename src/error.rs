//! # Error Types
//!
//! Comprehensive error handling for the sub-protocol layer.
//!
//! This module defines all error variants that can occur while framing,
//! dispatching, and deduplicating application messages riding inside the
//! host transport's packet stream.
//!
//! ## Error Categories
//! - **Framing Errors**: malformed payloads, oversized envelopes
//! - **Registry Errors**: duplicate type ids at startup
//! - **Cache Errors**: truncated records, unknown hashes, checksum mismatch
//!   (decode side only — the encode transform has no failure path)
//! - **Transport Errors**: host hook rejected the envelope type install
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! ## Severity
//! Not every protocol event is an error. Unknown type ids and version skew on
//! inbound envelopes are *recoverable outcomes* reported by
//! [`crate::core::envelope::DecodeOutcome`]; the variants here cover the paths
//! that genuinely fail an operation.

use std::io;
use thiserror::Error;

// ProtocolError is the primary error type for all sub-protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Duplicate message type id: {0}")]
    DuplicateType(u16),

    #[error("Type id {0} exceeds the signed wire range (0..=32767)")]
    TypeIdOutOfRange(u16),

    #[error("Version {0} exceeds the signed wire range (0..=32767)")]
    VersionOutOfRange(u16),

    #[error("Malformed payload for type {type_id}: {reason}")]
    MalformedPayload { type_id: u16, reason: String },

    #[error("Envelope payload too large: {0} bytes")]
    OversizedEnvelope(usize),

    #[error("Truncated envelope: needed {needed} bytes, had {available}")]
    TruncatedEnvelope { needed: usize, available: usize },

    #[error("Truncated {kind} record at partition {index}")]
    TruncatedRecord { kind: &'static str, index: usize },

    #[error("Unknown record flag byte: {0:#04x}")]
    UnknownRecordFlag(u8),

    #[error("No cached content for partition hash {0:#018x}")]
    UnknownPartitionHash(u64),

    #[error("Whole-buffer hash mismatch: expected {expected:#018x}, got {actual:#018x}")]
    ChecksumMismatch { expected: u64, actual: u64 },

    #[error("Transport registration failed: {0}")]
    TransportRegistration(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
