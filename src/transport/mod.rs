//! # Transport Integration
//!
//! The seam between the envelope sub-protocol and the host transport.
//!
//! ## Components
//! - **Binding**: installs the envelope type into the host's packet table and
//!   drives the inbound decode → dispatch path
//! - **Session**: the live application counterpart of a connection, plus the
//!   weak-reference directory used to resolve dispatch targets
//!
//! The actual socket I/O, outer framing, compression, and encryption all
//! belong to the host transport and never appear here.

pub mod binding;
pub mod session;

pub use binding::{HostTransport, TransportBinding, ENVELOPE_HOST_TYPE_ID};
pub use session::{ConnectionId, Session, SessionDirectory};
