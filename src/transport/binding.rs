//! # Transport Binding
//!
//! Splices the envelope type into the host transport's dispatch table and
//! bridges inbound envelopes to the session that produced them.
//!
//! The host transport is opaque behind [`HostTransport`]: all this layer
//! needs is "install a packet type by numeric id" and its inverse. A failed
//! install is logged and leaves the binding disabled — the application keeps
//! running without the sub-protocol rather than taking the host down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Buf;
use tracing::{debug, error, trace};

use crate::core::envelope::{DecodeOutcome, EnvelopeCodec};
use crate::error::Result;
use crate::transport::session::{ConnectionId, SessionDirectory};

/// Packet type id the envelope occupies in the host transport's table.
pub const ENVELOPE_HOST_TYPE_ID: u16 = 195;

/// Install/remove capability exposed by the host transport.
pub trait HostTransport: Send + Sync {
    /// Install a packet type into the host's dispatch table.
    fn install_type(&self, type_id: u16) -> Result<()>;

    /// Remove a previously installed packet type. Must tolerate ids that were
    /// never installed.
    fn remove_type(&self, type_id: u16);
}

/// Binding between the envelope sub-protocol and one host transport.
pub struct TransportBinding {
    transport: Arc<dyn HostTransport>,
    directory: Arc<SessionDirectory>,
    codec: EnvelopeCodec,
    host_type_id: u16,
    registered: AtomicBool,
}

impl TransportBinding {
    pub fn new(
        transport: Arc<dyn HostTransport>,
        directory: Arc<SessionDirectory>,
        codec: EnvelopeCodec,
    ) -> Self {
        Self {
            transport,
            directory,
            codec,
            host_type_id: ENVELOPE_HOST_TYPE_ID,
            registered: AtomicBool::new(false),
        }
    }

    /// Use a non-default slot in the host's packet table.
    pub fn with_host_type_id(mut self, host_type_id: u16) -> Self {
        self.host_type_id = host_type_id;
        self
    }

    /// Install the envelope type with the host transport. Idempotent.
    ///
    /// Returns whether the binding is registered afterwards. Install failures
    /// are logged and swallowed: the host keeps running, this connection just
    /// lacks the sub-protocol.
    pub fn register(&self) -> bool {
        if self.registered.load(Ordering::Acquire) {
            return true;
        }

        match self.transport.install_type(self.host_type_id) {
            Ok(()) => {
                self.registered.store(true, Ordering::Release);
                debug!(host_type_id = self.host_type_id, "envelope type installed");
                true
            }
            Err(e) => {
                error!(
                    host_type_id = self.host_type_id,
                    error = %e,
                    "envelope type install rejected; sub-protocol disabled"
                );
                false
            }
        }
    }

    /// Remove the envelope type from the host transport. Idempotent.
    pub fn unregister(&self) {
        if self.registered.swap(false, Ordering::AcqRel) {
            self.transport.remove_type(self.host_type_id);
            debug!(host_type_id = self.host_type_id, "envelope type removed");
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// The codec this binding decodes inbound envelopes with.
    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    /// Decode one inbound envelope and dispatch it to its session.
    ///
    /// The complete inbound path: host transport delivers opaque bytes for a
    /// connection, this decodes the envelope and runs the message against the
    /// resolved session. Skip outcomes and unresolvable sessions are normal;
    /// only framing/payload faults propagate.
    pub fn receive<B: Buf>(&self, connection: ConnectionId, buf: &mut B) -> Result<()> {
        let outcome = self.codec.decode(buf)?;
        self.dispatch(connection, outcome);
        Ok(())
    }

    /// Hand a decoded outcome to the session bound to `connection`.
    ///
    /// Messages for connections without a live session are dropped silently —
    /// the connection may not be fully established yet.
    pub fn dispatch(&self, connection: ConnectionId, outcome: DecodeOutcome) {
        let DecodeOutcome::Message(message) = outcome else {
            // Empty and skip outcomes carry nothing to run; already logged
            // by the codec.
            return;
        };

        match self.directory.resolve(connection) {
            Some(session) => message.run(&session),
            None => trace!(
                connection,
                type_id = message.type_id(),
                "no session for connection, message dropped"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CONTROL_CHANNEL;
    use crate::core::message::{
        CacheControlMessage, CACHE_CONTROL_TYPE_ID, CACHE_CONTROL_VERSION,
    };
    use crate::core::registry::MessageTypeRegistry;
    use crate::error::ProtocolError;
    use crate::transport::session::Session;
    use bytes::BytesMut;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct FakeTransport {
        installs: AtomicUsize,
        removes: AtomicUsize,
        reject: bool,
    }

    impl HostTransport for FakeTransport {
        fn install_type(&self, type_id: u16) -> Result<()> {
            if self.reject {
                return Err(ProtocolError::TransportRegistration(format!(
                    "slot {type_id} occupied"
                )));
            }
            self.installs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn remove_type(&self, _type_id: u16) {
            self.removes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn control_registry() -> Arc<MessageTypeRegistry> {
        let registry = MessageTypeRegistry::new();
        registry
            .register(CACHE_CONTROL_TYPE_ID, CACHE_CONTROL_VERSION, 1 << 16, || {
                Box::<CacheControlMessage>::default()
            })
            .expect("register control type");
        Arc::new(registry)
    }

    fn binding_with(transport: Arc<FakeTransport>) -> (TransportBinding, Arc<SessionDirectory>) {
        let directory = Arc::new(SessionDirectory::new());
        let codec = EnvelopeCodec::new(control_registry());
        (
            TransportBinding::new(transport, directory.clone(), codec),
            directory,
        )
    }

    #[test]
    fn test_register_is_idempotent() {
        let transport = Arc::new(FakeTransport::default());
        let (binding, _) = binding_with(transport.clone());

        assert!(binding.register());
        assert!(binding.register());
        assert!(binding.is_registered());
        assert_eq!(transport.installs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let transport = Arc::new(FakeTransport::default());
        let (binding, _) = binding_with(transport.clone());

        binding.register();
        binding.unregister();
        binding.unregister();
        assert!(!binding.is_registered());
        assert_eq!(transport.removes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejected_install_is_non_fatal() {
        let transport = Arc::new(FakeTransport {
            reject: true,
            ..Default::default()
        });
        let (binding, _) = binding_with(transport);

        assert!(!binding.register());
        assert!(!binding.is_registered());
    }

    #[test]
    fn test_receive_runs_message_against_session() {
        let transport = Arc::new(FakeTransport::default());
        let (binding, directory) = binding_with(transport);

        let session = Arc::new(Session::new(8, "steve"));
        directory.insert(&session);

        let msg = CacheControlMessage::new(CONTROL_CHANNEL, 42u64.to_be_bytes().to_vec());
        let mut buf = BytesMut::new();
        binding.codec().encode(Some(&msg), &mut buf).expect("encode");

        binding.receive(8, &mut buf.freeze()).expect("receive");

        // The control message's run hook enabled the session's cache
        assert!(session.chunk_cache().is_enabled());
        assert!(session.chunk_cache().contains(42));
    }

    #[test]
    fn test_message_for_dead_session_dropped_silently() {
        let transport = Arc::new(FakeTransport::default());
        let (binding, _directory) = binding_with(transport);

        let msg = CacheControlMessage::new(CONTROL_CHANNEL, Vec::new());
        let mut buf = BytesMut::new();
        binding.codec().encode(Some(&msg), &mut buf).expect("encode");

        // No session bound to connection 99; must not error
        binding.receive(99, &mut buf.freeze()).expect("receive");
    }
}
