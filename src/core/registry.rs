//! # Message Type Registry
//!
//! Maps numeric type ids to message-type descriptors: declared version, size
//! hint, and a factory producing a fresh message instance per inbound
//! envelope.
//!
//! The registry is an explicit object owned by (or shared with) the codec —
//! there is no global mutable type table. It is populated at startup and
//! read-mostly afterwards; resolution from concurrent connection dispatch
//! threads is safe against late registration.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::core::message::Message;
use crate::error::{ProtocolError, Result};

/// Largest type id (and version) a registry accepts.
///
/// The envelope header carries both fields as signed 16-bit integers, with
/// negative values reserved for the empty-envelope marker, so only
/// `0..=i16::MAX` survives the wire.
pub const MAX_TYPE_ID: u16 = i16::MAX as u16;

type MessageFactory = Box<dyn Fn() -> Box<dyn Message> + Send + Sync + 'static>;

/// Descriptor for one registered message type.
///
/// Registered once at startup, looked up per inbound envelope, never mutated
/// after registration.
pub struct MessageType {
    id: u16,
    version: u16,
    max_size: usize,
    factory: MessageFactory,
}

impl MessageType {
    /// Numeric type id.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Declared payload version for this type.
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Upper-bound hint on serialized payload size.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Produce a default-constructed, mutable message instance.
    pub fn instantiate(&self) -> Box<dyn Message> {
        (self.factory)()
    }
}

impl std::fmt::Debug for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageType")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}

/// Registry of message types, keyed by id.
///
/// Ids are caller-assigned within `0..=`[`MAX_TYPE_ID`] and may be dense or
/// sparse; no ordering is guaranteed.
#[derive(Debug, Default)]
pub struct MessageTypeRegistry {
    types: RwLock<HashMap<u16, Arc<MessageType>>>,
}

impl MessageTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message type.
    ///
    /// # Errors
    /// - [`ProtocolError::TypeIdOutOfRange`] / [`ProtocolError::VersionOutOfRange`]
    ///   if `id` or `version` exceeds [`MAX_TYPE_ID`] and could not be encoded
    ///   in the signed wire header
    /// - [`ProtocolError::DuplicateType`] if `id` is already registered
    ///
    /// Both are startup-time conflicts and should be treated as fatal by
    /// callers.
    pub fn register<F>(&self, id: u16, version: u16, max_size: usize, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Message> + Send + Sync + 'static,
    {
        if id > MAX_TYPE_ID {
            return Err(ProtocolError::TypeIdOutOfRange(id));
        }
        if version > MAX_TYPE_ID {
            return Err(ProtocolError::VersionOutOfRange(version));
        }

        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);

        if types.contains_key(&id) {
            return Err(ProtocolError::DuplicateType(id));
        }

        types.insert(
            id,
            Arc::new(MessageType {
                id,
                version,
                max_size,
                factory: Box::new(factory),
            }),
        );
        debug!(type_id = id, version, "message type registered");
        Ok(())
    }

    /// Look up the descriptor for a type id.
    pub fn resolve(&self, id: u16) -> Option<Arc<MessageType>> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Remove every registered type (shutdown path).
    pub fn unregister_all(&self) {
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        let removed = types.len();
        types.clear();
        debug!(removed, "all message types unregistered");
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::{ChunkDataMessage, CHUNK_DATA_TYPE_ID, CHUNK_DATA_VERSION};

    fn chunk_factory() -> Box<dyn Message> {
        Box::<ChunkDataMessage>::default()
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = MessageTypeRegistry::new();
        registry
            .register(CHUNK_DATA_TYPE_ID, CHUNK_DATA_VERSION, 1 << 20, chunk_factory)
            .expect("register");

        let ty = registry.resolve(CHUNK_DATA_TYPE_ID).expect("resolve");
        assert_eq!(ty.id(), CHUNK_DATA_TYPE_ID);
        assert_eq!(ty.version(), CHUNK_DATA_VERSION);

        let instance = ty.instantiate();
        assert_eq!(instance.type_id(), CHUNK_DATA_TYPE_ID);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = MessageTypeRegistry::new();
        registry.register(7, 1, 64, chunk_factory).expect("first");

        assert!(matches!(
            registry.register(7, 2, 64, chunk_factory),
            Err(ProtocolError::DuplicateType(7))
        ));
        // Original registration untouched
        assert_eq!(registry.resolve(7).expect("still resolves").version(), 1);
    }

    #[test]
    fn test_unknown_id_resolves_to_none() {
        let registry = MessageTypeRegistry::new();
        assert!(registry.resolve(999).is_none());
    }

    #[test]
    fn test_sparse_ids_allowed() {
        let registry = MessageTypeRegistry::new();
        registry.register(0, 1, 8, chunk_factory).expect("id 0");
        registry
            .register(MAX_TYPE_ID, 1, 8, chunk_factory)
            .expect("id at wire ceiling");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_ids_beyond_wire_range_rejected() {
        let registry = MessageTypeRegistry::new();

        // Ids above i16::MAX would flip negative in the signed header and
        // decode as the empty envelope, silently dropping every message.
        assert!(matches!(
            registry.register(60000, 1, 8, chunk_factory),
            Err(ProtocolError::TypeIdOutOfRange(60000))
        ));
        assert!(matches!(
            registry.register(5, 40000, 8, chunk_factory),
            Err(ProtocolError::VersionOutOfRange(40000))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_all() {
        let registry = MessageTypeRegistry::new();
        registry.register(1, 1, 8, chunk_factory).expect("register");
        registry.register(2, 1, 8, chunk_factory).expect("register");

        registry.unregister_all();
        assert!(registry.is_empty());
        assert!(registry.resolve(1).is_none());
    }
}
