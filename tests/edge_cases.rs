//! Edge-case tests for boundary conditions across the framing and cache layers

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;
use subchannel_protocol::cache::partition::TRAILER_LEN;
use subchannel_protocol::cache::{DeduplicationCache, ExpansionCache, PARTITION_SIZE};
use subchannel_protocol::core::message::ChunkDataMessage;
use subchannel_protocol::core::{Envelope, EnvelopeCodec, EnvelopeFramer, MessageTypeRegistry};
use subchannel_protocol::error::ProtocolError;
use tokio_util::codec::{Decoder, Encoder};

// ============================================================================
// FRAMER: CHUNKED ARRIVAL
// ============================================================================

/// A stream of envelopes must decode identically no matter how the transport
/// fragments it.
#[test]
fn test_framer_decodes_identically_across_fragmentations() {
    let envelopes = vec![
        Envelope {
            type_id: 3,
            version: 1,
            payload: Bytes::from(vec![0x11; 300]),
        },
        Envelope::empty(),
        Envelope {
            type_id: 4,
            version: 1,
            payload: Bytes::from(vec![0x22; 7]),
        },
    ];

    let mut stream = BytesMut::new();
    let mut framer = EnvelopeFramer::new();
    for envelope in &envelopes {
        framer.encode(envelope.clone(), &mut stream).expect("encode");
    }
    let wire = stream.freeze();

    for fragment_size in [1usize, 3, 8, 64, wire.len()] {
        let mut framer = EnvelopeFramer::new();
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();

        for fragment in wire.chunks(fragment_size) {
            buf.extend_from_slice(fragment);
            while let Some(envelope) = framer.decode(&mut buf).expect("decode") {
                decoded.push(envelope);
            }
        }

        assert_eq!(decoded, envelopes, "fragment size {fragment_size}");
    }
}

#[test]
fn test_framer_rejects_oversized_claim_before_buffering() {
    let mut framer = EnvelopeFramer::with_max_payload_size(1024);

    let mut buf = BytesMut::new();
    buf.put_i16(3);
    buf.put_i16(1);
    buf.put_u32(50_000_000); // absurd length claim, no payload behind it

    assert!(matches!(
        framer.decode(&mut buf),
        Err(ProtocolError::OversizedEnvelope(50_000_000))
    ));
}

// ============================================================================
// CODEC: SIZE LIMITS
// ============================================================================

#[test]
fn test_encode_rejects_payload_over_ceiling() {
    let registry = Arc::new(MessageTypeRegistry::new());
    let codec = EnvelopeCodec::with_max_payload_size(registry, 64);

    let msg = ChunkDataMessage::new(0, 0, vec![0u8; 128]);
    let mut out = BytesMut::new();
    assert!(matches!(
        codec.encode(Some(&msg), &mut out),
        Err(ProtocolError::OversizedEnvelope(_))
    ));
}

// ============================================================================
// CACHE: PARTITION BOUNDARIES
// ============================================================================

#[test]
fn test_transform_at_partition_boundaries() {
    for len in [
        PARTITION_SIZE - 1,
        PARTITION_SIZE,
        PARTITION_SIZE + 1,
        2 * PARTITION_SIZE - 1,
        2 * PARTITION_SIZE,
    ] {
        let sender = DeduplicationCache::new();
        let receiver = ExpansionCache::new();
        let input: Vec<u8> = (0..len).map(|i| (i % 255) as u8).collect();

        let restored = receiver.expand(&sender.transform(&input)).expect("expand");
        assert_eq!(restored, input, "length {len}");
    }
}

/// A buffer ending exactly at a partition boundary and the same buffer with
/// one zero byte appended pad to identical final partitions, but the trailer
/// hash and length still tell them apart.
#[test]
fn test_zero_padding_does_not_conflate_lengths() {
    let exact = vec![0x33u8; PARTITION_SIZE];
    let mut padded = exact.clone();
    padded.push(0);

    let sender = DeduplicationCache::new();
    let receiver = ExpansionCache::new();

    let restored_exact = receiver.expand(&sender.transform(&exact)).expect("exact");
    let restored_padded = receiver.expand(&sender.transform(&padded)).expect("padded");

    assert_eq!(restored_exact.len(), PARTITION_SIZE);
    assert_eq!(restored_padded.len(), PARTITION_SIZE + 1);
}

// ============================================================================
// CACHE: MALFORMED REDUCED BUFFERS
// ============================================================================

#[test]
fn test_expand_rejects_buffer_shorter_than_trailer() {
    let receiver = ExpansionCache::new();
    for len in 0..TRAILER_LEN {
        assert!(matches!(
            receiver.expand(&vec![0u8; len]),
            Err(ProtocolError::TruncatedRecord { .. })
        ));
    }
}

#[test]
fn test_expand_rejects_garbage_record_flag() {
    let sender = DeduplicationCache::new();
    let receiver = ExpansionCache::new();

    let mut reduced = sender.transform(&[0xAAu8; 100]);
    reduced[0] = 0x99; // clobber the first record's flag byte

    assert!(matches!(
        receiver.expand(&reduced),
        Err(ProtocolError::UnknownRecordFlag(0x99))
    ));
}
