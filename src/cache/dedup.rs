//! # Chunk Deduplication Cache
//!
//! Content-addressed deduplication for bulk, highly-repetitive payloads
//! (periodic chunk snapshots). The sending side remembers the hash of every
//! partition it has ever emitted on a connection; repeated content is replaced
//! on the wire by a 9-byte hash reference instead of 2 KB of raw bytes.
//!
//! ## Halves
//! - [`DeduplicationCache`] — sender side: the append-only seen-hash set and
//!   the `transform` that reduces a raw buffer to tagged records.
//! - [`ExpansionCache`] — receiver side: hash → content map that reconstructs
//!   the original buffer and verifies the trailer checksum.
//!
//! ## Concurrency
//! The seen-set supports lock-free insert-if-absent (`DashSet`), so multiple
//! chunk-generation workers may feed one outbound connection without a global
//! lock. Each `transform` call keeps its scratch partition on the stack, so
//! calls are independent; record order within one output buffer is always
//! ascending partition index.
//!
//! ## Resource growth
//! The seen-set is append-only for the lifetime of the owning session — there
//! is no eviction. Long-lived sessions should watch [`DeduplicationCache::stats`];
//! a one-time warning is logged when the set crosses the configured watermark.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::{DashMap, DashSet};
use tracing::{debug, trace, warn};

use crate::cache::partition::{
    copy_partition, hash, partition_count, read_record, read_trailer, write_duplicate_record,
    write_raw_record, write_trailer, PartitionRecord, DUPLICATE_RECORD_LEN, PARTITION_SIZE,
    RAW_RECORD_LEN, TRAILER_LEN,
};
use crate::error::{ProtocolError, Result};

/// Control channel that enables the cache and pre-seeds hashes on reconnect.
pub const CONTROL_CHANNEL: &str = "ChkCache:setHash";

/// Default seen-hash watermark before the growth warning fires.
pub const DEFAULT_WARN_HASHES: usize = 1_000_000;

/// Sender-side deduplication state for one session/connection.
///
/// Append-only: a partition hash is inserted exactly once, the first time its
/// content is observed, and never removed.
#[derive(Debug)]
pub struct DeduplicationCache {
    seen: DashSet<u64>,
    enabled: AtomicBool,
    warn_hashes: usize,
    growth_warned: AtomicBool,
}

impl DeduplicationCache {
    /// Create a cache with the default growth watermark.
    pub fn new() -> Self {
        Self::with_warn_watermark(DEFAULT_WARN_HASHES)
    }

    /// Create a cache that warns once the seen-set holds `warn_hashes` entries.
    pub fn with_warn_watermark(warn_hashes: usize) -> Self {
        Self {
            seen: DashSet::new(),
            enabled: AtomicBool::new(false),
            warn_hashes,
            growth_warned: AtomicBool::new(false),
        }
    }

    /// Whether the client has enabled deduplication for this session.
    ///
    /// The transition is one-way: once enabled, a session stays enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Atomically insert a partition hash, reporting whether it was new.
    ///
    /// Exactly one of N racing inserters of the same hash observes `true`.
    pub fn insert_if_absent(&self, hash: u64) -> bool {
        self.seen.insert(hash)
    }

    /// Whether a partition hash has been observed on this session.
    pub fn contains(&self, hash: u64) -> bool {
        self.seen.contains(&hash)
    }

    /// Number of distinct partition hashes observed so far.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True when no partition has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Handle an inbound control message.
    ///
    /// On [`CONTROL_CHANNEL`], enables the cache and bulk-loads big-endian
    /// `u64` hash values from the payload, 8 bytes at a time. A trailing
    /// partial value is discarded, never an error — a reconnecting client may
    /// send an arbitrarily truncated snapshot of its hash store. Messages on
    /// other channels are ignored; returns whether the message was consumed.
    pub fn handle_control_message(&self, channel: &str, payload: Option<&[u8]>) -> bool {
        if channel != CONTROL_CHANNEL {
            return false;
        }

        self.enabled.store(true, Ordering::Release);

        let mut loaded = 0usize;
        if let Some(bytes) = payload {
            for chunk in bytes.chunks_exact(8) {
                let hash = u64::from_be_bytes(chunk.try_into().expect("chunks_exact yields 8"));
                self.seen.insert(hash);
                loaded += 1;
            }
        }

        debug!(loaded, total = self.seen.len(), "chunk cache enabled via control channel");
        true
    }

    /// Reduce a raw buffer to the deduplicated wire form.
    ///
    /// First-seen partitions are emitted as raw records and their hashes
    /// remembered; already-seen partitions shrink to hash references. The
    /// trailer carries a hash over the whole original input plus its length.
    ///
    /// This has no failure path: any input, including empty, produces a valid
    /// (possibly trailer-only) output. The input is never mutated.
    pub fn transform(&self, inflated: &[u8]) -> Vec<u8> {
        let segments = partition_count(inflated.len(), PARTITION_SIZE);

        // Worst case: every partition is first-seen and travels raw.
        let mut reduced = Vec::with_capacity(segments * RAW_RECORD_LEN + TRAILER_LEN);
        let mut scratch = [0u8; PARTITION_SIZE];

        let mut raw_records = 0usize;
        for index in 0..segments {
            copy_partition(inflated, index, &mut scratch);
            let partition_hash = hash(&scratch);

            if self.seen.insert(partition_hash) {
                write_raw_record(&mut reduced, partition_hash, &scratch);
                raw_records += 1;
            } else {
                write_duplicate_record(&mut reduced, partition_hash);
            }
        }

        write_trailer(&mut reduced, hash(inflated), inflated.len() as u32);

        trace!(
            segments,
            raw_records,
            duplicate_records = segments - raw_records,
            in_bytes = inflated.len(),
            out_bytes = reduced.len(),
            "chunk buffer reduced"
        );

        if self.seen.len() >= self.warn_hashes && !self.growth_warned.swap(true, Ordering::Relaxed)
        {
            warn!(
                hashes = self.seen.len(),
                watermark = self.warn_hashes,
                "dedup cache passed growth watermark; set is append-only for session lifetime"
            );
        }

        reduced
    }

    /// Snapshot of cache occupancy for operational monitoring.
    pub fn stats(&self) -> DedupCacheStats {
        let hashes = self.seen.len();
        DedupCacheStats {
            hashes,
            approx_bytes: hashes * std::mem::size_of::<u64>(),
            enabled: self.is_enabled(),
        }
    }
}

impl Default for DeduplicationCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Occupancy statistics for a [`DeduplicationCache`].
#[derive(Debug, Clone, Copy)]
pub struct DedupCacheStats {
    /// Distinct partition hashes held.
    pub hashes: usize,
    /// Approximate resident bytes of the hash set (keys only).
    pub approx_bytes: usize,
    /// Whether the owning session enabled deduplication.
    pub enabled: bool,
}

/// Receiver-side cache: partition content keyed by hash.
///
/// Learns content from raw records and resolves duplicate records against it.
/// The hash set accumulated here is what a reconnecting client ships back over
/// the control channel to pre-seed the server's [`DeduplicationCache`].
#[derive(Debug, Default)]
pub struct ExpansionCache {
    content: DashMap<u64, Box<[u8; PARTITION_SIZE]>>,
}

impl ExpansionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct partitions whose content is held.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Reconstruct the original buffer from its reduced wire form.
    ///
    /// Walks the tagged records in order, learning first-seen content and
    /// resolving duplicates from the cache, then truncates to the trailer's
    /// original length and verifies the whole-buffer hash.
    ///
    /// # Errors
    /// - [`ProtocolError::TruncatedRecord`] — a record or the trailer is cut short
    /// - [`ProtocolError::UnknownRecordFlag`] — unrecognized record tag
    /// - [`ProtocolError::UnknownPartitionHash`] — duplicate record references
    ///   content this cache never learned
    /// - [`ProtocolError::ChecksumMismatch`] — reconstruction does not hash to
    ///   the trailer's whole-buffer hash
    pub fn expand(&self, reduced: &[u8]) -> Result<Vec<u8>> {
        if reduced.len() < TRAILER_LEN {
            return Err(ProtocolError::TruncatedRecord {
                kind: "trailer",
                index: 0,
            });
        }

        let trailer = read_trailer(reduced)?;
        let body = &reduced[..reduced.len() - TRAILER_LEN];

        // The trailer length is peer-supplied; cap the pre-allocation by what
        // the records present could actually expand to (each one is at least
        // DUPLICATE_RECORD_LEN bytes on the wire).
        let max_expanded = body.len() / DUPLICATE_RECORD_LEN * PARTITION_SIZE;
        let mut restored = Vec::with_capacity((trailer.original_len as usize).min(max_expanded));
        let mut cursor = 0usize;
        let mut index = 0usize;

        while cursor < body.len() {
            let (record, used) = read_record(&body[cursor..], index)?;
            match record {
                PartitionRecord::Raw { hash, content } => {
                    let mut owned = Box::new([0u8; PARTITION_SIZE]);
                    owned.copy_from_slice(content);
                    self.content.insert(hash, owned);
                    restored.extend_from_slice(content);
                }
                PartitionRecord::Duplicate { hash } => {
                    let cached = self
                        .content
                        .get(&hash)
                        .ok_or(ProtocolError::UnknownPartitionHash(hash))?;
                    restored.extend_from_slice(cached.value().as_slice());
                }
            }
            cursor += used;
            index += 1;
        }

        restored.truncate(trailer.original_len as usize);

        let actual = hash(&restored);
        if actual != trailer.whole_hash {
            return Err(ProtocolError::ChecksumMismatch {
                expected: trailer.whole_hash,
                actual,
            });
        }

        Ok(restored)
    }

    /// All partition hashes this cache holds content for.
    pub fn known_hashes(&self) -> Vec<u64> {
        self.content.iter().map(|entry| *entry.key()).collect()
    }

    /// Serialize the known hashes as a control-channel payload
    /// (big-endian `u64`s, the format [`DeduplicationCache::handle_control_message`]
    /// consumes).
    pub fn control_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.content.len() * 8);
        for entry in self.content.iter() {
            payload.extend_from_slice(&entry.key().to_be_bytes());
        }
        payload
    }
}
