//! # Partition Primitives
//!
//! Stateless chunking, hashing, and record layout for the deduplicated
//! buffer wire format.
//!
//! Bulk payloads are cut into fixed 2 KB partitions; each partition is
//! identified on the wire by an unseeded 64-bit XXH3 content hash. The
//! reduced buffer is a run of tagged per-partition records followed by a
//! 13-byte trailer:
//!
//! ```text
//! record*  := [0x00] [hash u64]                 duplicate, content known to peer
//!           | [0x01] [hash u64] [raw 2048B]     first-seen, content inline
//! trailer  := [whole_hash u64] [original_len u32] [0x00]
//! ```
//!
//! All integers are big-endian. Every record carries an explicit flag byte so
//! the decoder never has to guess a record's kind from shared state. The final
//! partition of an input is zero-padded to the full partition size before
//! hashing, which keeps the hash of a short tail deterministic; the trailer's
//! `original_len` recovers the true length on expansion.

use crate::error::{ProtocolError, Result};
use xxhash_rust::xxh3::xxh3_64;

/// Size of one deduplication partition in bytes.
pub const PARTITION_SIZE: usize = 2048;

/// Flag byte tagging a duplicate (hash-only) record.
pub const FLAG_DUPLICATE: u8 = 0x00;

/// Flag byte tagging a first-seen (raw content) record.
pub const FLAG_RAW: u8 = 0x01;

/// Wire size of a duplicate record: flag + hash.
pub const DUPLICATE_RECORD_LEN: usize = 1 + 8;

/// Wire size of a raw record: flag + hash + full partition.
pub const RAW_RECORD_LEN: usize = 1 + 8 + PARTITION_SIZE;

/// Wire size of the trailer: whole-buffer hash + original length + terminator.
pub const TRAILER_LEN: usize = 8 + 4 + 1;

/// Terminator byte closing the trailer.
pub const TRAILER_TERMINATOR: u8 = 0x00;

/// Number of partitions needed to cover `total_len` bytes.
///
/// Zero-length input needs zero partitions.
pub fn partition_count(total_len: usize, partition_size: usize) -> usize {
    total_len.div_ceil(partition_size)
}

/// Copy partition `index` of `source` into `scratch`, zero-padding past the
/// end of the source.
///
/// The padding is what makes the hash of the final, possibly short,
/// partition reproducible on both ends. An `index` entirely past the end of
/// `source` zero-fills the scratch buffer.
pub fn copy_partition(source: &[u8], index: usize, scratch: &mut [u8; PARTITION_SIZE]) {
    let start = index.saturating_mul(PARTITION_SIZE);
    if start >= source.len() {
        scratch.fill(0);
        return;
    }

    let end = source.len().min(start + PARTITION_SIZE);
    let used = end - start;
    scratch[..used].copy_from_slice(&source[start..end]);
    scratch[used..].fill(0);
}

/// Unseeded 64-bit content hash over the full buffer.
///
/// Used both per-partition and over the whole input for the trailer.
#[inline]
pub fn hash(buf: &[u8]) -> u64 {
    xxh3_64(buf)
}

/// Append a duplicate (hash-only) record.
pub fn write_duplicate_record(dest: &mut Vec<u8>, hash: u64) {
    dest.push(FLAG_DUPLICATE);
    dest.extend_from_slice(&hash.to_be_bytes());
}

/// Append a first-seen record carrying the full partition content.
pub fn write_raw_record(dest: &mut Vec<u8>, hash: u64, raw: &[u8; PARTITION_SIZE]) {
    dest.push(FLAG_RAW);
    dest.extend_from_slice(&hash.to_be_bytes());
    dest.extend_from_slice(raw);
}

/// Append the closing trailer.
pub fn write_trailer(dest: &mut Vec<u8>, whole_hash: u64, original_len: u32) {
    dest.extend_from_slice(&whole_hash.to_be_bytes());
    dest.extend_from_slice(&original_len.to_be_bytes());
    dest.push(TRAILER_TERMINATOR);
}

/// One parsed per-partition record.
#[derive(Debug, PartialEq, Eq)]
pub enum PartitionRecord<'a> {
    /// Content previously seen by the peer; only the hash travels.
    Duplicate { hash: u64 },
    /// First occurrence of this content; the full padded partition travels.
    Raw { hash: u64, content: &'a [u8] },
}

impl PartitionRecord<'_> {
    /// Wire size of this record.
    pub fn wire_len(&self) -> usize {
        match self {
            PartitionRecord::Duplicate { .. } => DUPLICATE_RECORD_LEN,
            PartitionRecord::Raw { .. } => RAW_RECORD_LEN,
        }
    }
}

/// Parse the record starting at the head of `src`.
///
/// `index` is the partition index, carried only into error context.
/// Returns the record and the number of bytes it occupied.
pub fn read_record(src: &[u8], index: usize) -> Result<(PartitionRecord<'_>, usize)> {
    let flag = *src.first().ok_or(ProtocolError::TruncatedRecord {
        kind: "partition",
        index,
    })?;

    match flag {
        FLAG_DUPLICATE => {
            if src.len() < DUPLICATE_RECORD_LEN {
                return Err(ProtocolError::TruncatedRecord {
                    kind: "duplicate",
                    index,
                });
            }
            let hash = u64::from_be_bytes(
                src[1..9].try_into().expect("slice length checked above"),
            );
            Ok((PartitionRecord::Duplicate { hash }, DUPLICATE_RECORD_LEN))
        }
        FLAG_RAW => {
            if src.len() < RAW_RECORD_LEN {
                return Err(ProtocolError::TruncatedRecord { kind: "raw", index });
            }
            let hash = u64::from_be_bytes(
                src[1..9].try_into().expect("slice length checked above"),
            );
            let content = &src[9..RAW_RECORD_LEN];
            Ok((PartitionRecord::Raw { hash, content }, RAW_RECORD_LEN))
        }
        other => Err(ProtocolError::UnknownRecordFlag(other)),
    }
}

/// Parsed trailer of a reduced buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    /// Hash over the entire original (pre-reduction) input.
    pub whole_hash: u64,
    /// Byte length of the original input.
    pub original_len: u32,
}

/// Parse the trailer occupying the final [`TRAILER_LEN`] bytes of `src`.
pub fn read_trailer(src: &[u8]) -> Result<Trailer> {
    if src.len() < TRAILER_LEN {
        return Err(ProtocolError::TruncatedRecord {
            kind: "trailer",
            index: 0,
        });
    }

    let base = src.len() - TRAILER_LEN;
    let whole_hash = u64::from_be_bytes(
        src[base..base + 8].try_into().expect("slice length checked above"),
    );
    let original_len = u32::from_be_bytes(
        src[base + 8..base + 12]
            .try_into()
            .expect("slice length checked above"),
    );

    Ok(Trailer {
        whole_hash,
        original_len,
    })
}
