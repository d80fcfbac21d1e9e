//! # Deduplication Cache
//!
//! Content-addressed compression for bulk chunk payloads.
//!
//! Periodic world-chunk snapshots are dominated by repeated content. Instead
//! of resending identical 2 KB partitions, the sender replaces every partition
//! whose hash the peer already holds with a short hash reference.
//!
//! ## Components
//! - **Partition**: fixed-size chunking, hashing, and wire record layout
//! - **Dedup**: the per-session seen-hash set, the reduce transform, and the
//!   receiving expansion cache
//!
//! ## Wire Format
//! ```text
//! [record*] [whole_hash u64] [original_len u32] [terminator]
//! ```
//! Records are flag-tagged (raw vs duplicate) so decoding needs no shared
//! state to stay unambiguous.

pub mod dedup;
pub mod partition;

pub use dedup::{DedupCacheStats, DeduplicationCache, ExpansionCache, CONTROL_CHANNEL};
pub use partition::PARTITION_SIZE;
