/**
 * Hierarchical bucket addresses, e.g. `pri/<identity>/addresses`.
 */
pub mod address;
/**
 * The namespace of facts.
 *  - Buckets with access lists and first-sight hooks
 *  - Per-datum propose / dismiss claims
 */
pub mod bucket;
pub mod clock;
/**
 * Addressed messages handed to and received from
 *  the transport.
 */
pub mod envelope;
/**
 * The replicated repository: message processing,
 *  garbage collection and anti-entropy rebroadcast.
 */
pub mod repo;
pub mod signatures;
/**
 * Persistence seam. Snapshots of the bucket tree and
 *  signature ledger, in memory or on disk.
 */
pub mod snapshot;
pub mod stats;
pub mod validity;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;
/**
 * Logical wire primitives, the codec that turns them
 *  into strings, and content hashing.
 */
pub mod wire;

pub mod prelude {
    pub use crate::address::{Address, AddressError};
    pub use crate::bucket::{Bucket, BucketDataItem, BucketError, HookEvent};
    pub use crate::clock::{Clock, ManualClock, SystemClock, Timestamp};
    pub use crate::envelope::{Envelope, EnvelopeError, ALL_NODES};
    pub use crate::repo::{
        AccessMode, DistributedRepo, ProcessError, Processed, RebroadcastOptions, DEFAULT_SCHEMA,
    };
    pub use crate::signatures::SignatureLedger;
    pub use crate::snapshot::{
        FileSnapshotStore, MemorySnapshotStore, Snapshot, SnapshotError, SnapshotStore,
    };
    pub use crate::stats::ChannelStats;
    pub use crate::validity::{Bound, Validity};
    pub use crate::version::build_info;
    pub use crate::wire::{content_hash, JsonCodec, WireCodec, WireError, WireMessage};
}
