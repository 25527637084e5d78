//! Persistence seam for the replicated state.
//!
//! The engine only needs to hand over and take back a [`Snapshot`];
//!  where it lives is up to the [`SnapshotStore`]. Hooks are never
//!  persisted: they belong to the running process.

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::bucket::Bucket;
use crate::signatures::SignatureLedger;

/// Bumped whenever the layout of [`Snapshot`] changes; snapshots
///  written with another version are discarded on load.
pub const STORAGE_VERSION: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Encode(#[from] bincode::Error),
}

/// Everything needed to bring a replica back: the bucket tree and
///  the signatures collected so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub root: Bucket,
    pub signatures: SignatureLedger,
}

impl Snapshot {
    pub fn new(root: Bucket, signatures: SignatureLedger) -> Self {
        Self {
            version: STORAGE_VERSION,
            root,
            signatures,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a stored snapshot. Snapshots of another storage version,
    ///  or ones that cannot be decoded, are dropped with a warning and
    ///  reported as absent so that the node starts from a clean state.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        // the version is the leading field
        let version: u32 = match bincode::deserialize(bytes) {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!("discarding unreadable snapshot: {}", e);
                return None;
            }
        };
        if version != STORAGE_VERSION {
            tracing::warn!(
                found = version,
                expected = STORAGE_VERSION,
                "discarding snapshot of another storage version"
            );
            return None;
        }
        match bincode::deserialize(bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!("discarding unreadable snapshot: {}", e);
                None
            }
        }
    }
}

pub trait SnapshotStore: Send + Sync + Debug {
    /// The last saved snapshot, if there is a usable one
    fn load(&self) -> Result<Option<Snapshot>, SnapshotError>;

    fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError>;
}

/// Keeps the encoded snapshot in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    inner: Arc<RwLock<Option<Vec<u8>>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored bytes; lets tests simulate corruption
    pub fn put_raw(&self, bytes: Vec<u8>) {
        *self.inner.write() = Some(bytes);
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>, SnapshotError> {
        Ok(self.inner.read().as_deref().and_then(Snapshot::from_bytes))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let bytes = snapshot.to_bytes()?;
        *self.inner.write() = Some(bytes);
        Ok(())
    }
}

/// Keeps the encoded snapshot in a single file.
///
/// Saves go through a sibling temporary file and a rename, so a crash
///  mid-save leaves the previous snapshot in place.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>, SnapshotError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        Ok(Snapshot::from_bytes(&bytes))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let bytes = snapshot.to_bytes()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!("snapshot saved to {}", self.path.display());
        Ok(())
    }
}
