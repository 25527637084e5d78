use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::wire::content_hash;

/// Who signed which literal wire message.
///
/// Keyed by the content hash of the exact message string, not of
///  the logical fact: the same fact sent with two different windows
///  is two messages and collects signatures independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureLedger {
    /// data hash -> signer -> signature
    entries: BTreeMap<String, BTreeMap<String, String>>,
}

impl SignatureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signature. A later signature from the same signer
    ///  over the same hash replaces the earlier one.
    pub fn add(
        &mut self,
        data_hash: impl Into<String>,
        signer: impl Into<String>,
        signature: impl Into<String>,
    ) {
        self.entries
            .entry(data_hash.into())
            .or_default()
            .insert(signer.into(), signature.into());
    }

    /// Identities that signed the message with this hash
    pub fn signers(&self, data_hash: &str) -> BTreeSet<String> {
        self.entries
            .get(data_hash)
            .map(|signers| signers.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Identities that signed this literal wire message
    pub fn signers_of(&self, wire: &str) -> BTreeSet<String> {
        self.signers(&content_hash(wire))
    }

    /// (signer, signature) pairs for the message with this hash
    pub fn signatures(&self, data_hash: &str) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .get(data_hash)
            .into_iter()
            .flat_map(|signers| signers.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Number of distinct messages with at least one signature
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
