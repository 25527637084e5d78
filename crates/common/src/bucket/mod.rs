//! The hierarchical namespace of facts.
//!
//! A [`Bucket`] is a node in a tree keyed by path segment. Each bucket
//!  holds its own access list, its children, and one
//!  [`BucketDataItem`] per datum ever proposed or dismissed in it.
//!
//! ```text
//! (root)
//!   ├── peer        allowed: anyone
//!   ├── trusted     allowed: trusted, admin
//!   ├── admin       allowed: admin
//!   └── pri
//!        └── <identity>
//!             └── addresses   (created on first reference)
//! ```
//!
//! Access lists apply to writes to exactly that bucket; children
//!  created on demand are unrestricted.

mod item;

pub use item::BucketDataItem;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::clock::Timestamp;
use crate::validity::Validity;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BucketError {
    /// The path does not exist and we were asked not to create it
    #[error("could not resolve bucket \"{address}\": no child named {missing:?}")]
    NoSuchBucket { address: Address, missing: String },
    /// None of the endorsers is on the bucket's access list
    #[error("write rejected: allowed = {allowed:?}; endorsers = {endorsers:?}")]
    AccessDenied {
        allowed: Vec<String>,
        endorsers: Vec<String>,
    },
}

/// What a hook gets told about a propose or dismiss
#[derive(Debug, Clone)]
pub struct HookEvent {
    pub datum: String,
    pub validity: Validity,
    pub endorsers: BTreeSet<String>,
    pub channel: String,
}

pub type Hook = Arc<dyn Fn(&HookEvent) + Send + Sync>;

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Bucket {
    children: BTreeMap<String, Bucket>,
    /// Empty means anyone may write
    allowed: BTreeSet<String>,
    data: BTreeMap<String, BucketDataItem>,
    #[serde(skip)]
    hooks_proposed: Vec<Hook>,
    #[serde(skip)]
    hooks_dismissed: Vec<Hook>,
}

impl Bucket {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// A bucket anyone may write to
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn allowed(&self) -> &BTreeSet<String> {
        &self.allowed
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &Bucket)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn data(&self) -> &BTreeMap<String, BucketDataItem> {
        &self.data
    }

    pub fn item(&self, datum: &str) -> Option<&BucketDataItem> {
        self.data.get(datum)
    }

    pub fn item_mut(&mut self, datum: &str) -> Option<&mut BucketDataItem> {
        self.data.get_mut(datum)
    }

    /// Navigate to a descendant without creating anything
    pub fn get_bucket(&self, address: &Address) -> Result<&Bucket, BucketError> {
        let mut bucket = self;
        for segment in address.segments() {
            bucket = bucket
                .children
                .get(segment)
                .ok_or_else(|| BucketError::NoSuchBucket {
                    address: address.clone(),
                    missing: segment.clone(),
                })?;
        }
        Ok(bucket)
    }

    /// Navigate to a descendant. Missing segments are created as
    ///  unrestricted buckets when `create_if_not_exists` is set,
    ///  otherwise they are an error.
    pub fn get_bucket_mut(
        &mut self,
        address: &Address,
        create_if_not_exists: bool,
    ) -> Result<&mut Bucket, BucketError> {
        if create_if_not_exists {
            return Ok(self.get_or_create(address));
        }
        let mut bucket = self;
        for segment in address.segments() {
            bucket = bucket
                .children
                .get_mut(segment)
                .ok_or_else(|| BucketError::NoSuchBucket {
                    address: address.clone(),
                    missing: segment.clone(),
                })?;
        }
        Ok(bucket)
    }

    /// Navigate to a descendant, creating unrestricted buckets along the way
    pub fn get_or_create(&mut self, address: &Address) -> &mut Bucket {
        let mut bucket = self;
        for segment in address.segments() {
            bucket = bucket.children.entry(segment.clone()).or_default();
        }
        bucket
    }

    /// Install a child with a fixed access list. If the child already
    ///  exists (e.g. restored from a snapshot) only its access list is
    ///  replaced; its data and descendants are kept.
    pub fn add_child_bucket<I, S>(&mut self, name: impl Into<String>, allowed: I) -> &mut Bucket
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: BTreeSet<String> = allowed.into_iter().map(Into::into).collect();
        let child = self.children.entry(name.into()).or_default();
        child.allowed = allowed;
        child
    }

    pub fn set_allowed<I, S>(&mut self, allowed: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = allowed.into_iter().map(Into::into).collect();
    }

    pub fn is_allowed(&self, endorsers: &BTreeSet<String>) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|a| endorsers.contains(a))
    }

    fn check_allowed(&self, endorsers: &BTreeSet<String>) -> Result<(), BucketError> {
        if self.is_allowed(endorsers) {
            return Ok(());
        }
        Err(BucketError::AccessDenied {
            allowed: self.allowed.iter().cloned().collect(),
            endorsers: endorsers.iter().cloned().collect(),
        })
    }

    /// Assert `datum` during `validity`.
    ///
    /// Returns whether this was the first time the datum was seen in
    ///  this bucket; only then do the "proposed" hooks run.
    pub fn propose(
        &mut self,
        datum: &str,
        validity: Validity,
        endorsers: &BTreeSet<String>,
        channel: &str,
        now: Timestamp,
    ) -> Result<bool, BucketError> {
        self.check_allowed(endorsers)?;

        // must be checked before the entry below creates the item
        let first_sight = !self.data.contains_key(datum);

        self.data.entry(datum.to_string()).or_default().propose(
            validity,
            endorsers.iter().cloned(),
            channel,
            now,
        );

        if first_sight {
            let event = HookEvent {
                datum: datum.to_string(),
                validity,
                endorsers: endorsers.clone(),
                channel: channel.to_string(),
            };
            for hook in &self.hooks_proposed {
                hook(&event);
            }
        }
        Ok(first_sight)
    }

    /// Assert `datum` does not hold during `validity`.
    ///  "Dismissed" hooks run on every accepted dismiss.
    pub fn dismiss(
        &mut self,
        datum: &str,
        validity: Validity,
        endorsers: &BTreeSet<String>,
        channel: &str,
        now: Timestamp,
    ) -> Result<(), BucketError> {
        self.check_allowed(endorsers)?;

        self.data.entry(datum.to_string()).or_default().dismiss(
            validity,
            endorsers.iter().cloned(),
            channel,
            now,
        );

        let event = HookEvent {
            datum: datum.to_string(),
            validity,
            endorsers: endorsers.clone(),
            channel: channel.to_string(),
        };
        for hook in &self.hooks_dismissed {
            hook(&event);
        }
        Ok(())
    }

    /// Data valid at `at`, in datum order
    pub fn query(&self, at: Timestamp) -> Vec<String> {
        self.data
            .iter()
            .filter(|(_, item)| item.valid(at))
            .map(|(datum, _)| datum.clone())
            .collect()
    }

    /// Expire windows in every item of this bucket (not its children)
    ///  and forget items left with no windows. Returns the number of
    ///  items forgotten.
    pub fn cleanup(&mut self, now: Timestamp) -> usize {
        let before = self.data.len();
        self.data.retain(|_, item| {
            item.cleanup(now);
            !item.is_empty()
        });
        before - self.data.len()
    }

    /// Every descendant bucket (not `self`), depth first, with its
    ///  address relative to `self`. Each call walks the current tree.
    pub fn items(&self) -> BucketIter<'_> {
        BucketIter::new(self)
    }

    /// Visit every descendant mutably, depth first
    pub fn walk_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&Address, &mut Bucket),
    {
        self.walk_mut_at(&Address::root(), f);
    }

    fn walk_mut_at<F>(&mut self, prefix: &Address, f: &mut F)
    where
        F: FnMut(&Address, &mut Bucket),
    {
        for (name, child) in self.children.iter_mut() {
            let address = prefix.child(name.clone());
            f(&address, child);
            child.walk_mut_at(&address, f);
        }
    }

    pub fn add_hook_proposed<F>(&mut self, hook: F)
    where
        F: Fn(&HookEvent) + Send + Sync + 'static,
    {
        self.hooks_proposed.push(Arc::new(hook));
    }

    pub fn add_hook_dismissed<F>(&mut self, hook: F)
    where
        F: Fn(&HookEvent) + Send + Sync + 'static,
    {
        self.hooks_dismissed.push(Arc::new(hook));
    }

    /// Indented dump of this bucket and its children
    pub fn summary(&self, now: Timestamp) -> String {
        let mut out = String::new();
        self.write_summary(&mut out, 0, now);
        out
    }

    fn write_summary(&self, out: &mut String, depth: usize, now: Timestamp) {
        let pad = "  ".repeat(depth);
        let mut tombstoned = 0;
        for (datum, item) in &self.data {
            if item.is_tombstoned(now) {
                tombstoned += 1;
                continue;
            }
            out.push_str(&format!("{}{:?}\n", pad, datum));
            for line in item.summary(now).lines() {
                out.push_str(&format!("{}    {}\n", pad, line));
            }
        }
        if tombstoned > 0 {
            out.push_str(&format!("{}num tombstoned: {}\n", pad, tombstoned));
        }
        for (name, child) in &self.children {
            out.push_str(&format!("{}{}/\n", pad, name));
            child.write_summary(out, depth + 1, now);
        }
    }
}

impl fmt::Debug for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("children", &self.children)
            .field("allowed", &self.allowed)
            .field("data", &self.data)
            .field("hooks_proposed", &self.hooks_proposed.len())
            .field("hooks_dismissed", &self.hooks_dismissed.len())
            .finish()
    }
}

/// Depth-first walk over a bucket's descendants
pub struct BucketIter<'a> {
    stack: Vec<(Address, &'a Bucket)>,
}

impl<'a> BucketIter<'a> {
    fn new(bucket: &'a Bucket) -> Self {
        let mut iter = Self { stack: Vec::new() };
        iter.push_children(&Address::root(), bucket);
        iter
    }

    fn push_children(&mut self, prefix: &Address, bucket: &'a Bucket) {
        // reversed so that children come out in name order
        for (name, child) in bucket.children.iter().rev() {
            self.stack.push((prefix.child(name.clone()), child));
        }
    }
}

impl<'a> Iterator for BucketIter<'a> {
    type Item = (Address, &'a Bucket);

    fn next(&mut self) -> Option<Self::Item> {
        let (address, bucket) = self.stack.pop()?;
        self.push_children(&address, bucket);
        Some((address, bucket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn who(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn test_get_bucket_create_or_fail() {
        let mut root = Bucket::unrestricted();
        assert!(matches!(
            root.get_bucket(&addr("pri/QmAlice")),
            Err(BucketError::NoSuchBucket { .. })
        ));
        assert!(root.get_bucket_mut(&addr("pri/QmAlice"), false).is_err());

        root.get_bucket_mut(&addr("pri/QmAlice/addresses"), true)
            .unwrap();
        root.get_or_create(&addr("pri/QmBob"));
        assert!(root.get_bucket(&addr("pri/QmBob")).is_ok());
        assert!(root.get_bucket(&addr("pri/QmAlice")).is_ok());
        assert!(root.get_bucket(&addr("pri/QmAlice/addresses")).is_ok());
        assert!(root.get_bucket(&Address::root()).is_ok());
        // auto-created buckets are unrestricted
        assert!(root
            .get_bucket(&addr("pri"))
            .unwrap()
            .allowed()
            .is_empty());
    }

    #[test]
    fn test_access_control() {
        let mut root = Bucket::unrestricted();
        root.add_child_bucket("trusted", ["trusted"]);
        let bucket = root.get_bucket_mut(&addr("trusted"), false).unwrap();

        let rejected = bucket.propose("QmBob", Validity::always(), &who(&["peer1"]), "chan", 0.0);
        assert!(matches!(rejected, Err(BucketError::AccessDenied { .. })));
        assert!(bucket.data().is_empty());

        let accepted = bucket.propose("QmBob", Validity::always(), &who(&["trusted"]), "chan", 0.0);
        assert_eq!(accepted, Ok(true));

        let rejected = bucket.dismiss("QmBob", Validity::always(), &who(&[]), "chan", 0.0);
        assert!(rejected.is_err());
        assert_eq!(bucket.query(1.0), vec!["QmBob".to_string()]);
    }

    #[test]
    fn test_access_list_not_inherited() {
        let mut root = Bucket::unrestricted();
        root.add_child_bucket("admin", ["admin"]);
        let child = root.get_bucket_mut(&addr("admin/notes"), true).unwrap();
        assert!(child
            .propose("x", Validity::always(), &who(&[]), "chan", 0.0)
            .is_ok());
    }

    #[test]
    fn test_add_child_bucket_keeps_contents() {
        let mut root = Bucket::unrestricted();
        root.get_bucket_mut(&addr("peer"), true)
            .unwrap()
            .propose("QmAlice", Validity::always(), &who(&[]), "chan", 0.0)
            .unwrap();
        root.add_child_bucket("peer", ["admin"]);
        let peer = root.get_bucket(&addr("peer")).unwrap();
        assert_eq!(peer.query(0.0), vec!["QmAlice".to_string()]);
        assert!(peer.allowed().contains("admin"));
    }

    #[test]
    fn test_hooks_first_sight_vs_every_dismiss() {
        let proposed = Arc::new(AtomicUsize::new(0));
        let dismissed = Arc::new(AtomicUsize::new(0));

        let mut bucket = Bucket::unrestricted();
        let p = proposed.clone();
        bucket.add_hook_proposed(move |_| {
            p.fetch_add(1, Ordering::SeqCst);
        });
        let d = dismissed.clone();
        bucket.add_hook_dismissed(move |event| {
            assert_eq!(event.datum, "QmAlice");
            d.fetch_add(1, Ordering::SeqCst);
        });

        let window = Validity::between(0, 100);
        assert_eq!(bucket.propose("QmAlice", window, &who(&["a"]), "c", 0.0), Ok(true));
        assert_eq!(bucket.propose("QmAlice", window, &who(&["a"]), "c", 1.0), Ok(false));
        bucket.dismiss("QmAlice", window, &who(&["b"]), "c", 2.0).unwrap();
        bucket.dismiss("QmAlice", window, &who(&["b"]), "c", 3.0).unwrap();

        assert_eq!(proposed.load(Ordering::SeqCst), 1);
        assert_eq!(dismissed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cleanup_forgets_items() {
        let proposed = Arc::new(AtomicUsize::new(0));
        let mut bucket = Bucket::unrestricted();
        let p = proposed.clone();
        bucket.add_hook_proposed(move |_| {
            p.fetch_add(1, Ordering::SeqCst);
        });

        bucket
            .propose("QmAlice", Validity::between(0, 10), &who(&[]), "c", 0.0)
            .unwrap();
        bucket
            .propose("QmBob", Validity::always(), &who(&[]), "c", 0.0)
            .unwrap();
        assert_eq!(bucket.cleanup(5.0), 0);
        assert_eq!(bucket.cleanup(11.0), 1);
        assert_eq!(bucket.query(11.0), vec!["QmBob".to_string()]);
        assert!(bucket.item("QmAlice").is_none());

        // forgotten data is new again
        bucket
            .propose("QmAlice", Validity::between(20, 30), &who(&[]), "c", 20.0)
            .unwrap();
        assert_eq!(proposed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_items_depth_first() {
        let mut root = Bucket::unrestricted();
        for path in ["peer", "pri/b/addresses", "pri/a", "admin"] {
            root.get_bucket_mut(&addr(path), true).unwrap();
        }
        let walked: Vec<String> = root.items().map(|(a, _)| a.to_string()).collect();
        assert_eq!(
            walked,
            vec!["admin", "peer", "pri", "pri/a", "pri/b", "pri/b/addresses"]
        );
        // restartable
        assert_eq!(root.items().count(), 6);

        let mut visited = Vec::new();
        root.walk_mut(&mut |address, _| visited.push(address.to_string()));
        assert_eq!(visited, walked);
    }
}
