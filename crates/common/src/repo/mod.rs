//! The replicated repository: one bucket tree, the signature ledger
//!  and per-channel traffic counters, driven by inbound wire messages.
//!
//! A node feeds every inbound message to [`DistributedRepo::process`]
//!  and, on a timer, calls [`DistributedRepo::cleanup`] and
//!  [`DistributedRepo::rebroadcast`] and hands the returned envelopes
//!  to its transport. Merging is idempotent, so duplicated or
//!  reordered deliveries are harmless.

mod rebroadcast;
mod summary;

pub use rebroadcast::RebroadcastOptions;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::bucket::{Bucket, BucketError, HookEvent};
use crate::clock::{Clock, SystemClock, Timestamp};
use crate::signatures::SignatureLedger;
use crate::snapshot::{Snapshot, SnapshotError, SnapshotStore};
use crate::stats::ChannelStats;
use crate::wire::{JsonCodec, WireCodec, WireError, WireMessage};

/// Role names with a bucket of the same name at the top level
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_TRUSTED: &str = "trusted";
pub const ROLE_PEER: &str = "peer";
/// Role of a signer that is in none of the role buckets
pub const ROLE_UNKNOWN: &str = "unknown";

/// Top-level buckets and who may write to them. An empty list
///  means anyone.
pub const DEFAULT_SCHEMA: &[(&str, &[&str])] = &[
    ("networks", &[]),
    ("peer", &[]),
    ("trusted", &[ROLE_TRUSTED, ROLE_ADMIN]),
    ("admin", &[ROLE_ADMIN]),
    ("files", &[]),
    ("verified", &[]),
    ("safe", &[]),
    ("pri", &[]),
];

/// How the endorsers of a propose / dismiss are determined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// The identities that signed the literal message. Bucket access
    ///  lists are then matched against identities.
    #[default]
    RawSigners,
    /// The roles (`admin`, `trusted`, `peer`, or `unknown`) those
    ///  signers currently hold. Bucket access lists are then matched
    ///  against role names.
    ResolvedRoles,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("{source}\n\n  {message}\n")]
    CouldNotInterpret {
        message: String,
        #[source]
        source: WireError,
    },
    #[error("could not process message of kind \"{kind}\"\n\n  {message}\n")]
    UnknownKind { kind: &'static str, message: String },
    #[error("could not apply message: {source}\n\n  {message}\n")]
    Bucket {
        message: String,
        #[source]
        source: BucketError,
    },
}

impl ProcessError {
    /// The raw wire message that failed
    pub fn message(&self) -> &str {
        match self {
            ProcessError::CouldNotInterpret { message, .. }
            | ProcessError::UnknownKind { message, .. }
            | ProcessError::Bucket { message, .. } => message,
        }
    }
}

/// What an accepted message did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    Proposed {
        address: Address,
        datum: String,
        /// The datum had never been seen in this bucket (or had been
        ///  garbage collected since)
        first_sight: bool,
    },
    Dismissed {
        address: Address,
        datum: String,
    },
    Signed {
        data_hash: String,
        signer: String,
    },
    Ping,
    Pong,
}

#[derive(Debug)]
pub struct DistributedRepo<C: WireCodec = JsonCodec> {
    root: Bucket,
    signatures: SignatureLedger,
    channels: BTreeMap<String, ChannelStats>,
    codec: C,
    clock: Arc<dyn Clock>,
    access_mode: AccessMode,
}

impl DistributedRepo<JsonCodec> {
    /// JSON wire format and the system clock
    pub fn new() -> Self {
        Self::with_codec(JsonCodec, Arc::new(SystemClock))
    }
}

impl Default for DistributedRepo<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: WireCodec> DistributedRepo<C> {
    pub fn with_codec(codec: C, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: Bucket::unrestricted(),
            signatures: SignatureLedger::new(),
            channels: BTreeMap::new(),
            codec,
            clock,
            access_mode: AccessMode::default(),
        }
    }

    pub fn with_access_mode(mut self, access_mode: AccessMode) -> Self {
        self.access_mode = access_mode;
        self
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    pub fn root(&self) -> &Bucket {
        &self.root
    }

    pub fn signatures(&self) -> &SignatureLedger {
        &self.signatures
    }

    pub fn channels(&self) -> &BTreeMap<String, ChannelStats> {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelStats> {
        self.channels.get(name)
    }

    /// Count a message sent on `channel` outside of [`Self::rebroadcast`]
    pub fn note_sent(&mut self, channel: &str) {
        let now = self.clock.now();
        self.channels
            .entry(channel.to_string())
            .or_default()
            .just_sent(now);
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Encode a message with this repo's codec
    pub fn encode(&self, message: &WireMessage) -> Result<String, WireError> {
        self.codec.encode(message)
    }

    /// Install a bucket with a fixed access list, creating its parents
    ///  if needed. Installing over an existing bucket only replaces its
    ///  access list. The root itself can be given an access list too.
    pub fn init_bucket<I, S>(&mut self, address: &Address, allowed: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match address.split_last() {
            Some((parent, name)) => {
                self.root.get_or_create(&parent).add_child_bucket(name, allowed);
            }
            None => self.root.set_allowed(allowed),
        }
        tracing::debug!("initialized bucket {}", address);
    }

    /// Install [`DEFAULT_SCHEMA`]
    pub fn init_default_schema(&mut self) {
        for (name, allowed) in DEFAULT_SCHEMA {
            self.root.add_child_bucket(*name, allowed.iter().copied());
        }
        tracing::info!("installed {} top-level buckets", DEFAULT_SCHEMA.len());
    }

    /// Handle one inbound wire message received on `from_channel`.
    ///
    /// `at` is the time used to resolve signer roles (defaults to now);
    ///  it does not affect expiry. On error the message is dropped and
    ///  the bucket tree and signature ledger are left untouched; the
    ///  channel's receive counter still records the message.
    pub fn process(
        &mut self,
        wire: &str,
        from_channel: &str,
        at: Option<Timestamp>,
    ) -> Result<Processed, ProcessError> {
        let now = self.clock.now();
        let at = at.unwrap_or(now);

        self.channels
            .entry(from_channel.to_string())
            .or_default()
            .just_received(now);

        let message = self
            .codec
            .decode(wire)
            .map_err(|source| ProcessError::CouldNotInterpret {
                message: wire.to_string(),
                source,
            })?;

        match message {
            WireMessage::Propose(claim) => {
                let endorsers = self.endorsers(wire, at);
                let bucket = self.root.get_or_create(&claim.address);
                let first_sight = bucket
                    .propose(&claim.datum, claim.validity, &endorsers, from_channel, now)
                    .map_err(|source| ProcessError::Bucket {
                        message: wire.to_string(),
                        source,
                    })?;
                if first_sight {
                    tracing::info!(
                        bucket = %claim.address,
                        datum = %claim.datum,
                        channel = from_channel,
                        "new datum proposed"
                    );
                } else {
                    tracing::debug!(
                        bucket = %claim.address,
                        datum = %claim.datum,
                        channel = from_channel,
                        "merged proposal"
                    );
                }
                Ok(Processed::Proposed {
                    address: claim.address,
                    datum: claim.datum,
                    first_sight,
                })
            }
            WireMessage::Dismiss(claim) => {
                let endorsers = self.endorsers(wire, at);
                let bucket = self.root.get_or_create(&claim.address);
                bucket
                    .dismiss(&claim.datum, claim.validity, &endorsers, from_channel, now)
                    .map_err(|source| ProcessError::Bucket {
                        message: wire.to_string(),
                        source,
                    })?;
                tracing::debug!(
                    bucket = %claim.address,
                    datum = %claim.datum,
                    channel = from_channel,
                    "merged dismissal"
                );
                Ok(Processed::Dismissed {
                    address: claim.address,
                    datum: claim.datum,
                })
            }
            WireMessage::Signed(signed) => {
                // verification is the transport's job
                self.signatures
                    .add(signed.data_hash.clone(), signed.signer.clone(), signed.signature);
                tracing::debug!(
                    data_hash = %signed.data_hash,
                    signer = %signed.signer,
                    "recorded signature"
                );
                Ok(Processed::Signed {
                    data_hash: signed.data_hash,
                    signer: signed.signer,
                })
            }
            WireMessage::Ping => {
                tracing::info!("ping {}", from_channel);
                Ok(Processed::Ping)
            }
            WireMessage::Pong => {
                tracing::info!("pong {}", from_channel);
                Ok(Processed::Pong)
            }
            unknown => Err(ProcessError::UnknownKind {
                kind: unknown.kind(),
                message: wire.to_string(),
            }),
        }
    }

    /// Data valid at `at` (default: now) in an existing bucket
    pub fn query(&self, address: &Address, at: Option<Timestamp>) -> Result<Vec<String>, BucketError> {
        let at = at.unwrap_or_else(|| self.clock.now());
        Ok(self.root.get_bucket(address)?.query(at))
    }

    /// Garbage collect expired windows everywhere in the tree.
    ///  Returns the number of items forgotten.
    pub fn cleanup(&mut self) -> usize {
        let now = self.clock.now();
        let mut forgotten = self.root.cleanup(now);
        self.root.walk_mut(&mut |address, bucket| {
            let n = bucket.cleanup(now);
            if n > 0 {
                tracing::debug!(bucket = %address, forgotten = n, "cleaned up bucket");
            }
            forgotten += n;
        });
        forgotten
    }

    /// Who endorses this literal message, according to the access mode
    fn endorsers(&self, wire: &str, at: Timestamp) -> BTreeSet<String> {
        match self.access_mode {
            AccessMode::RawSigners => self.signatures.signers_of(wire),
            AccessMode::ResolvedRoles => self.roles_endorsing(wire, at),
        }
    }

    /// Roles `signer` holds at `at`: membership of the `admin`,
    ///  `trusted` and `peer` buckets, or just `unknown`
    pub fn roles_for(&self, signer: &str, at: Option<Timestamp>) -> BTreeSet<String> {
        let at = at.unwrap_or_else(|| self.clock.now());
        let mut roles: BTreeSet<String> = [ROLE_ADMIN, ROLE_TRUSTED, ROLE_PEER]
            .into_iter()
            .filter(|role| {
                self.root
                    .get_bucket(&Address::root().child(*role))
                    .map(|bucket| bucket.item(signer).is_some_and(|item| item.valid(at)))
                    .unwrap_or(false)
            })
            .map(str::to_string)
            .collect();
        if roles.is_empty() {
            roles.insert(ROLE_UNKNOWN.to_string());
        }
        roles
    }

    /// Union of the roles of everyone who signed this literal message
    pub fn roles_endorsing(&self, wire: &str, at: Timestamp) -> BTreeSet<String> {
        let mut roles = BTreeSet::new();
        for signer in self.signatures.signers_of(wire) {
            roles.extend(self.roles_for(&signer, Some(at)));
        }
        if roles.is_empty() {
            roles.insert(ROLE_UNKNOWN.to_string());
        }
        roles
    }

    /// Run `hook` the first time a datum is proposed in `address`
    pub fn add_hook_proposed<F>(&mut self, address: &Address, hook: F) -> Result<(), BucketError>
    where
        F: Fn(&HookEvent) + Send + Sync + 'static,
    {
        self.root.get_bucket_mut(address, false)?.add_hook_proposed(hook);
        Ok(())
    }

    /// Run `hook` on every dismiss accepted in `address`
    pub fn add_hook_dismissed<F>(&mut self, address: &Address, hook: F) -> Result<(), BucketError>
    where
        F: Fn(&HookEvent) + Send + Sync + 'static,
    {
        self.root.get_bucket_mut(address, false)?.add_hook_dismissed(hook);
        Ok(())
    }

    /// Install a first-sight hook on every bucket that exists now.
    ///  The hook is told which bucket fired.
    pub fn add_hook_proposed_all<F>(&mut self, hook: F)
    where
        F: Fn(&Address, &HookEvent) + Send + Sync + 'static,
    {
        let hook = Arc::new(hook);
        self.root.walk_mut(&mut |address, bucket| {
            let hook = hook.clone();
            let address = address.clone();
            bucket.add_hook_proposed(move |event| hook(&address, event));
        });
    }

    /// Copy of the persistent state
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.root.clone(), self.signatures.clone())
    }

    /// Replace the bucket tree and ledger with a snapshot's. Hooks
    ///  installed so far are lost; install them afterwards.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.root = snapshot.root;
        self.signatures = snapshot.signatures;
    }

    /// Restore from `store` if it holds a usable snapshot.
    ///  Returns whether anything was restored.
    pub fn load_from(&mut self, store: &dyn SnapshotStore) -> Result<bool, SnapshotError> {
        match store.load()? {
            Some(snapshot) => {
                self.restore(snapshot);
                tracing::info!(
                    buckets = self.root.items().count(),
                    signatures = self.signatures.len(),
                    "restored snapshot"
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn save_to(&self, store: &dyn SnapshotStore) -> Result<(), SnapshotError> {
        store.save(&self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::validity::Validity;
    use crate::wire::content_hash;

    const T: Timestamp = 1_700_000_000.0;

    fn repo() -> (DistributedRepo, ManualClock) {
        let clock = ManualClock::new(T);
        let mut repo = DistributedRepo::with_codec(JsonCodec, Arc::new(clock.clone()));
        repo.init_default_schema();
        (repo, clock)
    }

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn propose(repo: &DistributedRepo, bucket: &str, datum: &str, validity: Validity) -> String {
        repo.encode(&WireMessage::propose(addr(bucket), datum, validity))
            .unwrap()
    }

    #[test]
    fn test_process_propose_and_query() {
        let (mut repo, _) = repo();
        let wire = propose(&repo, "peer", "QmAlice", Validity::between(T as i64, T as i64 + 300));
        let processed = repo.process(&wire, "chanA", None).unwrap();
        assert_eq!(
            processed,
            Processed::Proposed {
                address: addr("peer"),
                datum: "QmAlice".to_string(),
                first_sight: true
            }
        );
        assert_eq!(repo.query(&addr("peer"), None).unwrap(), vec!["QmAlice"]);
        assert_eq!(repo.channel("chanA").unwrap().num_received, 1);
    }

    #[test]
    fn test_process_creates_missing_buckets() {
        let (mut repo, _) = repo();
        let wire = propose(&repo, "pri/QmAlice/addresses", "/ip4/10.0.0.1", Validity::always());
        repo.process(&wire, "chanA", None).unwrap();
        assert_eq!(
            repo.query(&addr("pri/QmAlice/addresses"), None).unwrap(),
            vec!["/ip4/10.0.0.1"]
        );
        assert!(matches!(
            repo.query(&addr("pri/QmBob"), None),
            Err(BucketError::NoSuchBucket { .. })
        ));
    }

    #[test]
    fn test_idempotent_process() {
        let (mut repo, clock) = repo();
        let wire = propose(&repo, "files", "QmFile", Validity::always());
        let signature = repo
            .encode(&WireMessage::signed(content_hash(&wire), "QmAlice", "sig"))
            .unwrap();
        repo.process(&signature, "chanA", None).unwrap();

        repo.process(&wire, "chanA", None).unwrap();
        let once = repo.root().get_bucket(&addr("files")).unwrap().item("QmFile").unwrap().proposals().clone();
        clock.advance(10.0);
        let again = repo.process(&wire, "chanA", None).unwrap();
        let twice = repo.root().get_bucket(&addr("files")).unwrap().item("QmFile").unwrap().proposals().clone();

        assert!(matches!(again, Processed::Proposed { first_sight: false, .. }));
        assert_eq!(once, twice);
        assert_eq!(repo.query(&addr("files"), None).unwrap(), vec!["QmFile"]);
        let item = repo.root().get_bucket(&addr("files")).unwrap().item("QmFile").unwrap();
        assert_eq!(item.last_broadcast("chanA"), T + 10.0);
    }

    #[test]
    fn test_signed_message_endorses() {
        let (mut repo, _) = repo();
        let wire = propose(&repo, "admin", "QmAdmin", Validity::always());

        // unsigned: the admin bucket only accepts the "admin" identity
        let err = repo.process(&wire, "chanA", None).unwrap_err();
        assert!(matches!(err, ProcessError::Bucket { source: BucketError::AccessDenied { .. }, .. }));
        assert_eq!(err.message(), wire);
        assert!(repo.root().get_bucket(&addr("admin")).unwrap().data().is_empty());

        let signature = repo
            .encode(&WireMessage::signed(content_hash(&wire), "admin", "sig"))
            .unwrap();
        assert!(matches!(
            repo.process(&signature, "chanA", None).unwrap(),
            Processed::Signed { .. }
        ));
        repo.process(&wire, "chanA", None).unwrap();
        assert_eq!(repo.query(&addr("admin"), None).unwrap(), vec!["QmAdmin"]);
    }

    #[test]
    fn test_signatures_keyed_by_literal_message() {
        let (mut repo, _) = repo();
        let first = propose(&repo, "trusted", "QmBob", Validity::always());
        let second = propose(&repo, "trusted", "QmBob", Validity::since(0));
        let signature = repo
            .encode(&WireMessage::signed(content_hash(&first), "trusted", "sig"))
            .unwrap();
        repo.process(&signature, "chanA", None).unwrap();

        assert!(repo.process(&first, "chanA", None).is_ok());
        assert!(repo.process(&second, "chanA", None).is_err());
        assert_eq!(repo.signatures().len(), 1);
    }

    #[test]
    fn test_bad_messages_leave_state_alone() {
        let (mut repo, _) = repo();
        let before = repo.snapshot();

        let err = repo.process("not a message", "chanA", None).unwrap_err();
        assert!(matches!(err, ProcessError::CouldNotInterpret { .. }));
        assert!(err.to_string().contains("not a message"));
        assert_eq!(err.to_string().matches("could not interpret").count(), 1);

        let err = repo
            .process(r#"{"mtype":"ask-summary"}"#, "chanA", None)
            .unwrap_err();
        assert!(matches!(err, ProcessError::UnknownKind { .. }));

        let after = repo.snapshot();
        assert_eq!(before.root.items().count(), after.root.items().count());
        assert!(after.signatures.is_empty());
        assert_eq!(repo.channel("chanA").unwrap().num_received, 2);
    }

    #[test]
    fn test_ping_pong() {
        let (mut repo, _) = repo();
        assert_eq!(repo.process(r#"{"mtype":"ping"}"#, "c", None).unwrap(), Processed::Ping);
        assert_eq!(repo.process(r#"{"mtype":"pong"}"#, "c", None).unwrap(), Processed::Pong);
    }

    #[test]
    fn test_cleanup_end_to_end() {
        let clock = ManualClock::new(T);
        let mut repo = DistributedRepo::with_codec(JsonCodec, Arc::new(clock.clone()));
        repo.init_bucket(&addr("peer"), Vec::<String>::new());

        let wire = propose(&repo, "peer", "QmAlice", Validity::between(T as i64, T as i64 + 300));
        repo.process(&wire, "chanA", None).unwrap();
        assert_eq!(repo.query(&addr("peer"), None).unwrap(), vec!["QmAlice"]);

        clock.set(T + 301.0);
        // expired but not yet collected: already invisible
        assert!(repo.query(&addr("peer"), None).unwrap().is_empty());
        assert_eq!(repo.cleanup(), 1);
        assert!(repo.query(&addr("peer"), None).unwrap().is_empty());
        assert!(repo.root().get_bucket(&addr("peer")).unwrap().data().is_empty());
    }

    #[test]
    fn test_roles() {
        let (mut repo, _) = repo();
        assert_eq!(
            repo.roles_for("QmAlice", None),
            BTreeSet::from([ROLE_UNKNOWN.to_string()])
        );

        let wire = propose(&repo, "peer", "QmAlice", Validity::always());
        repo.process(&wire, "c", None).unwrap();
        assert_eq!(
            repo.roles_for("QmAlice", None),
            BTreeSet::from([ROLE_PEER.to_string()])
        );

        // roles resolved for everyone who signed a message
        let other = propose(&repo, "files", "QmFile", Validity::always());
        for signer in ["QmAlice", "QmNobody"] {
            let s = repo
                .encode(&WireMessage::signed(content_hash(&other), signer, "sig"))
                .unwrap();
            repo.process(&s, "c", None).unwrap();
        }
        assert_eq!(
            repo.roles_endorsing(&other, T),
            BTreeSet::from([ROLE_PEER.to_string(), ROLE_UNKNOWN.to_string()])
        );
    }

    #[test]
    fn test_resolved_roles_access_mode() {
        let clock = ManualClock::new(T);
        let mut repo = DistributedRepo::with_codec(JsonCodec, Arc::new(clock))
            .with_access_mode(AccessMode::ResolvedRoles);
        repo.init_default_schema();

        // nobody holds a role yet; seed the first admin directly
        repo.root
            .get_or_create(&addr("admin"))
            .propose("QmRoot", Validity::always(), &BTreeSet::from([ROLE_ADMIN.to_string()]), "seed", T)
            .unwrap();

        let wire = propose(&repo, "trusted", "QmBob", Validity::always());
        assert!(repo.process(&wire, "c", None).is_err());

        let s = repo
            .encode(&WireMessage::signed(content_hash(&wire), "QmRoot", "sig"))
            .unwrap();
        repo.process(&s, "c", None).unwrap();
        repo.process(&wire, "c", None).unwrap();
        assert_eq!(repo.query(&addr("trusted"), None).unwrap(), vec!["QmBob"]);
    }

    #[test]
    fn test_hooks_via_repo() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (mut repo, _) = repo();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let s = seen.clone();
        repo.add_hook_proposed_all(move |address, event| {
            s.lock().push(format!("{}:{}", address, event.datum));
        });
        let dismissed = Arc::new(AtomicUsize::new(0));
        let d = dismissed.clone();
        repo.add_hook_dismissed(&addr("files"), move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert!(repo
            .add_hook_proposed(&addr("nope"), |_| {})
            .is_err());

        let wire = propose(&repo, "files", "QmFile", Validity::always());
        repo.process(&wire, "c", None).unwrap();
        repo.process(&wire, "c", None).unwrap();
        let wire = repo
            .encode(&WireMessage::dismiss(addr("files"), "QmFile", Validity::always()))
            .unwrap();
        repo.process(&wire, "c", None).unwrap();

        assert_eq!(*seen.lock(), vec!["files:QmFile".to_string()]);
        assert_eq!(dismissed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_snapshot_roundtrip_through_store() {
        let (mut repo, clock) = repo();
        let wire = propose(&repo, "peer", "QmAlice", Validity::always());
        repo.process(&wire, "c", None).unwrap();

        let store = crate::snapshot::MemorySnapshotStore::new();
        repo.save_to(&store).unwrap();

        let mut fresh = DistributedRepo::with_codec(JsonCodec, Arc::new(clock));
        assert!(fresh.load_from(&store).unwrap());
        fresh.init_default_schema();
        assert_eq!(fresh.query(&addr("peer"), None).unwrap(), vec!["QmAlice"]);
        assert_eq!(
            fresh.root().get_bucket(&addr("admin")).unwrap().allowed().len(),
            1
        );
    }
}
