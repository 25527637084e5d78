use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::DistributedRepo;
use crate::address::Address;
use crate::bucket::Bucket;
use crate::clock::Timestamp;
use crate::validity::Validity;
use crate::wire::{content_hash, WireCodec, WireMessage};

/// Offset that sorts a signature just before the message it signs
const SIGNATURE_LEAD: Timestamp = 0.1;

struct Entry {
    start: Timestamp,
    /// signatures before claims at the same instant
    rank: u8,
    message: String,
}

impl<C: WireCodec> DistributedRepo<C> {
    /// Human-readable dump of the bucket tree and channel activity,
    ///  busiest channels first
    pub fn summary(&self) -> String {
        let now = self.clock.now();
        let mut out = String::from("buckets:\n");
        for line in self.root.summary(now).lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }

        let mut channels: Vec<_> = self.channels.iter().collect();
        channels.sort_by(|(_, a), (_, b)| {
            b.last_received
                .partial_cmp(&a.last_received)
                .unwrap_or(Ordering::Equal)
        });
        out.push_str("activity:\n");
        for (channel, stats) in channels {
            out.push_str(&format!("  {:>10}: {}\n", stats.describe(now), channel));
        }
        out
    }

    /// Wire messages that let a fresh replica rebuild every live claim
    ///  held here, each preceded by the signature messages collected
    ///  for it. Ordered by window start, without duplicates.
    pub fn summary_messages(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut entries = Vec::new();
        for (address, bucket) in self.root.items() {
            self.collect_messages(&address, bucket, now, &mut entries);
        }

        entries.sort_by(|a, b| {
            a.start
                .partial_cmp(&b.start)
                .unwrap_or(Ordering::Equal)
                .then(a.rank.cmp(&b.rank))
                .then_with(|| a.message.cmp(&b.message))
        });

        let mut seen = std::collections::HashSet::new();
        entries
            .into_iter()
            .filter(|entry| seen.insert(entry.message.clone()))
            .map(|entry| entry.message)
            .collect()
    }

    fn collect_messages(&self, address: &Address, bucket: &Bucket, now: Timestamp, out: &mut Vec<Entry>) {
        for datum in bucket.query(now) {
            let Some(item) = bucket.item(&datum) else {
                continue;
            };
            if item.is_tombstoned(now) {
                continue;
            }
            let live = |validity: &&Validity| !validity.is_expired(now);
            for validity in item.dismissals().keys().filter(live) {
                let message = WireMessage::dismiss(address.clone(), datum.clone(), *validity);
                self.push_with_signatures(message, validity, out);
            }
            for validity in item.proposals().keys().filter(live) {
                let message = WireMessage::propose(address.clone(), datum.clone(), *validity);
                self.push_with_signatures(message, validity, out);
            }
        }
    }

    fn push_with_signatures(&self, message: WireMessage, validity: &Validity, out: &mut Vec<Entry>) {
        let wire = match self.codec.encode(&message) {
            Ok(wire) => wire,
            Err(e) => {
                tracing::warn!("could not encode summary message: {}", e);
                return;
            }
        };
        let start = validity.start().unwrap_or(Timestamp::NEG_INFINITY);
        let data_hash = content_hash(&wire);
        for (signer, signature) in self.signatures.signatures(&data_hash) {
            let signed = WireMessage::signed(data_hash.clone(), signer, signature);
            match self.codec.encode(&signed) {
                Ok(message) => out.push(Entry {
                    start: start - SIGNATURE_LEAD,
                    rank: 0,
                    message,
                }),
                Err(e) => tracing::warn!("could not encode signature message: {}", e),
            }
        }
        out.push(Entry {
            start,
            rank: 1,
            message: wire,
        });
    }

    /// Currently valid, non-tombstoned data as nested JSON objects
    ///  keyed by path segment, e.g. `{"pri": {"QmAlice": {"addresses": [..]}}}`.
    ///
    /// A bucket holding data cannot also hold data in a descendant;
    ///  such descendants are left out with a warning.
    pub fn summary_tree(&self) -> Value {
        let now = self.clock.now();
        let mut tree = Map::new();
        for (address, bucket) in self.root.items() {
            let data: Vec<Value> = bucket
                .query(now)
                .into_iter()
                .filter(|datum| {
                    bucket
                        .item(datum)
                        .is_some_and(|item| !item.is_tombstoned(now))
                })
                .map(Value::String)
                .collect();
            if data.is_empty() {
                continue;
            }
            if !insert_at(&mut tree, address.segments(), Value::Array(data)) {
                tracing::warn!(bucket = %address, "cannot place data below a bucket that has data");
            }
        }
        Value::Object(tree)
    }
}

fn insert_at(tree: &mut Map<String, Value>, path: &[String], value: Value) -> bool {
    let Some((first, rest)) = path.split_first() else {
        return false;
    };
    if rest.is_empty() {
        tree.insert(first.clone(), value);
        return true;
    }
    match tree
        .entry(first.clone())
        .or_insert_with(|| Value::Object(Map::new()))
    {
        Value::Object(child) => insert_at(child, rest, value),
        _ => false,
    }
}
