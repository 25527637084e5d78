use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::DistributedRepo;
use crate::address::Address;
use crate::bucket::BucketError;
use crate::clock::Timestamp;
use crate::envelope::Envelope;
use crate::wire::{WireCodec, WireMessage};

/// Knobs of the anti-entropy scheduler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebroadcastOptions {
    /// Re-announce a datum on a channel at most this often (seconds)
    pub min_delta: Timestamp,
    /// Only add gossip to channels quiet for this long (seconds)
    pub min_silence: Timestamp,
    /// Upper bound on envelopes produced per call
    pub max_n: usize,
}

impl Default for RebroadcastOptions {
    fn default() -> Self {
        Self {
            min_delta: 30.0,
            min_silence: 5.0,
            max_n: 1,
        }
    }
}

struct Candidate {
    last: Timestamp,
    datum: String,
    channel: String,
    envelope: Envelope,
}

impl<C: WireCodec> DistributedRepo<C> {
    /// Pick stale, currently valid data in `address` to re-announce on
    ///  quiet `channels`.
    ///
    /// The least recently announced (datum, channel) pairs go first and
    ///  at most `options.max_n` envelopes are returned. Only the pairs
    ///  returned are recorded as sent; the others stay stale and are
    ///  candidates again on the next call.
    pub fn rebroadcast(
        &mut self,
        address: &Address,
        channels: &[String],
        options: &RebroadcastOptions,
    ) -> Result<Vec<Envelope>, BucketError> {
        let now = self.clock.now();
        let bucket = self.root.get_bucket(address)?;

        let mut candidates = Vec::new();
        for datum in bucket.query(now) {
            let Some(item) = bucket.item(&datum) else {
                continue;
            };
            for channel in channels {
                let last_activity = self
                    .channels
                    .get(channel)
                    .map(|stats| stats.last_activity())
                    .unwrap_or(0.0);
                if now - last_activity <= options.min_silence {
                    continue;
                }
                let last = item.last_broadcast(channel);
                if now - last <= options.min_delta {
                    continue;
                }
                let Some(validity) = item.rebroadcast_window(now) else {
                    continue;
                };
                let message = WireMessage::propose(address.clone(), datum.clone(), validity);
                let payload = match self.codec.encode(&message) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!("could not encode rebroadcast of {}: {}", datum, e);
                        continue;
                    }
                };
                candidates.push(Candidate {
                    last,
                    datum: datum.clone(),
                    channel: channel.clone(),
                    envelope: Envelope::broadcast(channel, payload),
                });
            }
        }

        // stable: ties keep datum then channel order
        candidates.sort_by(|a, b| a.last.partial_cmp(&b.last).unwrap_or(Ordering::Equal));
        candidates.truncate(options.max_n);

        let bucket = self.root.get_or_create(address);
        let mut out = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if let Some(item) = bucket.item_mut(&candidate.datum) {
                item.just_broadcast(&candidate.channel, now);
            }
            self.channels
                .entry(candidate.channel.clone())
                .or_default()
                .just_sent(now);
            tracing::debug!(
                bucket = %address,
                datum = %candidate.datum,
                channel = %candidate.channel,
                "rebroadcasting"
            );
            out.push(candidate.envelope);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::validity::Validity;
    use crate::wire::JsonCodec;
    use std::sync::Arc;

    fn setup() -> (DistributedRepo, ManualClock, Address) {
        let clock = ManualClock::new(1000.0);
        let mut repo = DistributedRepo::with_codec(JsonCodec, Arc::new(clock.clone()));
        let peer: Address = "peer".parse().unwrap();
        repo.init_bucket(&peer, Vec::<String>::new());
        (repo, clock, peer)
    }

    fn feed(repo: &mut DistributedRepo, peer: &Address, datum: &str, channel: &str) {
        let wire = repo
            .encode(&WireMessage::propose(peer.clone(), datum, Validity::always()))
            .unwrap();
        repo.process(&wire, channel, None).unwrap();
    }

    #[test]
    fn test_busy_channel_is_skipped() {
        let (mut repo, clock, peer) = setup();
        let channels = vec!["chan".to_string()];
        feed(&mut repo, &peer, "QmAlice", "elsewhere");
        feed(&mut repo, &peer, "QmBob", "chan");

        clock.advance(3.0);
        let out = repo
            .rebroadcast(&peer, &channels, &RebroadcastOptions::default())
            .unwrap();
        assert!(out.is_empty());

        clock.advance(3.0);
        let out = repo
            .rebroadcast(&peer, &channels, &RebroadcastOptions::default())
            .unwrap();
        // QmBob was heard on the channel 6s ago, QmAlice never
        assert_eq!(out.len(), 1);
        assert!(out[0].payload.contains("QmAlice"));
        assert_eq!(out[0].to, "chan/*/node");
        assert_eq!(repo.channel("chan").unwrap().num_sent, 1);
    }

    #[test]
    fn test_only_returned_pairs_are_marked() {
        let (mut repo, clock, peer) = setup();
        let channels = vec!["chan".to_string()];
        for datum in ["QmA", "QmB", "QmC"] {
            feed(&mut repo, &peer, datum, "elsewhere");
        }
        clock.advance(100.0);
        let options = RebroadcastOptions {
            max_n: 2,
            ..Default::default()
        };
        let out = repo.rebroadcast(&peer, &channels, &options).unwrap();
        assert_eq!(out.len(), 2);

        // the channel just carried gossip; wait for it to quiet down
        clock.advance(10.0);
        let out = repo.rebroadcast(&peer, &channels, &options).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].payload.contains("QmC"));
    }

    #[test]
    fn test_missing_bucket_is_an_error() {
        let (mut repo, _, _) = setup();
        let result = repo.rebroadcast(
            &"nope".parse().unwrap(),
            &["chan".to_string()],
            &RebroadcastOptions::default(),
        );
        assert!(matches!(result, Err(BucketError::NoSuchBucket { .. })));
    }

    #[test]
    fn test_invalid_data_is_not_rebroadcast() {
        let (mut repo, clock, peer) = setup();
        let wire = repo
            .encode(&WireMessage::propose(peer.clone(), "QmOld", Validity::between(0, 1050)))
            .unwrap();
        repo.process(&wire, "elsewhere", None).unwrap();
        clock.set(1100.0);
        let out = repo
            .rebroadcast(&peer, &["chan".to_string()], &RebroadcastOptions::default())
            .unwrap();
        assert!(out.is_empty());
    }
}
