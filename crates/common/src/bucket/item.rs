use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::stats::ChannelStats;
use crate::validity::Validity;

/// Claims collected for one datum in one bucket.
///
/// Every propose and dismiss ever received is kept, grouped by
///  window, each window holding the union of everyone who endorsed
///  it. Merging is a set union, so replaying claims in any order or
///  any number of times converges on the same item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketDataItem {
    proposed: BTreeMap<Validity, BTreeSet<String>>,
    dismissed: BTreeMap<Validity, BTreeSet<String>>,
    /// channel -> when this datum was last heard of / announced there
    last_proposed: BTreeMap<String, ChannelStats>,
    last_dismissed: BTreeMap<String, ChannelStats>,
}

impl BucketDataItem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn propose<I>(&mut self, validity: Validity, endorsers: I, channel: &str, now: Timestamp)
    where
        I: IntoIterator<Item = String>,
    {
        self.proposed.entry(validity).or_default().extend(endorsers);
        self.last_proposed
            .entry(channel.to_string())
            .or_default()
            .just_received(now);
    }

    pub fn dismiss<I>(&mut self, validity: Validity, endorsers: I, channel: &str, now: Timestamp)
    where
        I: IntoIterator<Item = String>,
    {
        self.dismissed.entry(validity).or_default().extend(endorsers);
        self.last_dismissed
            .entry(channel.to_string())
            .or_default()
            .just_received(now);
    }

    /// Drop every window, in both directions, that has expired.
    ///  Returns how many windows were dropped.
    pub fn cleanup(&mut self, now: Timestamp) -> usize {
        let before = self.proposed.len() + self.dismissed.len();
        self.proposed.retain(|validity, _| !validity.is_expired(now));
        self.dismissed.retain(|validity, _| !validity.is_expired(now));
        before - self.proposed.len() - self.dismissed.len()
    }

    /// No windows left in either direction
    pub fn is_empty(&self) -> bool {
        self.proposed.is_empty() && self.dismissed.is_empty()
    }

    /// Whether the datum holds at `at`.
    ///
    /// Any stored dismiss window containing `at` wins, no matter how
    ///  many proposals also cover it.
    pub fn valid(&self, at: Timestamp) -> bool {
        if self.dismissed.keys().any(|validity| validity.contains(at)) {
            return false;
        }
        self.proposed.keys().any(|validity| validity.contains(at))
    }

    /// Permanently dismissed: an active dismiss window with no end
    pub fn is_tombstoned(&self, now: Timestamp) -> bool {
        self.dismissed
            .keys()
            .any(|validity| validity.is_open_ended() && validity.contains(now))
    }

    pub fn proposals(&self) -> &BTreeMap<Validity, BTreeSet<String>> {
        &self.proposed
    }

    pub fn dismissals(&self) -> &BTreeMap<Validity, BTreeSet<String>> {
        &self.dismissed
    }

    /// When this datum was last proposed on, or announced to, `channel`.
    ///  Zero if never.
    pub fn last_broadcast(&self, channel: &str) -> Timestamp {
        self.last_proposed
            .get(channel)
            .map(ChannelStats::last_activity)
            .unwrap_or(0.0)
    }

    /// Record that we announced this datum on `channel`
    pub fn just_broadcast(&mut self, channel: &str, now: Timestamp) {
        self.last_proposed
            .entry(channel.to_string())
            .or_default()
            .just_sent(now);
    }

    /// A window to re-announce the datum with: the first one that has
    ///  not expired, or failing that the first one still stored.
    pub fn rebroadcast_window(&self, now: Timestamp) -> Option<Validity> {
        self.proposed
            .keys()
            .find(|validity| !validity.is_expired(now))
            .or_else(|| self.proposed.keys().next())
            .copied()
    }

    pub fn summary(&self, now: Timestamp) -> String {
        let mut lines = Vec::new();
        if self.is_tombstoned(now) {
            lines.push("TOMBSTONED".to_string());
        }
        for (validity, endorsers) in &self.proposed {
            lines.push(format!(
                "propose {} by {:?}",
                validity.describe(now),
                endorsers
            ));
        }
        for (validity, endorsers) in &self.dismissed {
            lines.push(format!(
                "dismiss {} by {:?}",
                validity.describe(now),
                endorsers
            ));
        }
        for (channel, stats) in &self.last_proposed {
            lines.push(format!("{}: {}", stats.describe(now), channel));
        }
        for (channel, stats) in &self.last_dismissed {
            lines.push(format!("{}: {}", stats.describe(now), channel));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn who(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validity_containment() {
        let mut item = BucketDataItem::new();
        item.propose(Validity::between(10, 20), who(&["a"]), "chan", 0.0);
        assert!(!item.valid(5.0));
        assert!(item.valid(15.0));
        assert!(!item.valid(25.0));

        let mut forever = BucketDataItem::new();
        forever.propose(Validity::always(), who(&["a"]), "chan", 0.0);
        for t in [-1e9, 0.0, 1.0, 1e12] {
            assert!(forever.valid(t));
        }
    }

    #[test]
    fn test_dismiss_wins() {
        let mut item = BucketDataItem::new();
        item.propose(Validity::between(0, 100), who(&["a"]), "chan", 0.0);
        item.dismiss(Validity::between(0, 100), who(&["b"]), "chan", 0.0);
        assert!(!item.valid(50.0));

        // a narrower proposal does not beat a wider dismissal
        item.propose(Validity::between(40, 60), who(&["a"]), "chan", 0.0);
        assert!(!item.valid(50.0));
        assert!(!item.valid(150.0));
    }

    #[test]
    fn test_endorsers_accumulate() {
        let mut item = BucketDataItem::new();
        let window = Validity::between(0, 100);
        item.propose(window, who(&["a"]), "chan", 1.0);
        item.propose(window, who(&["a", "b"]), "other", 2.0);
        item.propose(window, who(&[]), "chan", 3.0);

        assert_eq!(item.proposals().len(), 1);
        assert_eq!(item.proposals()[&window].len(), 2);
        assert_eq!(item.last_broadcast("chan"), 3.0);
        assert_eq!(item.last_broadcast("other"), 2.0);
        assert_eq!(item.last_broadcast("never"), 0.0);
    }

    #[test]
    fn test_cleanup_drops_expired_windows() {
        let mut item = BucketDataItem::new();
        item.propose(Validity::between(0, 100), who(&["a"]), "chan", 0.0);
        item.propose(Validity::since(0), who(&["a"]), "chan", 0.0);
        item.dismiss(Validity::until(50), who(&["b"]), "chan", 0.0);

        assert_eq!(item.cleanup(10.0), 0);
        assert_eq!(item.cleanup(60.0), 1);
        assert_eq!(item.cleanup(101.0), 1);
        assert!(!item.is_empty());
        assert_eq!(item.proposals().len(), 1);
    }

    #[test]
    fn test_tombstone() {
        let mut item = BucketDataItem::new();
        item.propose(Validity::always(), who(&["a"]), "chan", 0.0);
        assert!(!item.is_tombstoned(10.0));
        item.dismiss(Validity::between(0, 20), who(&["b"]), "chan", 0.0);
        assert!(!item.is_tombstoned(10.0));
        item.dismiss(Validity::since(5), who(&["b"]), "chan", 0.0);
        assert!(item.is_tombstoned(10.0));
        assert!(!item.is_tombstoned(1.0));
        assert!(item.summary(10.0).starts_with("TOMBSTONED"));
    }

    #[test]
    fn test_rebroadcast_window_prefers_live() {
        let mut item = BucketDataItem::new();
        assert!(item.rebroadcast_window(0.0).is_none());
        item.propose(Validity::between(0, 10), who(&["a"]), "chan", 0.0);
        item.propose(Validity::between(5, 50), who(&["a"]), "chan", 0.0);
        assert_eq!(item.rebroadcast_window(1.0), Some(Validity::between(0, 10)));
        assert_eq!(item.rebroadcast_window(20.0), Some(Validity::between(5, 50)));
        assert_eq!(item.rebroadcast_window(60.0), Some(Validity::between(0, 10)));
    }
}
