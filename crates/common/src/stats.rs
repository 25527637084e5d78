use serde::{Deserialize, Serialize};

use crate::clock::{friendly_time_since, Timestamp};

/// Traffic counters for a single channel.
///
/// Used both for whole channels (how busy is this chat room?)
///  and per fact (when was this fact last heard of / announced
///  on this channel?). A zero timestamp means "never".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub num_sent: u64,
    pub num_received: u64,
    pub last_sent: Timestamp,
    pub last_received: Timestamp,
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn just_received(&mut self, now: Timestamp) {
        self.num_received += 1;
        self.last_received = now;
    }

    pub fn just_sent(&mut self, now: Timestamp) {
        self.num_sent += 1;
        self.last_sent = now;
    }

    /// Most recent send or receive
    pub fn last_activity(&self) -> Timestamp {
        self.last_sent.max(self.last_received)
    }

    /// Seconds since the last send or receive
    pub fn silence(&self, now: Timestamp) -> Timestamp {
        now - self.last_activity()
    }

    pub fn describe(&self, now: Timestamp) -> String {
        let sent = if self.num_sent == 0 {
            String::new()
        } else {
            format!(
                "sent {:>3}  {}",
                self.num_sent,
                friendly_time_since(self.last_sent, now)
            )
        };
        let received = if self.num_received == 0 {
            String::new()
        } else {
            format!(
                "recv {:>3}  {}",
                self.num_received,
                friendly_time_since(self.last_received, now)
            )
        };
        format!("{:<23} | {:<23}", sent, received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_activity_is_max() {
        let mut stats = ChannelStats::new();
        assert_eq!(stats.last_activity(), 0.0);

        stats.just_received(100.0);
        stats.just_sent(90.0);
        assert_eq!(stats.last_activity(), 100.0);
        assert_eq!(stats.silence(110.0), 10.0);

        stats.just_sent(120.0);
        assert_eq!(stats.last_activity(), 120.0);
        assert_eq!(stats.num_sent, 2);
        assert_eq!(stats.num_received, 1);
    }

    #[test]
    fn test_describe_mentions_counts() {
        let mut stats = ChannelStats::new();
        stats.just_received(10.0);
        let line = stats.describe(40.0);
        assert!(line.contains("recv   1"));
        assert!(line.contains("30s ago"));
    }
}
