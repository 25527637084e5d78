//! Wall-clock access for the engine.
//!
//! Every time-dependent decision (expiry, rebroadcast staleness,
//!  channel silence) reads the time through a [`Clock`] so that
//!  the engine can be driven deterministically in tests.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Unix time in (fractional) seconds
pub type Timestamp = f64;

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Timestamp;
}

/// The real wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can keep
///  a handle while the repo owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, secs: Timestamp) {
        *self.now.lock() += secs;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

/// Compact human duration, e.g. `42s`, `5m`, `3h`, `2d`
pub fn friendly_duration(secs: Timestamp) -> String {
    let secs = secs.max(0.0);
    if secs < 60.0 {
        format!("{:.0}s", secs)
    } else if secs < 3600.0 {
        format!("{:.0}m", secs / 60.0)
    } else if secs < 86400.0 {
        format!("{:.0}h", secs / 3600.0)
    } else {
        format!("{:.0}d", secs / 86400.0)
    }
}

/// `3m ago`, or `never` for a zero timestamp
pub fn friendly_time_since(then: Timestamp, now: Timestamp) -> String {
    if then <= 0.0 {
        return "never".to_string();
    }
    format!("{} ago", friendly_duration(now - then))
}

/// RFC 3339 rendering of a unix timestamp
pub fn format_timestamp(t: Timestamp) -> String {
    DateTime::<Utc>::from_timestamp(t.floor() as i64, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| format!("{}", t))
}
