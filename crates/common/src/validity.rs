use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::clock::{friendly_duration, Timestamp};

/// One end of a [`Validity`] window, in unix seconds.
///
/// Peers stamp windows with fractional seconds, so bounds are floats.
///  Equality, ordering and hashing follow `f64::total_cmp` so that
///  windows can key ordered maps. `-0.0` is stored as `0.0`.
#[derive(Debug, Clone, Copy)]
pub struct Bound(Timestamp);

impl Bound {
    pub fn new(secs: Timestamp) -> Self {
        // collapse -0.0 so it equals 0.0 under total_cmp
        Self(secs + 0.0)
    }

    pub fn secs(self) -> Timestamp {
        self.0
    }
}

impl From<i64> for Bound {
    fn from(secs: i64) -> Self {
        Self::new(secs as Timestamp)
    }
}

impl From<Timestamp> for Bound {
    fn from(secs: Timestamp) -> Self {
        Self::new(secs)
    }
}

impl PartialEq for Bound {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Bound {}

impl PartialOrd for Bound {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bound {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Bound {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// Whole seconds go out as integers in human readable formats, so
///  `[10, 20]` stays `[10, 20]` on the wire. Binary formats always
///  carry the float.
impl Serialize for Bound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let whole = self.0.fract() == 0.0 && self.0.abs() < i64::MAX as Timestamp;
        if serializer.is_human_readable() && whole {
            serializer.serialize_i64(self.0 as i64)
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Bound {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Timestamp::deserialize(deserializer).map(Self::new)
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time window during which a claim is active.
///
/// Both bounds are unix seconds and inclusive. A missing lower
///  bound means "valid since always", a missing upper bound means
///  "valid forever". On the wire a window is a two element array
///  `[t0, t1]` where either side may be `null`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(Option<Bound>, Option<Bound>)", into = "(Option<Bound>, Option<Bound>)")]
pub struct Validity {
    pub since: Option<Bound>,
    pub until: Option<Bound>,
}

impl Validity {
    /// A window with fractional bounds
    pub fn new(since: Option<Timestamp>, until: Option<Timestamp>) -> Self {
        Self {
            since: since.map(Bound::new),
            until: until.map(Bound::new),
        }
    }

    /// Open at both ends
    pub fn always() -> Self {
        Self::new(None, None)
    }

    pub fn between(since: i64, until: i64) -> Self {
        Self {
            since: Some(since.into()),
            until: Some(until.into()),
        }
    }

    pub fn since(since: i64) -> Self {
        Self {
            since: Some(since.into()),
            until: None,
        }
    }

    pub fn until(until: i64) -> Self {
        Self {
            since: None,
            until: Some(until.into()),
        }
    }

    /// Lower bound in seconds, if any
    pub fn start(&self) -> Option<Timestamp> {
        self.since.map(Bound::secs)
    }

    /// Upper bound in seconds, if any
    pub fn end(&self) -> Option<Timestamp> {
        self.until.map(Bound::secs)
    }

    /// Whether `at` falls inside the window
    pub fn contains(&self, at: Timestamp) -> bool {
        let after_start = self.start().map_or(true, |t0| t0 <= at);
        let before_end = self.end().map_or(true, |t1| at <= t1);
        after_start && before_end
    }

    /// A window is expired once the clock has moved past its upper bound.
    ///  Open-ended windows never expire.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        match self.end() {
            Some(t1) => now > t1,
            None => false,
        }
    }

    pub fn is_open_ended(&self) -> bool {
        self.until.is_none()
    }

    /// Render the window relative to `now` for diagnostics
    pub fn describe(&self, now: Timestamp) -> String {
        let start = match self.start() {
            Some(t0) => relative(t0 - now),
            None => "always".to_string(),
        };
        let end = match self.end() {
            Some(t1) => relative(t1 - now),
            None => "forever".to_string(),
        };
        format!("[from {} to {}]", start, end)
    }
}

fn relative(delta: Timestamp) -> String {
    if delta >= 0.0 {
        format!("in {}", friendly_duration(delta))
    } else {
        format!("{} ago", friendly_duration(-delta))
    }
}

impl From<(Option<Bound>, Option<Bound>)> for Validity {
    fn from((since, until): (Option<Bound>, Option<Bound>)) -> Self {
        Self { since, until }
    }
}

impl From<Validity> for (Option<Bound>, Option<Bound>) {
    fn from(validity: Validity) -> Self {
        (validity.since, validity.until)
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |t: Option<Bound>| t.map_or("-".to_string(), |t| t.to_string());
        write!(f, "[{}, {}]", bound(self.since), bound(self.until))
    }
}
