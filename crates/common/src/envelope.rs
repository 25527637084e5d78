use std::fmt;

use serde::{Deserialize, Serialize};

/// Suffix appended to a channel name to address every node listening on it
pub const ALL_NODES: &str = "/*/node";

/// Records above this size are still produced, but logged; most
///  chat-like channels will split or drop them.
pub const RECORD_SIZE_WARNING: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("the record of length {0} appears truncated")]
    Truncated(usize),
    #[error("could not read envelope of length {len}: {source}")]
    Malformed {
        len: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// An addressed, transport-agnostic message container.
///
/// Addresses are multiaddr-like strings; a `*` segment in the
///  destination means "every known endpoint of this kind".
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: String,
    pub to: String,
    pub payload: String,
    pub comment: Option<String>,
}

/// Flat serialized form of an [`Envelope`]
#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeRecord {
    from: String,
    to: String,
    payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
}

impl Envelope {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        payload: impl Into<String>,
        comment: Option<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            payload: payload.into(),
            comment,
        }
    }

    /// An envelope addressed to every node on `channel`
    pub fn broadcast(channel: &str, payload: impl Into<String>) -> Self {
        Self::new("", format!("{}{}", channel, ALL_NODES), payload, None)
    }

    /// The channel this envelope was broadcast to, if it is a broadcast
    pub fn broadcast_channel(&self) -> Option<&str> {
        self.to.strip_suffix(ALL_NODES)
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn to_record(&self) -> String {
        let record = EnvelopeRecord {
            from: self.from.clone(),
            to: self.to.clone(),
            payload: self.payload.clone(),
            comment: self.comment.clone(),
        };
        // a struct of strings always serializes
        let s = serde_json::to_string(&record).unwrap_or_default();
        if s.len() > RECORD_SIZE_WARNING {
            tracing::warn!(size = s.len(), "envelope record exceeds {} bytes", RECORD_SIZE_WARNING);
        }
        s
    }

    pub fn from_record(s: &str) -> Result<Self, EnvelopeError> {
        if !s.starts_with('{') || !s.ends_with('}') {
            return Err(EnvelopeError::Truncated(s.len()));
        }
        let record: EnvelopeRecord =
            serde_json::from_str(s).map_err(|source| EnvelopeError::Malformed {
                len: s.len(),
                source,
            })?;
        Ok(Self {
            from: record.from,
            to: record.to,
            payload: record.payload,
            comment: record.comment,
        })
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or_at = |s: &str| if s.is_empty() { "@".to_string() } else { s.to_string() };
        write!(
            f,
            "Envelope(from: {}, to: {}, {}, {})",
            or_at(&self.from),
            or_at(&self.to),
            self.comment.as_deref().unwrap_or("(nc)"),
            self.payload
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_all_fields() {
        let envelope = Envelope::new("/irc/alice", "/irc/*", "hello", None).with_comment("greeting");
        let parsed = Envelope::from_record(&envelope.to_record()).unwrap();
        assert_eq!(parsed.from, "/irc/alice");
        assert_eq!(parsed.to, "/irc/*");
        assert_eq!(parsed.payload, "hello");
        assert_eq!(parsed.comment.as_deref(), Some("greeting"));
    }

    #[test]
    fn test_comment_is_optional() {
        let record = Envelope::new("a", "b", "c", None).to_record();
        assert!(!record.contains("comment"));
        let parsed = Envelope::from_record(r#"{"from":"a","to":"b","payload":"c"}"#).unwrap();
        assert!(parsed.comment.is_none());
    }

    #[test]
    fn test_truncated_record() {
        let record = Envelope::new("a", "b", "c", None).to_record();
        let cut = &record[..record.len() - 3];
        assert!(matches!(
            Envelope::from_record(cut),
            Err(EnvelopeError::Truncated(_))
        ));
        assert!(matches!(
            Envelope::from_record("{not json}"),
            Err(EnvelopeError::Malformed { .. })
        ));
    }

    #[test]
    fn test_broadcast_channel() {
        let envelope = Envelope::broadcast("#duckiebots", "m");
        assert_eq!(envelope.to, "#duckiebots/*/node");
        assert_eq!(envelope.broadcast_channel(), Some("#duckiebots"));
        assert_eq!(Envelope::new("", "direct", "m", None).broadcast_channel(), None);
    }
}
