//! The seam between a node and whatever carries its envelopes.
//!
//! A transport only has to deliver envelopes broadcast on a channel
//!  to the other nodes on that channel, at least once. The engine
//!  tolerates duplicates and reordering.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use common::prelude::Envelope;
use parking_lot::Mutex;

/// An envelope together with the channel it arrived on
#[derive(Debug, Clone)]
pub struct Received {
    pub channel: String,
    pub envelope: Envelope,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("not joined to channel {0}")]
    NotJoined(String),
    #[error("cannot route envelope to {0}")]
    Unroutable(String),
    #[error("transport closed")]
    Closed,
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send an envelope on its way. Never blocks on delivery.
    async fn dispatch(&self, envelope: Envelope) -> Result<(), TransportError>;

    /// Wait up to `timeout` for inbound envelopes and return every one
    ///  available by then (possibly none).
    async fn receive(&self, timeout: Duration) -> Result<Vec<Received>, TransportError>;
}

/// (channel, serialized envelope record)
type Delivery = (String, String);

#[derive(Debug, Default)]
struct HubInner {
    next_id: u64,
    /// channel -> (member id, inbox)
    members: HashMap<String, Vec<(u64, flume::Sender<Delivery>)>>,
}

/// In-process rendezvous for [`MemoryTransport`]s.
///
/// Envelopes travel as serialized records, so what one node
///  receives is exactly what a real transport would hand it.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node on `channels`
    pub fn join<I, S>(&self, name: impl Into<String>, channels: I) -> MemoryTransport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = flume::unbounded();
        let joined: BTreeSet<String> = channels.into_iter().map(Into::into).collect();
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        for channel in &joined {
            inner
                .members
                .entry(channel.clone())
                .or_default()
                .push((id, tx.clone()));
        }
        MemoryTransport {
            id,
            name: name.into(),
            joined,
            inbox: rx,
            hub: self.clone(),
        }
    }

    fn deliver(&self, from_id: u64, channel: &str, record: String) -> Result<(), TransportError> {
        let inner = self.inner.lock();
        let members = inner
            .members
            .get(channel)
            .ok_or_else(|| TransportError::NotJoined(channel.to_string()))?;
        for (id, inbox) in members {
            if *id == from_id {
                continue;
            }
            if inbox.send((channel.to_string(), record.clone())).is_err() {
                tracing::debug!(member = id, channel, "member left, dropping delivery");
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    id: u64,
    name: String,
    joined: BTreeSet<String>,
    inbox: flume::Receiver<Delivery>,
    hub: MemoryHub,
}

impl MemoryTransport {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.joined.iter().map(String::as_str)
    }

    fn decode(&self, (channel, record): Delivery) -> Option<Received> {
        match Envelope::from_record(&record) {
            Ok(envelope) => Some(Received { channel, envelope }),
            Err(e) => {
                tracing::warn!(node = %self.name, channel = %channel, "dropping envelope: {}", e);
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn dispatch(&self, mut envelope: Envelope) -> Result<(), TransportError> {
        let channel = envelope
            .broadcast_channel()
            .ok_or_else(|| TransportError::Unroutable(envelope.to.clone()))?
            .to_string();
        if !self.joined.contains(&channel) {
            return Err(TransportError::NotJoined(channel));
        }
        if envelope.from.is_empty() {
            envelope.from = format!("{}/{}", channel, self.name);
        }
        self.hub.deliver(self.id, &channel, envelope.to_record())
    }

    async fn receive(&self, timeout: Duration) -> Result<Vec<Received>, TransportError> {
        let first = match tokio::time::timeout(timeout, self.inbox.recv_async()).await {
            Ok(Ok(delivery)) => delivery,
            Ok(Err(_)) => return Err(TransportError::Closed),
            Err(_) => return Ok(Vec::new()),
        };
        let mut out: Vec<Received> = self.decode(first).into_iter().collect();
        while let Ok(delivery) = self.inbox.try_recv() {
            out.extend(self.decode(delivery));
        }
        Ok(out)
    }
}
