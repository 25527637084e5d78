//! One replica on the network: a [`DistributedRepo`] behind a single
//!  lock, driven by a [`Transport`].
//!
//! The lock is never held across an await; every operation takes it,
//!  mutates the repo, collects what has to be sent and releases it
//!  before talking to the transport.

use std::sync::Arc;

use common::prelude::{
    DistributedRepo, Envelope, ProcessError, Processed, SnapshotStore, WireError, WireMessage,
};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::service_config::Config;
use crate::transport::{Received, Transport, TransportError};

/// Channel name used for messages created by this node
pub const LOCAL_CHANNEL: &str = "local";

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("process error: {0}")]
    Process(#[from] ProcessError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub struct Node<T: Transport> {
    config: Config,
    repo: Arc<Mutex<DistributedRepo>>,
    transport: T,
    store: Option<Arc<dyn SnapshotStore>>,
}

impl<T: Transport> Node<T> {
    /// The repo is switched to the access mode named in `config`
    pub fn new(config: Config, repo: DistributedRepo, transport: T) -> Self {
        let repo = repo.with_access_mode(config.access_mode);
        Self {
            config,
            repo: Arc::new(Mutex::new(repo)),
            transport,
            store: None,
        }
    }

    /// Save snapshots to `store` periodically and on shutdown
    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared handle on the repo, e.g. to query or install hooks
    pub fn repo(&self) -> Arc<Mutex<DistributedRepo>> {
        self.repo.clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Feed one inbound envelope to the repo. Failures are logged
    ///  and the message dropped.
    pub fn handle(&self, received: &Received) -> Option<Processed> {
        let result = self
            .repo
            .lock()
            .process(&received.envelope.payload, &received.channel, None);
        match result {
            Ok(processed) => Some(processed),
            Err(e) => {
                tracing::warn!(
                    channel = %received.channel,
                    from = %received.envelope.from,
                    "dropping message: {}",
                    e
                );
                None
            }
        }
    }

    /// Garbage collect, then re-announce stale data on quiet channels.
    ///  Returns the number of envelopes handed to the transport.
    pub async fn tick(&self) -> usize {
        let envelopes = {
            let mut repo = self.repo.lock();
            let forgotten = repo.cleanup();
            if forgotten > 0 {
                tracing::debug!(forgotten, "cleanup");
            }
            let mut envelopes = Vec::new();
            for address in &self.config.rebroadcast_buckets {
                match repo.rebroadcast(address, &self.config.channels, &self.config.rebroadcast) {
                    Ok(out) => envelopes.extend(out),
                    Err(e) => tracing::debug!(bucket = %address, "skipping rebroadcast: {}", e),
                }
            }
            envelopes
        };
        self.dispatch_all(envelopes).await
    }

    /// Apply a locally created message and broadcast it on every channel
    pub async fn publish(&self, message: &WireMessage) -> Result<Processed, NodeError> {
        let (processed, envelopes) = {
            let mut repo = self.repo.lock();
            let wire = repo.encode(message)?;
            let processed = repo.process(&wire, LOCAL_CHANNEL, None)?;
            let envelopes: Vec<Envelope> = self
                .config
                .channels
                .iter()
                .map(|channel| {
                    repo.note_sent(channel);
                    Envelope::broadcast(channel, wire.clone())
                })
                .collect();
            (processed, envelopes)
        };
        for envelope in envelopes {
            self.transport.dispatch(envelope).await?;
        }
        Ok(processed)
    }

    async fn dispatch_all(&self, envelopes: Vec<Envelope>) -> usize {
        let mut sent = 0;
        for envelope in envelopes {
            match self.transport.dispatch(envelope).await {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!("could not dispatch envelope: {}", e),
            }
        }
        sent
    }

    /// Process everything available within the receive timeout.
    ///  Returns how many envelopes arrived.
    pub async fn poll(&self) -> Result<usize, TransportError> {
        let batch = self.transport.receive(self.config.receive_timeout).await?;
        for received in &batch {
            self.handle(received);
        }
        Ok(batch.len())
    }

    pub fn save_snapshot(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = self.repo.lock().snapshot();
        if let Err(e) = store.save(&snapshot) {
            tracing::error!("failed to save snapshot: {}", e);
        }
    }

    /// The node loop: receive, tick and snapshot until `shutdown` fires.
    ///  A final snapshot is saved on the way out.
    pub async fn run(&self, mut shutdown: watch::Receiver<()>) {
        use tokio::time::{interval, MissedTickBehavior};

        let mut tick_interval = interval(self.config.tick_interval);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut snapshot_interval = interval(self.config.snapshot_interval);
        snapshot_interval.tick().await; // Skip first immediate tick

        tracing::info!(
            node = %self.config.node_name,
            channels = ?self.config.channels,
            "node running"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("shutdown requested");
                    break;
                }

                _ = tick_interval.tick() => {
                    let sent = self.tick().await;
                    if sent > 0 {
                        tracing::debug!(sent, "rebroadcast");
                    }
                }

                _ = snapshot_interval.tick() => {
                    self.save_snapshot();
                }

                result = self.transport.receive(self.config.receive_timeout) => {
                    match result {
                        Ok(batch) => {
                            for received in &batch {
                                self.handle(received);
                            }
                        }
                        Err(e) => {
                            tracing::error!("transport failed: {}", e);
                            break;
                        }
                    }
                }
            }
        }

        self.save_snapshot();
        tracing::info!(node = %self.config.node_name, "node stopped");
    }
}
