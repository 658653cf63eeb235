//! Snapshot construction and fan-out.
//!
//! Each connection has one ordered outbound queue. Lifecycle messages (join,
//! spawn, disconnect) are always queued. Snapshots are best-effort: once a
//! connection has `capacity` messages waiting, further snapshots are dropped
//! for it and the next tick supersedes them. Nothing here ever waits.

use crate::config::BroadcastMode;
use crate::registry::{PlayerState, SessionRegistry};
use log::debug;
use shared::{PlayerId, ServerMessage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Sending half of one connection's outbound queue.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<Arc<ServerMessage>>,
    queued: Arc<AtomicUsize>,
    capacity: usize,
}

/// Receiving half, owned by the connection's writer.
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: mpsc::UnboundedReceiver<Arc<ServerMessage>>,
    queued: Arc<AtomicUsize>,
}

impl Outbound {
    /// Creates a queue that starts dropping snapshots at `capacity` waiting messages.
    pub fn channel(capacity: usize) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        (
            Self {
                tx,
                queued: Arc::clone(&queued),
                capacity,
            },
            OutboundReceiver { rx, queued },
        )
    }

    /// Queues a message that must not be lost. Fails only once the
    /// connection is gone.
    pub fn send(&self, message: Arc<ServerMessage>) -> bool {
        self.queued.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(message).is_err() {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    /// Queues a snapshot unless the connection is already `capacity` behind.
    pub fn deliver(&self, message: Arc<ServerMessage>) -> bool {
        if self.queued() >= self.capacity {
            debug!("Outbound queue full, dropping snapshot");
            return false;
        }
        self.send(message)
    }

    /// Messages queued but not yet taken by the writer.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl OutboundReceiver {
    pub async fn recv(&mut self) -> Option<Arc<ServerMessage>> {
        let message = self.rx.recv().await?;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        Some(message)
    }

    pub fn try_recv(&mut self) -> Result<Arc<ServerMessage>, TryRecvError> {
        let message = self.rx.try_recv()?;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        Ok(message)
    }
}

/// Builds the messages describing one snapshot.
pub fn snapshot_messages(
    snapshot: &[(PlayerId, PlayerState)],
    mode: BroadcastMode,
    timestamp: u64,
) -> Vec<ServerMessage> {
    match mode {
        BroadcastMode::Batched => vec![ServerMessage::UpdateState {
            players: snapshot
                .iter()
                .map(|(_, state)| state.update(timestamp))
                .collect(),
            t: timestamp,
        }],
        BroadcastMode::PerEntity => snapshot
            .iter()
            .map(|(_, state)| ServerMessage::UpdatePosition(state.update(timestamp)))
            .collect(),
    }
}

/// Offers a tick's snapshot messages, in order, to every open connection.
///
/// Returns the number of messages accepted.
pub fn fan_out(
    registry: &SessionRegistry,
    messages: &[Arc<ServerMessage>],
    exclude: Option<PlayerId>,
) -> usize {
    let mut delivered = 0;
    for (id, outbound) in registry.connections() {
        if Some(id) == exclude || !outbound.is_open() {
            continue;
        }
        for message in messages {
            if outbound.deliver(Arc::clone(message)) {
                delivered += 1;
            }
        }
    }
    delivered
}

/// Sends a lifecycle message to every open connection except `exclude`.
pub fn broadcast(registry: &SessionRegistry, message: ServerMessage, exclude: Option<PlayerId>) -> usize {
    let message = Arc::new(message);
    let mut delivered = 0;
    for (id, outbound) in registry.connections() {
        if Some(id) == exclude {
            continue;
        }
        if outbound.send(Arc::clone(&message)) {
            delivered += 1;
        }
    }
    delivered
}
