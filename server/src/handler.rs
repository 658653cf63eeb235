//! Turns transport events into registry and input queue mutations.
//!
//! The transport only speaks [`ConnectionEvent`]s; nothing here knows about
//! sockets or WebSocket frames.

use crate::broadcast::{self, Outbound};
use crate::error::ServerError;
use crate::registry::{PlayerState, SharedRegistry};
use crate::utils::get_timestamp;
use log::{debug, error, info, warn};
use shared::{decode_client_message, ClientCommand, PlayerId, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Events delivered by the transport, in per-connection order.
#[derive(Debug)]
pub enum ConnectionEvent {
    Opened {
        id: PlayerId,
        addr: Option<SocketAddr>,
        outbound: Outbound,
    },
    Message {
        id: PlayerId,
        text: String,
    },
    Closed {
        id: PlayerId,
    },
}

#[derive(Debug, Clone)]
pub struct EventHandler {
    registry: SharedRegistry,
}

impl EventHandler {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Consumes events until every transport sender is gone.
    pub async fn run(self, mut events: mpsc::Receiver<ConnectionEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        info!("Connection event stream ended");
    }

    pub async fn handle(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened { id, addr, outbound } => {
                if let Some(addr) = addr {
                    info!("Connection from {} assigned {}", addr, id);
                }
                if let Err(e) = self.on_open(id, outbound).await {
                    error!("Failed to register {}: {}", id, e);
                }
            }
            ConnectionEvent::Message { id, text } => {
                self.on_message(id, &text).await;
            }
            ConnectionEvent::Closed { id } => {
                self.on_close(id).await;
            }
        }
    }

    /// Registers a new player and sends the join handshake.
    ///
    /// Everything happens under the registry write lock, so the new
    /// connection has its identity queued before any tick snapshot can be.
    /// Handshake messages bypass the snapshot limit and are never dropped.
    pub async fn on_open(&self, id: PlayerId, outbound: Outbound) -> Result<PlayerState, ServerError> {
        let mut registry = self.registry.write().await;
        let state = registry.create(id, outbound.clone())?;

        outbound.send(Arc::new(ServerMessage::JoinedServer { uuid: id }));
        outbound.send(Arc::new(ServerMessage::SpawnLocalPlayer {
            uuid: id,
            x: state.x,
            y: state.y,
        }));

        broadcast::broadcast(
            &registry,
            ServerMessage::SpawnNewPlayer {
                player: state.summary(),
            },
            Some(id),
        );

        let players = registry
            .snapshot_all()
            .into_iter()
            .filter(|(other, _)| *other != id)
            .map(|(_, other)| other.summary())
            .collect();
        outbound.send(Arc::new(ServerMessage::SpawnNetworkPlayers { players }));

        Ok(state)
    }

    /// Handles one inbound frame. Returns the number of intents queued.
    pub async fn on_message(&self, from: PlayerId, text: &str) -> usize {
        let command = match decode_client_message(text, get_timestamp()) {
            Ok(command) => command,
            Err(e) => {
                warn!("Discarding malformed message from {}: {}", from, e);
                return 0;
            }
        };

        match command {
            ClientCommand::PlayerInput(submission) => {
                let Some(target) = submission.uuid else {
                    debug!("Input from {} has no valid target uuid", from);
                    return 0;
                };

                let count = submission.inputs.len();
                let registry = self.registry.read().await;
                match registry.enqueue_batch(&target, submission.inputs) {
                    Some(accepted) => accepted,
                    None => {
                        debug!("Dropping {} inputs for unknown player {}", count, target);
                        0
                    }
                }
            }
            ClientCommand::Unknown(cmd) => {
                debug!("Ignoring unsupported command '{}' from {}", cmd, from);
                0
            }
        }
    }

    /// Removes a player and tells everyone else. Duplicate closes are no-ops.
    pub async fn on_close(&self, id: PlayerId) -> bool {
        let mut registry = self.registry.write().await;
        if registry.remove(&id).is_none() {
            return false;
        }

        broadcast::broadcast(&registry, ServerMessage::PlayerDisconnected { uuid: id }, None);
        true
    }

    /// Evicts every player idle for longer than `timeout`.
    ///
    /// Dropping the session drops its outbound sender, which ends that
    /// connection's writer and closes the socket.
    pub async fn evict_idle(&self, timeout: Duration) -> Vec<PlayerId> {
        let mut registry = self.registry.write().await;
        let idle = registry.idle_players(timeout);

        for id in &idle {
            if registry.remove(id).is_some() {
                info!("Evicted idle player {}", id);
                broadcast::broadcast(&registry, ServerMessage::PlayerDisconnected { uuid: *id }, None);
            }
        }

        idle
    }
}
