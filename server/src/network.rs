//! WebSocket transport and task wiring.
//!
//! Each accepted socket gets one task that forwards inbound frames as
//! [`ConnectionEvent`]s and writes whatever lands in its outbound queue. The
//! event handler, the game loop and the optional idle checker each run in
//! their own task and only meet at the shared registry.

use crate::broadcast::Outbound;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::game::GameLoop;
use crate::handler::{ConnectionEvent, EventHandler};
use crate::registry::{SessionRegistry, SharedRegistry};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{PlayerId, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Connection events buffered ahead of the handler. A full buffer makes
/// socket readers wait instead of growing memory.
const EVENT_BUFFER: usize = 1024;

pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    registry: SharedRegistry,
}

impl Server {
    /// Validates the configuration and binds the listening socket.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            registry: SessionRegistry::new(config.spawn)
                .with_input_limit(config.max_queued_inputs)
                .into_shared(),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Spawns the background tasks and accepts connections forever.
    pub async fn run(self) -> Result<(), ServerError> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let handler = EventHandler::new(Arc::clone(&self.registry));

        tokio::spawn(handler.clone().run(events_rx));
        tokio::spawn(GameLoop::new(Arc::clone(&self.registry), &self.config).run());
        if let Some(timeout) = self.config.idle_timeout {
            tokio::spawn(run_idle_checker(handler, timeout));
        }

        info!(
            "Server started: {} Hz, speed {}, friction {}, {:?} broadcast, {:?} acks",
            self.config.tick_rate,
            self.config.speed,
            self.config.friction,
            self.config.broadcast_mode,
            self.config.ack_policy
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let events = events_tx.clone();
                    let capacity = self.config.outbound_buffer;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, events, capacity).await {
                            warn!("Connection from {} failed: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Drives one client socket from handshake to close.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    events: mpsc::Sender<ConnectionEvent>,
    outbound_capacity: usize,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let id = PlayerId::new();
    let (outbound, mut outbound_rx) = Outbound::channel(outbound_capacity);
    events
        .send(ConnectionEvent::Opened {
            id,
            addr: Some(addr),
            outbound,
        })
        .await
        .map_err(|_| ServerError::ChannelClosed("connection events"))?;

    let incoming = async {
        while let Some(frame) = ws_receiver.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text.as_str().to_owned(),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!("Discarding non UTF-8 binary frame from {}", id);
                        continue;
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("Client {} requested close", id);
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    debug!("WebSocket error for {}: {}", id, e);
                    break;
                }
            };

            if events.send(ConnectionEvent::Message { id, text }).await.is_err() {
                break;
            }
        }
    };

    let outgoing = async {
        // Ends when the session is dropped from the registry
        while let Some(message) = outbound_rx.recv().await {
            let frame = match encode_frame(&message) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to encode message for {}: {}", id, e);
                    continue;
                }
            };
            if let Err(e) = ws_sender.send(frame).await {
                debug!("Send to {} failed: {}", id, e);
                break;
            }
        }
        let _ = ws_sender.close().await;
    };

    tokio::select! {
        _ = incoming => {},
        _ = outgoing => {},
    }

    events
        .send(ConnectionEvent::Closed { id })
        .await
        .map_err(|_| ServerError::ChannelClosed("connection events"))?;
    info!("Connection {} ({}) closed", id, addr);
    Ok(())
}

async fn run_idle_checker(handler: EventHandler, timeout: Duration) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1).min(timeout));
    loop {
        ticker.tick().await;
        let evicted = handler.evict_idle(timeout).await;
        if !evicted.is_empty() {
            debug!("Idle check evicted {} players", evicted.len());
        }
    }
}

/// Encodes a message the way it goes out on the wire.
pub fn encode_frame(message: &ServerMessage) -> Result<Message, ServerError> {
    Ok(Message::text(message.to_json()?))
}
