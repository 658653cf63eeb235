//! # Position Server Library
//!
//! Authoritative server for a real-time multiplayer world where every player
//! is a point moving on a plane. Clients stream movement intents over a
//! WebSocket; the server integrates them at a fixed tick rate and broadcasts
//! the resulting positions to everyone.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Clients never report positions, only intents (`dx`, `dy` in `[-1, 1]`,
//! plus a client-assigned sequence number). The server clamps, integrates and
//! decays velocity with friction. Its result is the only truth.
//!
//! ### Reconciliation Support
//! Every snapshot carries each player's `seq_ack`, the sequence number of the
//! last intent folded into the authoritative state. A predicting client
//! replays its unacknowledged intents on top of the server position.
//!
//! ### State Broadcasting
//! After every tick a snapshot of all players is sent to all connections,
//! either as one batched `update_state` message or as one `update_position`
//! message per player. Delivery is best-effort: the next tick supersedes a
//! lost snapshot.
//!
//! ## Architecture Design
//!
//! ```text
//!  socket tasks ──ConnectionEvent──▶ EventHandler ──┐
//!        ▲                                          ▼
//!        │ outbound queues                   SessionRegistry (RwLock)
//!        │                                          ▲
//!        └──────────── broadcast ◀── GameLoop ──────┘
//! ```
//!
//! - [`network`]: WebSocket accept loop and per-connection reader/writer.
//! - [`handler`]: turns connect/message/close events into registry changes.
//! - [`registry`]: the id → player map, one input queue per player.
//! - [`input_queue`]: per-player FIFO safe under concurrent push and drain.
//! - [`simulation`]: the fixed-step integration.
//! - [`broadcast`]: snapshot messages and non-blocking fan-out.
//! - [`game`]: the periodic tick driver.
//! - [`config`]: tunables and their validation.
//!
//! Registry membership changes and the tick are serialized by the registry
//! write lock, so no tick ever observes a half-joined or half-removed player.
//! Input submission takes only the read lock and the target queue's mutex.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         port: 9090,
//!         tick_rate: 20,
//!         ..ServerConfig::default()
//!     };
//!
//!     // Binds, then runs the accept loop, the event handler and the
//!     // game loop until the process exits
//!     Server::bind(config).await?.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod game;
pub mod handler;
pub mod input_queue;
pub mod network;
pub mod registry;
pub mod simulation;
pub mod utils;

pub use config::{AckPolicy, BroadcastMode, ServerConfig, SpawnRegion};
pub use error::ServerError;
