//! Error types for the server plumbing.
//!
//! Nothing in the simulation core produces these; they surface from
//! binding, handshakes, configuration and registry misuse.

use shared::PlayerId;
use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A freshly generated id collided with a live session.
    #[error("Player {0} is already registered")]
    DuplicatePlayer(PlayerId),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),
}
