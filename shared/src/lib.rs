//! Wire protocol shared by the position server and its clients.
//!
//! Every frame is a JSON envelope `{ "cmd": ..., "content": { ... } }`.
//! Outbound messages are strongly typed ([`ServerMessage`]); inbound input
//! submissions are decoded leniently because clients are untrusted and the
//! protocol promises that bad numeric fields default to zero instead of
//! rejecting the whole frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_PORT: u16 = 9090;
pub const DEFAULT_TICK_RATE: u32 = 20;
pub const PLAYER_SPEED: f32 = 180.0;
pub const FRICTION: f32 = 0.9;
pub const SPAWN_MIN_X: f32 = 100.0;
pub const SPAWN_MIN_Y: f32 = 100.0;
pub const SPAWN_WIDTH: f32 = 400.0;
pub const SPAWN_HEIGHT: f32 = 400.0;

/// Session-scoped player identity, a random v4 UUID on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(PlayerId)
    }
}

/// One movement intent as submitted by a client.
///
/// `dx`/`dy` are kept exactly as received; clamping happens in the
/// simulation step, never at decode time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputIntent {
    pub seq: u64,
    pub dx: f32,
    pub dy: f32,
    pub t: u64,
    #[serde(default = "empty_actions")]
    pub actions: Value,
}

fn empty_actions() -> Value {
    Value::Object(serde_json::Map::new())
}

impl InputIntent {
    pub fn new(seq: u64, dx: f32, dy: f32, t: u64) -> Self {
        Self {
            seq,
            dx,
            dy,
            t,
            actions: empty_actions(),
        }
    }

    /// Builds an intent from an arbitrary JSON value.
    ///
    /// Missing or non-numeric `seq`/`dx`/`dy` become 0, a missing `t` becomes
    /// `received_at` and missing `actions` become an empty object.
    pub fn from_value(value: &Value, received_at: u64) -> Self {
        let seq = coerce_number(value.get("seq"));
        let seq = if seq.is_finite() && seq >= 1.0 {
            seq.trunc() as u64
        } else {
            0
        };

        let t = coerce_number(value.get("t"));
        let t = if t.is_finite() && t >= 1.0 {
            t as u64
        } else {
            received_at
        };

        let actions = match value.get("actions") {
            Some(Value::Null) | None => empty_actions(),
            Some(actions) => actions.clone(),
        };

        Self {
            seq,
            dx: coerce_number(value.get("dx")) as f32,
            dy: coerce_number(value.get("dy")) as f32,
            t,
            actions,
        }
    }
}

/// Loose numeric coercion: numbers pass through, numeric strings are
/// parsed, booleans map to 1/0 and everything else (including NaN) is 0.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse::<f64>().unwrap_or(0.0)
            }
        }
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    };
    if n.is_nan() {
        0.0
    } else {
        n
    }
}

/// A decoded `player_input` command.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSubmission {
    /// Target player, `None` when absent or not a valid UUID.
    pub uuid: Option<PlayerId>,
    pub inputs: Vec<InputIntent>,
}

/// Commands a client can send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    PlayerInput(InputSubmission),
    /// Well-formed envelope with a command this server does not handle.
    Unknown(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct Envelope {
    cmd: String,
    #[serde(default)]
    content: Value,
}

/// Decodes one inbound text frame.
///
/// Only an unparseable envelope is an error; any field-level problem inside
/// a `player_input` command is defaulted.
pub fn decode_client_message(text: &str, received_at: u64) -> Result<ClientCommand, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text)?;

    match envelope.cmd.as_str() {
        "player_input" => {
            let uuid = envelope
                .content
                .get("uuid")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok());

            let inputs = match envelope.content.get("inputs") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| InputIntent::from_value(item, received_at))
                    .collect(),
                _ => Vec::new(),
            };

            Ok(ClientCommand::PlayerInput(InputSubmission { uuid, inputs }))
        }
        other => Ok(ClientCommand::Unknown(other.to_string())),
    }
}

/// Messages a client sends, used by the test client and tests.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "cmd", content = "content", rename_all = "snake_case")]
pub enum ClientMessage {
    PlayerInput {
        uuid: PlayerId,
        inputs: Vec<InputIntent>,
    },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Position-only view of a player used by the spawn messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub uuid: PlayerId,
    pub x: f32,
    pub y: f32,
}

/// Authoritative per-player state in a snapshot.
///
/// `seq_ack` is the owner's acknowledgment used for reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerUpdate {
    pub uuid: PlayerId,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub seq_ack: u64,
    pub t: u64,
}

/// Messages produced by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "content", rename_all = "snake_case")]
pub enum ServerMessage {
    JoinedServer { uuid: PlayerId },
    SpawnLocalPlayer { uuid: PlayerId, x: f32, y: f32 },
    SpawnNewPlayer { player: PlayerSummary },
    SpawnNetworkPlayers { players: Vec<PlayerSummary> },
    UpdateState { players: Vec<PlayerUpdate>, t: u64 },
    UpdatePosition(PlayerUpdate),
    PlayerDisconnected { uuid: PlayerId },
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Returns true if this message carries state for `id`.
    pub fn references(&self, id: PlayerId) -> bool {
        match self {
            ServerMessage::JoinedServer { uuid }
            | ServerMessage::SpawnLocalPlayer { uuid, .. }
            | ServerMessage::PlayerDisconnected { uuid } => *uuid == id,
            ServerMessage::SpawnNewPlayer { player } => player.uuid == id,
            ServerMessage::SpawnNetworkPlayers { players } => players.iter().any(|p| p.uuid == id),
            ServerMessage::UpdateState { players, .. } => players.iter().any(|p| p.uuid == id),
            ServerMessage::UpdatePosition(update) => update.uuid == id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use serde_json::json;

    const NOW: u64 = 1_700_000_000_000;

    fn decode_inputs(text: &str) -> InputSubmission {
        match decode_client_message(text, NOW).unwrap() {
            ClientCommand::PlayerInput(submission) => submission,
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_player_id_display_roundtrip() {
        let id = PlayerId::new();
        let parsed: PlayerId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<PlayerId>().is_err());
    }

    #[test]
    fn test_player_id_serializes_as_plain_string() {
        let id = PlayerId::new();
        let value = serde_json::to_value(id).unwrap();
        assert_eq!(value, json!(id.to_string()));
    }

    #[test]
    fn test_decode_player_input() {
        let id = PlayerId::new();
        let text = json!({
            "cmd": "player_input",
            "content": {
                "uuid": id.to_string(),
                "inputs": [
                    { "seq": 1, "dx": 1, "dy": -0.5, "t": 42, "actions": { "fire": true } },
                    { "seq": 2, "dx": 0, "dy": 0, "t": 43 }
                ]
            }
        })
        .to_string();

        let submission = decode_inputs(&text);
        assert_eq!(submission.uuid, Some(id));
        assert_eq!(submission.inputs.len(), 2);

        let first = &submission.inputs[0];
        assert_eq!(first.seq, 1);
        assert_approx_eq!(first.dx, 1.0);
        assert_approx_eq!(first.dy, -0.5);
        assert_eq!(first.t, 42);
        assert_eq!(first.actions, json!({ "fire": true }));

        assert_eq!(submission.inputs[1].actions, json!({}));
    }

    #[test]
    fn test_decode_defaults_bad_numeric_fields() {
        let text = json!({
            "cmd": "player_input",
            "content": {
                "uuid": PlayerId::new().to_string(),
                "inputs": [
                    { "seq": "abc", "dx": null, "dy": "0.25" },
                    { "seq": "7", "dx": true, "dy": [1, 2] },
                    { "dx": 5.0 },
                    17
                ]
            }
        })
        .to_string();

        let inputs = decode_inputs(&text).inputs;
        assert_eq!(inputs.len(), 4);

        assert_eq!(inputs[0].seq, 0);
        assert_approx_eq!(inputs[0].dx, 0.0);
        assert_approx_eq!(inputs[0].dy, 0.25);
        assert_eq!(inputs[0].t, NOW);

        assert_eq!(inputs[1].seq, 7);
        assert_approx_eq!(inputs[1].dx, 1.0);
        assert_approx_eq!(inputs[1].dy, 0.0);

        // Out-of-range axes are not clamped at decode time
        assert_approx_eq!(inputs[2].dx, 5.0);
        assert_eq!(inputs[2].seq, 0);

        assert_eq!(inputs[3], InputIntent::new(0, 0.0, 0.0, NOW));
    }

    #[test]
    fn test_decode_negative_and_fractional_seq() {
        let text = json!({
            "cmd": "player_input",
            "content": {
                "uuid": PlayerId::new().to_string(),
                "inputs": [{ "seq": -3 }, { "seq": 4.9 }]
            }
        })
        .to_string();

        let inputs = decode_inputs(&text).inputs;
        assert_eq!(inputs[0].seq, 0);
        assert_eq!(inputs[1].seq, 4);
    }

    #[test]
    fn test_decode_missing_content_and_inputs() {
        let submission = decode_inputs(r#"{"cmd":"player_input"}"#);
        assert_eq!(submission.uuid, None);
        assert!(submission.inputs.is_empty());

        let submission = decode_inputs(r#"{"cmd":"player_input","content":{"uuid":"x","inputs":"nope"}}"#);
        assert_eq!(submission.uuid, None);
        assert!(submission.inputs.is_empty());
    }

    #[test]
    fn test_decode_unknown_command() {
        let cmd = decode_client_message(r#"{"cmd":"chat","content":{"text":"hi"}}"#, NOW).unwrap();
        assert_eq!(cmd, ClientCommand::Unknown("chat".to_string()));
    }

    #[test]
    fn test_decode_malformed_frame() {
        assert!(decode_client_message("{not json", NOW).is_err());
        assert!(decode_client_message(r#"{"content":{}}"#, NOW).is_err());
        assert!(decode_client_message("[]", NOW).is_err());
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(None), 0.0);
        assert_eq!(coerce_number(Some(&json!(2.5))), 2.5);
        assert_eq!(coerce_number(Some(&json!(" 3 "))), 3.0);
        assert_eq!(coerce_number(Some(&json!(""))), 0.0);
        assert_eq!(coerce_number(Some(&json!("NaN"))), 0.0);
        assert_eq!(coerce_number(Some(&json!(false))), 0.0);
        assert_eq!(coerce_number(Some(&json!({ "a": 1 }))), 0.0);
    }

    #[test]
    fn test_server_message_envelope_shape() {
        let id = PlayerId::new();
        let message = ServerMessage::SpawnLocalPlayer {
            uuid: id,
            x: 120.0,
            y: 300.5,
        };

        let value: Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(value["cmd"], "spawn_local_player");
        assert_eq!(value["content"]["uuid"], json!(id.to_string()));
        assert_eq!(value["content"]["x"], json!(120.0));
    }

    #[test]
    fn test_update_state_shape() {
        let id = PlayerId::new();
        let message = ServerMessage::UpdateState {
            players: vec![PlayerUpdate {
                uuid: id,
                x: 1.0,
                y: 2.0,
                vx: 3.0,
                vy: 4.0,
                seq_ack: 9,
                t: 55,
            }],
            t: 55,
        };

        let value: Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(value["cmd"], "update_state");
        assert_eq!(value["content"]["t"], 55);
        assert_eq!(value["content"]["players"][0]["seq_ack"], 9);
        assert_eq!(value["content"]["players"][0]["uuid"], json!(id.to_string()));
    }

    #[test]
    fn test_update_position_is_flat_content() {
        let id = PlayerId::new();
        let message = ServerMessage::UpdatePosition(PlayerUpdate {
            uuid: id,
            x: 1.0,
            y: 2.0,
            vx: 0.0,
            vy: 0.0,
            seq_ack: 3,
            t: 10,
        });

        let text = message.to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["cmd"], "update_position");
        assert_eq!(value["content"]["seq_ack"], 3);
        assert_eq!(ServerMessage::from_json(&text).unwrap(), message);
    }

    #[test]
    fn test_client_message_decodes_on_server_side() {
        let id = PlayerId::new();
        let message = ClientMessage::PlayerInput {
            uuid: id,
            inputs: vec![InputIntent::new(5, 1.0, 0.0, 99)],
        };

        let submission = decode_inputs(&message.to_json().unwrap());
        assert_eq!(submission.uuid, Some(id));
        assert_eq!(submission.inputs, vec![InputIntent::new(5, 1.0, 0.0, 99)]);
    }

    #[test]
    fn test_message_references() {
        let a = PlayerId::new();
        let b = PlayerId::new();

        let update = ServerMessage::UpdateState {
            players: vec![PlayerUpdate {
                uuid: a,
                x: 0.0,
                y: 0.0,
                vx: 0.0,
                vy: 0.0,
                seq_ack: 0,
                t: 0,
            }],
            t: 0,
        };
        assert!(update.references(a));
        assert!(!update.references(b));
        assert!(ServerMessage::PlayerDisconnected { uuid: b }.references(b));
    }
}
