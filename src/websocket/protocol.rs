use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::error::RelayError;

/// Inbound frame after validation. Outbound frames are plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Join { room_id: String },
    Chat { message: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct JoinPayload {
    #[serde(rename = "roomId", default)]
    room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatPayload {
    #[serde(default)]
    message: Option<String>,
}

impl ClientMessage {
    /// Parses a `{"type": ..., "payload": {...}}` text frame.
    ///
    /// Empty or missing `roomId`/`message` fields are rejected here, so a
    /// `ClientMessage` always carries non-empty content.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| RelayError::Malformed(e.to_string()))?;

        match envelope.kind.as_str() {
            "join" => {
                let payload: JoinPayload = payload_as(envelope.payload)?;
                match payload.room_id {
                    Some(room_id) if !room_id.is_empty() => Ok(ClientMessage::Join { room_id }),
                    _ => Err(RelayError::MissingRoomId),
                }
            }
            "chat" => {
                let payload: ChatPayload = payload_as(envelope.payload)?;
                match payload.message {
                    Some(message) if !message.is_empty() => Ok(ClientMessage::Chat { message }),
                    _ => Err(RelayError::MissingMessage),
                }
            }
            other => Err(RelayError::UnknownType(other.to_string())),
        }
    }
}

fn payload_as<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, RelayError> {
    if payload.is_null() {
        return Err(RelayError::Malformed("missing payload".to_string()));
    }
    serde_json::from_value(payload).map_err(|e| RelayError::Malformed(e.to_string()))
}

/// Membership change notice sent to the members of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Joined(usize),
    Left(usize),
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (headline, count) = match self {
            Presence::Joined(n) => ("A new user has joined.", *n),
            Presence::Left(n) => ("A user has left.", *n),
        };
        let plural = if count > 1 { "s" } else { "" };
        write!(f, "{} ({} user{} in room)", headline, count, plural)
    }
}
