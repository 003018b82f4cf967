use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::ChatId;

/// Payload the gateway sends back when it failed to handle a command.
/// These frames carry no correlation to the command that caused them.
pub const SERVER_ERROR_SENTINEL: &str = "Internal server error";

/// Commands sent FROM client TO gateway over WebSocket.
///
/// Serialized as a flat object: `{"action": "...", ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum GatewayCommand {
    /// Keep-alive. The gateway does not answer it.
    #[serde(rename = "ping")]
    Ping { content: PingContent },

    /// Post a message to a chat
    #[serde(rename = "sendMessage")]
    SendMessage { message: String, group_id: ChatId },
}

/// Placeholder body the gateway expects on a ping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingContent {
    pub group_id: ChatId,
    pub message: String,
}

impl GatewayCommand {
    pub fn ping() -> Self {
        Self::Ping {
            content: PingContent::default(),
        }
    }

    pub fn send_message(message: impl Into<String>, chat_id: ChatId) -> Self {
        Self::SendMessage {
            message: message.into(),
            group_id: chat_id,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Ping { .. } => "ping",
            Self::SendMessage { .. } => "sendMessage",
        }
    }
}

/// Kinds of inbound event. The gateway does not tag its frames yet, so every
/// accepted frame is classified as a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "chat-message")]
    ChatMessage,
}

/// Event published on the message bus for every accepted inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: Value,
}

/// Decode a text frame from the gateway.
///
/// Returns `Ok(None)` for server error frames, which must never be published.
pub fn decode_frame(text: &str) -> Result<Option<GatewayEvent>, serde_json::Error> {
    let data: Value = serde_json::from_str(text)?;

    if data.get("message").and_then(Value::as_str) == Some(SERVER_ERROR_SENTINEL) {
        return Ok(None);
    }

    Ok(Some(GatewayEvent {
        kind: EventKind::ChatMessage,
        data,
    }))
}
