//! JSON text frames exchanged with WebSocket clients.
//!
//! Every frame carries a `type` discriminator; server frames always have a
//! string `data` field.

use ptycast_common::{MessageKind, ProtocolError, RelayMessage};
use serde::{Deserialize, Serialize};

/// Longest prefix of a malformed frame echoed back in the error.
const INVALID_FRAME_PREVIEW: usize = 100;

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// A command line for the process. A missing `data` is an empty line.
    #[serde(rename = "input")]
    Input {
        #[serde(default)]
        data: String,
    },

    #[serde(rename = "ping")]
    Ping,
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerFrame {
    #[serde(rename = "output")]
    Output(String),

    #[serde(rename = "echo")]
    Echo(String),

    #[serde(rename = "pong")]
    Pong(String),

    #[serde(rename = "error")]
    Error(String),
}

impl ServerFrame {
    pub fn pong() -> Self {
        Self::Pong("alive".into())
    }

    pub fn to_json(&self) -> String {
        // Only string payloads: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl From<RelayMessage> for ServerFrame {
    fn from(message: RelayMessage) -> Self {
        match message.kind {
            MessageKind::Output => Self::Output(message.payload),
            MessageKind::Error => Self::Error(message.payload),
        }
    }
}

impl From<ProtocolError> for ServerFrame {
    fn from(err: ProtocolError) -> Self {
        Self::Error(err.to_string())
    }
}

/// Parse one text frame from a client.
///
/// Text that is not JSON at all is [`ProtocolError::InvalidJson`] and
/// quotes the start of the frame; well-formed JSON with an unknown or
/// missing `type` is [`ProtocolError::UnsupportedFrame`].
pub fn parse_client_frame(text: &str) -> Result<ClientFrame, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|_| {
        let preview: String = text.chars().take(INVALID_FRAME_PREVIEW).collect();
        ProtocolError::InvalidJson(format!("{preview}..."))
    })?;
    serde_json::from_value(value).map_err(|e| ProtocolError::UnsupportedFrame(e.to_string()))
}
