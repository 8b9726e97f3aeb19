//! Internal messages flowing from the PTY threads to the broadcast loop.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Output,
    Error,
}

/// One unit of fan-out. Consumed at most once by the broadcast loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub kind: MessageKind,
    pub payload: String,
}

impl RelayMessage {
    pub fn output(payload: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Output,
            payload: payload.into(),
        }
    }

    pub fn error(payload: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            payload: payload.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }
}
