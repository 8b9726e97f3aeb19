use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failure to bring the terminal session up. Fatal to session start.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("failed to open PTY: {0}")]
    OpenPty(String),

    #[error("working directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("failed to attach to PTY master: {0}")]
    Attach(String),

    #[error("failed to start {name} thread: {source}")]
    Thread {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Device read/write failure on the PTY master.
#[derive(Debug, thiserror::Error)]
pub enum PtyIoError {
    #[error("PTY is closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Back-pressure signal from the command queue. Never blocks the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("command queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("command writer is not running")]
    Closed,
}

/// Malformed client frame. Reported only to the offending client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unsupported frame: {0}")]
    UnsupportedFrame(String),
}

/// Per-client send failure during broadcast.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("client connection closed")]
    Closed,

    #[error("client did not accept frame within {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to signal process group {pgid}: {reason}")]
    Signal { pgid: i32, reason: String },

    #[error("failed to wait for child: {0}")]
    Wait(#[source] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Start(#[from] StartError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),
}
