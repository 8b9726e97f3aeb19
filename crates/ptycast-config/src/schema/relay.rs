use serde::{Deserialize, Serialize};

/// Tuning for the PTY threads and the internal channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Maximum bytes taken from the PTY per read.
    pub read_chunk: usize,
    /// Readiness poll timeout for the output reader.
    pub poll_interval_ms: u64,
    /// Capacity of the reader/writer → broadcast channel.
    pub message_capacity: usize,
    /// Capacity of the client → writer command queue.
    pub command_capacity: usize,
    /// Dequeue timeout for the writer thread.
    pub command_timeout_ms: u64,
    /// Grace window between SIGTERM and SIGKILL.
    pub terminate_grace_secs: u64,
    /// Send an `output` acknowledgment for every queued and written command.
    pub acknowledge_commands: bool,
    /// Pause after an unexpected failure in a relay loop.
    pub error_backoff_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            read_chunk: 1024,
            poll_interval_ms: 100,
            message_capacity: 1000,
            command_capacity: 1000,
            command_timeout_ms: 100,
            terminate_grace_secs: 5,
            acknowledge_commands: true,
            error_backoff_ms: 500,
        }
    }
}
