use serde::{Deserialize, Serialize};

/// WebSocket listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address. Loopback only unless deliberately changed.
    pub host: String,
    pub port: u16,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
    /// Interval between server keepalive pings. `0` disables them.
    pub keepalive_secs: u64,
    /// Close a client that has sent nothing, not even a Pong, for this long.
    /// `0` keeps silent clients forever.
    pub keepalive_timeout_secs: u64,
    /// How long a broadcast waits on one client's outbound queue.
    pub send_timeout_ms: u64,
    /// Frames buffered per client between the broadcast loop and its socket.
    pub outbound_capacity: usize,
    /// First frame each client receives after the handshake.
    pub welcome_message: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            max_message_size: 1 << 20,
            keepalive_secs: 20,
            keepalive_timeout_secs: 40,
            send_timeout_ms: 1000,
            outbound_capacity: 256,
            welcome_message:
                "Connected to ptycast PTY WebSocket. Type commands to interact with the process.\n"
                    .into(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
