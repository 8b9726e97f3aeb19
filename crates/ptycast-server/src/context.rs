//! State shared by every task of one relay instance.

use std::sync::Arc;
use std::time::Duration;

use ptycast_config::ServerConfig;
use ptycast_pty::{CommandQueue, PtyHandle};
use tokio_util::sync::CancellationToken;

use crate::registry::Registry;

/// Built once at startup and handed to each connection behind an `Arc`.
#[derive(Debug)]
pub struct RelayContext {
    pub server: ServerConfig,
    /// Reply with an `output` frame when a command is queued.
    pub acknowledge: bool,
    pub registry: Registry,
    pub commands: CommandQueue,
    pub pty: Arc<PtyHandle>,
    pub cancel: CancellationToken,
}

impl RelayContext {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.server.send_timeout_ms)
    }

    pub fn keepalive(&self) -> Option<Duration> {
        let secs = self.server.keepalive_secs;
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    /// Silence after which a client is dropped. Only applies while
    /// keepalive pings are on.
    pub fn keepalive_timeout(&self) -> Option<Duration> {
        self.keepalive()?;
        let secs = self.server.keepalive_timeout_secs;
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}
