//! Configuration schema types for ptycast.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the defaults the relay ships with.

mod launch;
mod relay;
mod server;
mod session_log;

pub use launch::*;
pub use relay::*;
pub use server::*;
pub use session_log::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for a ptycast server instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PtycastConfig {
    pub server: ServerConfig,
    pub launch: LaunchConfig,
    pub relay: RelayConfig,
    pub session_log: SessionLogConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config: PtycastConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.relay.read_chunk, 1024);
        assert_eq!(config.launch.cols, 80);
        assert_eq!(config.session_log.path, "output/ws.log");
    }

    #[test]
    fn sections_are_independent() {
        let config: PtycastConfig = toml::from_str(
            r#"
[server]
port = 9001

[relay]
acknowledge_commands = false
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(!config.relay.acknowledge_commands);
        assert_eq!(config.relay.command_capacity, 1000);
    }
}
