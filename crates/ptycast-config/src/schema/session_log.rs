use serde::{Deserialize, Serialize};

/// Rolling session log on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLogConfig {
    pub enabled: bool,
    pub path: String,
    /// Size at which the file is rotated.
    pub max_bytes: u64,
    /// Number of rotated files kept next to the live one.
    pub keep: usize,
}

impl Default for SessionLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "output/ws.log".into(),
            max_bytes: 5 * 1024 * 1024,
            keep: 3,
        }
    }
}
