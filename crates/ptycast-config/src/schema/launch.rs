//! Child process launch configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What to run inside the PTY and where.
///
/// `working_dir_candidates` is searched in order; the first existing
/// directory (containing `marker_file`, when set) wins. If none match, the
/// server's own working directory is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir_candidates: Vec<String>,
    pub marker_file: Option<String>,
    /// Extra environment variables for the child.
    pub env: HashMap<String, String>,
    pub cols: u16,
    pub rows: u16,
    /// Written to the PTY once, after `initial_input_delay_ms`.
    pub initial_input: Option<String>,
    pub initial_input_delay_ms: u64,
    /// Broadcast to clients right after the child starts.
    pub startup_message: Option<String>,
    /// File the child's PID is written to after launch.
    pub pid_file: Option<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            program: "/bin/sh".into(),
            args: Vec::new(),
            working_dir_candidates: Vec::new(),
            marker_file: None,
            env: HashMap::new(),
            cols: 80,
            rows: 24,
            initial_input: None,
            initial_input_delay_ms: 2000,
            startup_message: Some("Connected to process via PTY.\n".into()),
            pid_file: None,
        }
    }
}
