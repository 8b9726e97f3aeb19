//! Launch description and tuning constants shared by the PTY components.

use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Maximum bytes taken from the PTY in a single read.
pub const PTY_READ_CHUNK: usize = 1024;

/// Readiness poll timeout for the output reader.
pub const PTY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Dequeue timeout for the command writer.
pub const COMMAND_DEQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// Window between SIGTERM and SIGKILL.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Pause after an unexpected failure inside a worker loop.
pub const WORKER_BACKOFF: Duration = Duration::from_millis(500);

/// Default terminal columns.
pub const DEFAULT_COLS: u16 = 80;

/// Default terminal rows.
pub const DEFAULT_ROWS: u16 = 24;

// =============================================================================
// LAUNCH SPEC
// =============================================================================

/// Everything needed to start the child inside a PTY.
///
/// Built by the caller from configuration; the PTY crate treats it as
/// opaque beyond spawning.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    /// `None` inherits the server's working directory.
    pub cwd: Option<PathBuf>,
    /// Extra environment on top of the inherited allowlist.
    pub env: Vec<(String, String)>,
    pub cols: u16,
    pub rows: u16,
    pub terminate_grace: Duration,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            terminate_grace: TERMINATE_GRACE,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    pub fn terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    /// Program plus arguments, for log lines.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_sane() {
        assert_eq!(PTY_READ_CHUNK, 1024);
        assert_eq!(PTY_POLL_INTERVAL, Duration::from_millis(100));
        assert_eq!(TERMINATE_GRACE, Duration::from_secs(5));
        assert_eq!(DEFAULT_COLS, 80);
        assert_eq!(DEFAULT_ROWS, 24);
    }

    #[test]
    fn builder_collects_fields() {
        let spec = LaunchSpec::new("make")
            .arg("-f")
            .arg("Makefile.tmp")
            .cwd("/tmp")
            .env("PYTHONUNBUFFERED", "1")
            .size(120, 40);
        assert_eq!(spec.command_line(), "make -f Makefile.tmp");
        assert_eq!(spec.cwd.as_deref(), Some(std::path::Path::new("/tmp")));
        assert_eq!(spec.env, vec![("PYTHONUNBUFFERED".into(), "1".into())]);
        assert_eq!((spec.cols, spec.rows), (120, 40));
    }
}
