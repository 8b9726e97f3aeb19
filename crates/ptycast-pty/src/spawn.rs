//! PTY spawn logic: open the pair, launch the child, split the master into
//! its reader and writer halves.

use std::fs::File;
use std::os::fd::BorrowedFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use ptycast_common::StartError;

use crate::handle::{PtyHandle, PtyWriter};
use crate::reader::MasterReader;
use crate::supervisor::Supervisor;
use crate::types::LaunchSpec;

// =============================================================================
// ENVIRONMENT SANITIZATION
// =============================================================================

/// Environment variables inherited by the child.
///
/// Anything else (API keys, tokens) stays out of the relayed session unless
/// `LaunchSpec::env` adds it explicitly.
const ALLOWED_ENV_VARS: &[&str] = &[
    "HOME",
    "USER",
    "LOGNAME",
    "SHELL",
    "PATH",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "TMPDIR",
    "TMP",
    "TEMP",
    "VIRTUAL_ENV",
    "CONDA_PREFIX",
];

/// Build a sanitized `CommandBuilder` for the launch spec.
fn build_command(spec: &LaunchSpec) -> CommandBuilder {
    let mut cmd = CommandBuilder::new(&spec.program);
    cmd.args(&spec.args);

    cmd.env_clear();
    for key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }
    cmd.env("TERM", "xterm-256color");
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    if let Some(dir) = &spec.cwd {
        cmd.cwd(dir);
    }

    cmd
}

// =============================================================================
// WORKING DIRECTORY FALLBACK
// =============================================================================

/// Pick the first candidate directory that exists and, when `marker` is
/// given, contains that file. Falls back to the server's own directory.
pub fn resolve_working_dir(candidates: &[PathBuf], marker: Option<&str>) -> PathBuf {
    if let Some(dir) = candidates.iter().find(|dir| dir_matches(dir, marker)) {
        tracing::info!(dir = %dir.display(), "Found working directory");
        return dir.clone();
    }

    let fallback = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if !candidates.is_empty() {
        tracing::warn!(
            candidates = candidates.len(),
            marker = ?marker,
            fallback = %fallback.display(),
            "No candidate working directory matched, falling back to current directory"
        );
    }
    fallback
}

fn dir_matches(dir: &Path, marker: Option<&str>) -> bool {
    dir.is_dir() && marker.map_or(true, |m| dir.join(m).exists())
}

// =============================================================================
// SPAWN
// =============================================================================

/// A started terminal session, split into the parts each thread owns.
pub struct PtySession {
    pub handle: Arc<PtyHandle>,
    pub supervisor: Supervisor,
    pub reader: MasterReader,
    pub writer: PtyWriter,
}

/// Allocate a PTY pair and start the child on its slave end.
///
/// The child gets the slave as its controlling terminal and runs in a new
/// session, so it leads its own process group. The parent keeps only the
/// master; the slave is dropped before returning.
pub fn start(spec: &LaunchSpec) -> Result<PtySession, StartError> {
    if let Some(dir) = &spec.cwd {
        if !dir.is_dir() {
            return Err(StartError::MissingDirectory(dir.clone()));
        }
    }

    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: spec.rows,
            cols: spec.cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| StartError::OpenPty(e.to_string()))?;

    let child = pair
        .slave
        .spawn_command(build_command(spec))
        .map_err(|e| StartError::Spawn {
            program: spec.program.clone(),
            reason: e.to_string(),
        })?;

    // Drop the slave side; the child holds its own copy.
    drop(pair.slave);

    let writer = pair
        .master
        .take_writer()
        .map_err(|e| StartError::Attach(format!("failed to take PTY writer: {e}")))?;

    let raw_fd = pair
        .master
        .as_raw_fd()
        .ok_or_else(|| StartError::Attach("PTY master has no file descriptor".into()))?;
    // SAFETY: `raw_fd` belongs to `pair.master`, which is alive for the
    // duration of this borrow; the clone gets its own descriptor.
    let reader_fd = unsafe { BorrowedFd::borrow_raw(raw_fd) }
        .try_clone_to_owned()
        .map_err(|e| StartError::Attach(format!("failed to clone PTY master: {e}")))?;

    let supervisor = Supervisor::new(child, spec.terminate_grace);
    tracing::info!(
        pid = ?supervisor.pid(),
        command = %spec.command_line(),
        cwd = ?spec.cwd,
        "Child process started on PTY"
    );

    let handle = Arc::new(PtyHandle::new(pair.master));
    Ok(PtySession {
        reader: MasterReader::new(File::from(reader_fd)),
        writer: PtyWriter::new(writer, Arc::clone(&handle)),
        handle,
        supervisor,
    })
}

/// Start the child in the first usable candidate directory.
///
/// Directories come from [`resolve_working_dir`]. A candidate whose spawn
/// fails is logged and resolution resumes after it. The server's own
/// directory is the last resort, and its error is the one returned.
pub fn start_with_fallback(
    spec: &LaunchSpec,
    candidates: &[PathBuf],
    marker: Option<&str>,
) -> Result<PtySession, StartError> {
    let mut rest = candidates;
    loop {
        let dir = resolve_working_dir(rest, marker);
        let position = rest.iter().position(|candidate| *candidate == dir);
        let attempt = LaunchSpec {
            cwd: Some(dir),
            ..spec.clone()
        };
        let Some(position) = position else {
            return start(&attempt);
        };
        match start(&attempt) {
            Ok(session) => return Ok(session),
            Err(e) => {
                tracing::warn!(
                    dir = ?attempt.cwd,
                    error = %e,
                    "Start failed, trying next directory"
                );
                rest = &rest[position + 1..];
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_env_vars_contains_essentials() {
        assert!(ALLOWED_ENV_VARS.contains(&"HOME"));
        assert!(ALLOWED_ENV_VARS.contains(&"PATH"));
        assert!(ALLOWED_ENV_VARS.contains(&"USER"));
    }

    #[test]
    fn allowed_env_vars_excludes_secrets() {
        for var in ALLOWED_ENV_VARS {
            let lower = var.to_lowercase();
            for needle in ["key", "secret", "token", "password"] {
                assert!(
                    !lower.contains(needle),
                    "ALLOWED_ENV_VARS should not contain '{var}'"
                );
            }
        }
    }

    #[test]
    fn resolve_prefers_first_match_with_marker() {
        let root = tempfile::tempdir().unwrap();
        let bare = root.path().join("bare");
        let agent = root.path().join("agent");
        std::fs::create_dir_all(&bare).unwrap();
        std::fs::create_dir_all(&agent).unwrap();
        std::fs::write(agent.join("Makefile"), "all:\n").unwrap();

        let candidates = vec![root.path().join("missing"), bare.clone(), agent.clone()];
        assert_eq!(resolve_working_dir(&candidates, Some("Makefile")), agent);
        assert_eq!(resolve_working_dir(&candidates, None), bare);
    }

    #[test]
    fn resolve_falls_back_to_current_dir() {
        let candidates = vec![PathBuf::from("/definitely/not/here")];
        let resolved = resolve_working_dir(&candidates, Some("Makefile"));
        assert_eq!(resolved, std::env::current_dir().unwrap());
    }

    #[test]
    fn start_rejects_missing_directory() {
        let spec = LaunchSpec::new("/bin/sh").cwd("/definitely/not/here");
        let err = start(&spec).err().expect("should fail");
        assert!(matches!(err, StartError::MissingDirectory(_)));
    }

    #[test]
    #[cfg(unix)]
    fn start_rejects_missing_executable() {
        let spec = LaunchSpec::new("/definitely/not/a/program");
        let err = start(&spec).err().expect("should fail");
        assert!(matches!(err, StartError::Spawn { .. }), "{err}");
    }

    #[test]
    #[cfg(unix)]
    fn start_runs_in_requested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let spec = LaunchSpec::new("/bin/sh")
            .arg("-c")
            .arg("sleep 30")
            .cwd(dir.path());
        let session = start(&spec).expect("spawn sh");
        assert!(session.handle.is_alive());
        assert!(session.supervisor.pid().is_some());
        session.supervisor.terminate().unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn fallback_skips_candidates_without_marker() {
        let root = tempfile::tempdir().unwrap();
        let good = root.path().join("good");
        std::fs::create_dir_all(&good).unwrap();
        std::fs::write(good.join("marker"), "").unwrap();

        let spec = LaunchSpec::new("/bin/sh").arg("-c").arg("sleep 30");
        let candidates = vec![root.path().to_path_buf(), good];
        let session = start_with_fallback(&spec, &candidates, Some("marker")).expect("spawn sh");
        assert!(session.handle.is_alive());
        session.supervisor.terminate().unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn fallback_reports_last_error_when_every_directory_fails() {
        let root = tempfile::tempdir().unwrap();
        let spec = LaunchSpec::new("/definitely/not/a/program");
        let candidates = vec![root.path().to_path_buf()];
        let err = start_with_fallback(&spec, &candidates, None)
            .err()
            .expect("should fail");
        assert!(matches!(err, StartError::Spawn { .. }), "{err}");
    }
}
