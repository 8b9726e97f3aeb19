//! Child process supervision: exit polling and process-group termination.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{getpgid, Pid};
use portable_pty::Child;
use ptycast_common::SupervisorError;

/// Interval between exit checks while waiting out the grace window.
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a `terminate()` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Nothing to do: an earlier call already collected the child.
    AlreadyReaped,
    /// The child had exited on its own before `terminate` was called. The
    /// rest of its group was still signalled.
    Exited(u32),
    /// The child exited within the grace window after SIGTERM.
    Graceful(u32),
    /// SIGKILL was needed.
    Forced(u32),
}

/// Owns the child process started on the PTY slave.
///
/// The child runs as a session leader, so its PID doubles as the process
/// group ID and one group signal reaches every descendant.
pub struct Supervisor {
    child: Mutex<Option<Box<dyn Child + Send + Sync>>>,
    pid: Option<u32>,
    pgid: Option<Pid>,
    grace: Duration,
}

impl Supervisor {
    pub(crate) fn new(child: Box<dyn Child + Send + Sync>, grace: Duration) -> Self {
        let pid = child.process_id();
        let pgid = pid.map(|pid| {
            let pid = Pid::from_raw(pid as i32);
            getpgid(Some(pid)).unwrap_or(pid)
        });
        Self {
            child: Mutex::new(Some(child)),
            pid,
            pgid,
            grace,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn pgid(&self) -> Option<i32> {
        self.pgid.map(Pid::as_raw)
    }

    /// Returns `true` while the child has not been observed to exit.
    pub fn is_running(&self) -> bool {
        match self.lock().as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Stop the child and everything left in its process group.
    ///
    /// SIGTERM goes to the group even when the leader has already exited, so
    /// background descendants are not left running. The grace window lasts
    /// until the leader is collected and the group is empty; whatever is
    /// left then gets SIGKILL.
    ///
    /// Idempotent. Once the child has been collected, later calls send no
    /// signal and return [`Termination::AlreadyReaped`].
    pub fn terminate(&self) -> Result<Termination, SupervisorError> {
        let mut guard = self.lock();
        let Some(child) = guard.as_mut() else {
            tracing::debug!("terminate: child already reaped");
            return Ok(Termination::AlreadyReaped);
        };

        let exited_early = match child.try_wait() {
            Ok(Some(status)) => Some(status.exit_code()),
            _ => None,
        };

        tracing::info!(pid = ?self.pid, pgid = ?self.pgid(), "Terminating child process group");
        self.signal_group(Signal::SIGTERM)?;

        let mut code = exited_early;
        let deadline = Instant::now() + self.grace;
        loop {
            if code.is_none() {
                match child.try_wait() {
                    Ok(Some(status)) => code = Some(status.exit_code()),
                    Ok(None) => {}
                    Err(e) => return Err(SupervisorError::Wait(e)),
                }
            }
            if code.is_some() && !self.group_alive() {
                break;
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(REAP_POLL_INTERVAL);
        }

        if let (Some(code), false) = (code, self.group_alive()) {
            *guard = None;
            return Ok(match exited_early {
                Some(early) => Termination::Exited(early),
                None => Termination::Graceful(code),
            });
        }

        tracing::warn!(
            pid = ?self.pid,
            grace = ?self.grace,
            "Child process group didn't terminate gracefully, killing it"
        );
        if self.pgid.is_some() {
            self.signal_group(Signal::SIGKILL)?;
        } else if let Err(e) = child.kill() {
            tracing::debug!("kill error (may already be dead): {e}");
        }

        let code = match code {
            Some(code) => code,
            None => child.wait().map_err(SupervisorError::Wait)?.exit_code(),
        };
        *guard = None;
        Ok(match exited_early {
            Some(early) => Termination::Exited(early),
            None => Termination::Forced(code),
        })
    }

    /// Whether any process is still a member of the child's group.
    fn group_alive(&self) -> bool {
        match self.pgid {
            Some(pgid) => !matches!(killpg(pgid, None), Err(Errno::ESRCH)),
            None => false,
        }
    }

    fn signal_group(&self, signal: Signal) -> Result<(), SupervisorError> {
        let Some(pgid) = self.pgid else {
            return Ok(());
        };
        match killpg(pgid, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(SupervisorError::Signal {
                pgid: pgid.as_raw(),
                reason: e.to_string(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn Child + Send + Sync>>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("pid", &self.pid)
            .field("pgid", &self.pgid())
            .field("grace", &self.grace)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::spawn::start;
    use crate::types::LaunchSpec;

    fn sh(script: &str, grace: Duration) -> crate::spawn::PtySession {
        let spec = LaunchSpec::new("/bin/sh")
            .arg("-c")
            .arg(script)
            .terminate_grace(grace);
        start(&spec).expect("spawn sh")
    }

    #[test]
    fn child_is_its_own_process_group() {
        let session = sh("sleep 30", Duration::from_secs(1));
        let sup = &session.supervisor;
        assert!(sup.pid().is_some());
        assert_eq!(sup.pgid(), sup.pid().map(|p| p as i32));
        sup.terminate().unwrap();
    }

    #[test]
    fn terminate_is_graceful_for_cooperative_child() {
        let session = sh("sleep 30", Duration::from_secs(5));
        assert!(session.supervisor.is_running());

        let outcome = session.supervisor.terminate().unwrap();
        assert!(matches!(outcome, Termination::Graceful(_)), "{outcome:?}");
        assert!(!session.supervisor.is_running());
    }

    #[test]
    fn terminate_twice_is_a_no_op() {
        let session = sh("sleep 30", Duration::from_secs(5));
        session.supervisor.terminate().unwrap();

        let second = session.supervisor.terminate().unwrap();
        assert_eq!(second, Termination::AlreadyReaped);
    }

    #[test]
    fn terminate_escalates_when_sigterm_is_ignored() {
        let session = sh("trap '' TERM; sleep 30", Duration::from_millis(300));
        // Give the shell time to install the trap.
        thread::sleep(Duration::from_millis(200));

        let started = Instant::now();
        let outcome = session.supervisor.terminate().unwrap();
        assert!(matches!(outcome, Termination::Forced(_)), "{outcome:?}");
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn exited_child_is_collected_without_signals() {
        let session = sh("exit 3", Duration::from_secs(5));
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.supervisor.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }

        let outcome = session.supervisor.terminate().unwrap();
        assert_eq!(outcome, Termination::Exited(3));
        assert_eq!(session.supervisor.terminate().unwrap(), Termination::AlreadyReaped);
    }

    /// True once `pid` no longer exists or is a zombie awaiting its reaper.
    #[cfg(target_os = "linux")]
    fn gone(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn terminate_reaches_descendants_of_an_exited_leader() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("background.pid");
        let script = format!(
            "(trap '' HUP; sleep 300) & echo $! > {}; exit 0",
            pid_path.display()
        );
        let session = sh(&script, Duration::from_secs(2));

        let deadline = Instant::now() + Duration::from_secs(5);
        let background = loop {
            let pid = std::fs::read_to_string(&pid_path)
                .ok()
                .and_then(|text| text.trim().parse::<i32>().ok());
            match pid {
                Some(pid) if !session.supervisor.is_running() => break pid,
                _ if Instant::now() >= deadline => panic!("leader never exited"),
                _ => thread::sleep(Duration::from_millis(20)),
            }
        };
        assert!(!gone(background));

        let outcome = session.supervisor.terminate().unwrap();
        assert_eq!(outcome, Termination::Exited(0));

        let deadline = Instant::now() + Duration::from_secs(2);
        while !gone(background) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(gone(background), "background process {background} survived");
    }
}
