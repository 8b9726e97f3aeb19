//! PTY owner: the master side of the pair and its liveness flag.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use portable_pty::MasterPty;
use ptycast_common::PtyIoError;
use tokio_util::sync::CancellationToken;

// =============================================================================
// PTY HANDLE
// =============================================================================

/// Owns the PTY master for the whole session.
///
/// Liveness flips alive→dead exactly once, from whichever context sees the
/// terminal end first (reader EOF, writer failure, shutdown). Once dead the
/// master is dropped and nothing reads or writes it again.
pub struct PtyHandle {
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    alive: AtomicBool,
    closed: CancellationToken,
}

impl PtyHandle {
    pub(crate) fn new(master: Box<dyn MasterPty + Send>) -> Self {
        Self {
            master: Mutex::new(Some(master)),
            alive: AtomicBool::new(true),
            closed: CancellationToken::new(),
        }
    }

    /// A live handle with no device behind it.
    ///
    /// Used by tests and by callers driving the reader/writer over other
    /// transports.
    pub fn detached() -> Self {
        Self {
            master: Mutex::new(None),
            alive: AtomicBool::new(true),
            closed: CancellationToken::new(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Mark the PTY dead and drop the master.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&self) -> bool {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return false;
        }
        let master = self
            .master
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(master);
        self.closed.cancel();
        tracing::info!("PTY master closed");
        true
    }

    /// Resolves once the PTY has been closed, from any context.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

impl std::fmt::Debug for PtyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyHandle")
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// WRITER
// =============================================================================

/// The only path that writes to the PTY master.
///
/// Owned by the command writer thread; there is never more than one. Its
/// descriptor is released as soon as the PTY is dead so the master side can
/// actually hang up.
pub struct PtyWriter {
    inner: Option<Box<dyn Write + Send>>,
    handle: Arc<PtyHandle>,
}

impl PtyWriter {
    pub fn new(inner: Box<dyn Write + Send>, handle: Arc<PtyHandle>) -> Self {
        Self {
            inner: Some(inner),
            handle,
        }
    }

    /// Forward bytes verbatim. A failed write kills the PTY.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), PtyIoError> {
        if self.release_if_dead() || !self.handle.is_alive() {
            return Err(PtyIoError::Closed);
        }
        let Some(inner) = self.inner.as_mut() else {
            return Err(PtyIoError::Closed);
        };
        if let Err(e) = inner.write_all(bytes).and_then(|()| inner.flush()) {
            tracing::error!(error = %e, "PTY write failed");
            self.handle.close();
            self.release_if_dead();
            return Err(e.into());
        }
        Ok(())
    }

    /// Drop the write descriptor if the PTY has died.
    ///
    /// Returns `true` only for the call that released it.
    pub fn release_if_dead(&mut self) -> bool {
        if self.handle.is_alive() || self.inner.is_none() {
            return false;
        }
        self.inner = None;
        tracing::debug!("PTY writer released");
        true
    }

    #[cfg(test)]
    pub(crate) fn is_released(&self) -> bool {
        self.inner.is_none()
    }
}

// =============================================================================
// TESTS
// =============================================================================
