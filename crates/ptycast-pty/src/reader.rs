//! Output reader: PTY master → internal channel.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsFd;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use ptycast_common::{RelayMessage, StartError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::handle::PtyHandle;
use crate::types::{PTY_POLL_INTERVAL, PTY_READ_CHUNK, WORKER_BACKOFF};
use crate::worker::{run_guarded, Flow};

/// Final message published when the child's terminal goes away.
pub const SESSION_ENDED: &str = "Process terminal closed. The session has ended.\n";

// =============================================================================
// SOURCE
// =============================================================================

/// Something the reader can wait on and read from.
pub trait PtySource: Send {
    /// Block up to `timeout` for readable data. `Ok(false)` on timeout.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// The reading half of the PTY master: a duplicated descriptor polled for
/// `POLLIN`.
pub struct MasterReader {
    file: File,
}

impl MasterReader {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

impl PtySource for MasterReader {
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) | Err(Errno::EINTR) => Ok(false),
            // POLLHUP/POLLERR count as readable: the read reports the end.
            Ok(_) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl std::fmt::Debug for MasterReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterReader").finish_non_exhaustive()
    }
}

// =============================================================================
// READER LOOP
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    pub chunk: usize,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            chunk: PTY_READ_CHUNK,
            poll_interval: PTY_POLL_INTERVAL,
            error_backoff: WORKER_BACKOFF,
        }
    }
}

/// One step of the reader at a time; see [`OutputReader::step`].
pub struct OutputReader<S> {
    source: S,
    handle: Arc<PtyHandle>,
    events: mpsc::Sender<RelayMessage>,
    buf: Vec<u8>,
    /// Start of a multi-byte character cut off by the previous read.
    pending: Vec<u8>,
    poll_interval: Duration,
}

impl<S: PtySource> OutputReader<S> {
    pub fn new(
        source: S,
        handle: Arc<PtyHandle>,
        events: mpsc::Sender<RelayMessage>,
        opts: &ReaderOptions,
    ) -> Self {
        Self {
            source,
            handle,
            events,
            buf: vec![0u8; opts.chunk.max(1)],
            pending: Vec::new(),
            poll_interval: opts.poll_interval,
        }
    }

    /// Wait for readiness once and forward whatever is available.
    ///
    /// Stops on EOF or a read error, after closing the PTY. Stops quietly if
    /// something else closed it first.
    pub fn step(&mut self) -> Flow {
        if !self.handle.is_alive() {
            return Flow::Stop;
        }

        match self.source.wait_readable(self.poll_interval) {
            Ok(false) => return Flow::Continue,
            Ok(true) => {}
            Err(e) => return self.end(&format!("poll failed: {e}")),
        }

        match self.source.read(&mut self.buf) {
            Ok(0) => self.end("end of file"),
            Ok(n) => {
                self.pending.extend_from_slice(&self.buf[..n]);
                let cut = self.pending.len() - incomplete_tail(&self.pending);
                let tail = self.pending.split_off(cut);
                let complete = std::mem::replace(&mut self.pending, tail);
                if !complete.is_empty() {
                    self.publish_output(&complete);
                }
                Flow::Continue
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) =>
            {
                Flow::Continue
            }
            Err(e) => self.end(&e.to_string()),
        }
    }

    fn end(&mut self, reason: &str) -> Flow {
        let rest = std::mem::take(&mut self.pending);
        if !rest.is_empty() {
            self.publish_output(&rest);
        }
        if self.handle.close() {
            tracing::error!(reason, "PTY closed, child process has likely exited");
            self.publish(RelayMessage::error(SESSION_ENDED));
        }
        Flow::Stop
    }

    fn publish_output(&self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes).into_owned();
        tracing::info!(bytes = bytes.len(), output = ?text, "PTY output");
        self.publish(RelayMessage::output(text));
    }

    fn publish(&self, message: RelayMessage) {
        match self.events.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Message channel is full, dropping PTY output");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Message channel closed, PTY output discarded");
            }
        }
    }
}

/// Length of a trailing UTF-8 sequence that a read boundary cut short.
///
/// Only the last three bytes can hold such a prefix. Bytes that can never
/// become valid are left for lossy decoding.
fn incomplete_tail(bytes: &[u8]) -> usize {
    let start = bytes.len().saturating_sub(3);
    for i in start..bytes.len() {
        if let Err(e) = std::str::from_utf8(&bytes[i..]) {
            if e.valid_up_to() == 0 && e.error_len().is_none() {
                return bytes.len() - i;
            }
        }
    }
    0
}

/// Start the reader on its own OS thread, named `pty-reader`.
pub fn spawn_output_reader<S: PtySource + 'static>(
    source: S,
    handle: Arc<PtyHandle>,
    events: mpsc::Sender<RelayMessage>,
    cancel: CancellationToken,
    opts: ReaderOptions,
) -> Result<JoinHandle<()>, StartError> {
    let mut reader = OutputReader::new(source, handle, events, &opts);
    thread::Builder::new()
        .name("pty-reader".into())
        .spawn(move || {
            tracing::info!("PTY output reader started");
            run_guarded("pty-reader", &cancel, opts.error_backoff, || reader.step());
            tracing::info!("PTY output reader stopped");
        })
        .map_err(|source| StartError::Thread {
            name: "pty-reader",
            source,
        })
}

// =============================================================================
// TESTS
// =============================================================================
