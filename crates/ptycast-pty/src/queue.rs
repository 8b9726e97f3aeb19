//! Command queue and the single writer thread draining it into the PTY.

use std::sync::mpsc::{self as std_mpsc, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ptycast_common::{PtyIoError, QueueError, RelayMessage, StartError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::handle::PtyWriter;
use crate::types::{COMMAND_DEQUEUE_TIMEOUT, WORKER_BACKOFF};
use crate::worker::{run_guarded, Flow};

/// Published when a command arrives after the PTY has died.
pub const PROCESS_NOT_RUNNING: &str = "Error: Cannot reach the process. Process not running.\n";

// =============================================================================
// QUEUE
// =============================================================================

/// Producer side of the command queue. Cheap to clone, one per connection.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    tx: SyncSender<String>,
    capacity: usize,
}

/// Consumer side; owned by the writer thread.
pub type CommandReceiver = Receiver<String>;

/// Create a bounded command queue.
pub fn command_queue(capacity: usize) -> (CommandQueue, CommandReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = std_mpsc::sync_channel(capacity);
    (CommandQueue { tx, capacity }, rx)
}

impl CommandQueue {
    /// Enqueue a command without blocking.
    ///
    /// Commands from every producer are written in the order they were
    /// accepted here.
    pub fn queue_command(&self, command: impl Into<String>) -> Result<(), QueueError> {
        match self.tx.try_send(command.into()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(QueueError::Full {
                capacity: self.capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(QueueError::Closed),
        }
    }
}

// =============================================================================
// WRITER
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub dequeue_timeout: Duration,
    /// Publish an `output` message for every command written.
    pub acknowledge: bool,
    pub error_backoff: Duration,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            dequeue_timeout: COMMAND_DEQUEUE_TIMEOUT,
            acknowledge: true,
            error_backoff: WORKER_BACKOFF,
        }
    }
}

/// Writes dequeued commands to the PTY and reports the outcome.
pub struct CommandWriter {
    writer: PtyWriter,
    events: mpsc::Sender<RelayMessage>,
    acknowledge: bool,
}

impl CommandWriter {
    pub fn new(writer: PtyWriter, events: mpsc::Sender<RelayMessage>, acknowledge: bool) -> Self {
        Self {
            writer,
            events,
            acknowledge,
        }
    }

    /// Write one command followed by a newline.
    pub fn deliver(&mut self, command: &str) {
        let mut line = String::with_capacity(command.len() + 1);
        line.push_str(command);
        line.push('\n');

        match self.writer.write(line.as_bytes()) {
            Ok(()) => {
                tracing::info!(command, "Command sent to process");
                if self.acknowledge {
                    self.publish(RelayMessage::output(format!(
                        "Command '{command}' sent to process.\n"
                    )));
                }
            }
            Err(PtyIoError::Closed) => {
                tracing::error!(command, "PTY not available, process is not running");
                self.publish(RelayMessage::error(PROCESS_NOT_RUNNING));
            }
            Err(PtyIoError::Io(e)) => {
                tracing::error!(command, error = %e, "Error sending command to process");
                self.publish(RelayMessage::error(format!("Error sending command: {e}\n")));
            }
        }
    }

    /// Called between commands. Lets go of the PTY once it is dead.
    pub fn idle(&mut self) {
        self.writer.release_if_dead();
    }

    fn publish(&self, message: RelayMessage) {
        if self.events.try_send(message).is_err() {
            tracing::warn!("Message channel is full, dropping command report");
        }
    }
}

/// Start the writer on its own OS thread, named `pty-writer`.
///
/// Runs until the cancellation token fires or every [`CommandQueue`] is
/// dropped.
pub fn spawn_command_writer(
    writer: PtyWriter,
    commands: CommandReceiver,
    events: mpsc::Sender<RelayMessage>,
    cancel: CancellationToken,
    opts: WriterOptions,
) -> Result<JoinHandle<()>, StartError> {
    let mut writer = CommandWriter::new(writer, events, opts.acknowledge);
    thread::Builder::new()
        .name("pty-writer".into())
        .spawn(move || {
            tracing::info!("PTY command writer started");
            run_guarded("pty-writer", &cancel, opts.error_backoff, || {
                match commands.recv_timeout(opts.dequeue_timeout) {
                    Ok(command) => {
                        writer.deliver(&command);
                        Flow::Continue
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        writer.idle();
                        Flow::Continue
                    }
                    Err(RecvTimeoutError::Disconnected) => Flow::Stop,
                }
            });
            tracing::info!("PTY command writer stopped");
        })
        .map_err(|source| StartError::Thread {
            name: "pty-writer",
            source,
        })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::PtyHandle;
    use std::io::{self, Write};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    type Fixture = (
        CommandWriter,
        SharedBuf,
        Arc<PtyHandle>,
        mpsc::Receiver<RelayMessage>,
    );

    fn writer(acknowledge: bool) -> Fixture {
        let buf = SharedBuf::default();
        let handle = Arc::new(PtyHandle::detached());
        let (tx, rx) = mpsc::channel(16);
        let pty = PtyWriter::new(Box::new(buf.clone()), Arc::clone(&handle));
        (CommandWriter::new(pty, tx, acknowledge), buf, handle, rx)
    }

    #[test]
    fn queue_rejects_beyond_capacity_without_blocking() {
        let (queue, _rx) = command_queue(3);
        for i in 0..3 {
            queue.queue_command(format!("cmd{i}")).unwrap();
        }
        let started = Instant::now();
        assert_eq!(
            queue.queue_command("one too many"),
            Err(QueueError::Full { capacity: 3 })
        );
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn queue_reports_closed_writer() {
        let (queue, rx) = command_queue(3);
        drop(rx);
        assert_eq!(queue.queue_command("ls"), Err(QueueError::Closed));
    }

    #[test]
    fn queue_is_fifo_across_producers() {
        let (queue, rx) = command_queue(8);
        let other = queue.clone();
        queue.queue_command("a").unwrap();
        other.queue_command("b").unwrap();
        queue.queue_command("c").unwrap();
        let got: Vec<String> = rx.try_iter().collect();
        assert_eq!(got, vec!["a", "b", "c"]);
    }

    #[test]
    fn deliver_appends_newline_and_acknowledges() {
        let (mut w, buf, _handle, mut rx) = writer(true);
        w.deliver("continue");
        assert_eq!(buf.text(), "continue\n");
        assert_eq!(
            rx.try_recv().unwrap(),
            RelayMessage::output("Command 'continue' sent to process.\n")
        );
    }

    #[test]
    fn deliver_without_acknowledgment_is_silent() {
        let (mut w, buf, _handle, mut rx) = writer(false);
        w.deliver("ls");
        assert_eq!(buf.text(), "ls\n");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn deliver_to_dead_pty_reports_error_and_writes_nothing() {
        let (mut w, buf, handle, mut rx) = writer(true);
        handle.close();
        w.deliver("ls");
        assert!(buf.text().is_empty());
        assert_eq!(rx.try_recv().unwrap(), RelayMessage::error(PROCESS_NOT_RUNNING));
    }

    #[test]
    fn writer_thread_preserves_order_and_exits_on_disconnect() {
        let buf = SharedBuf::default();
        let handle = Arc::new(PtyHandle::detached());
        let (events, mut rx) = mpsc::channel(16);
        let (queue, commands) = command_queue(16);
        let pty = PtyWriter::new(Box::new(buf.clone()), handle);

        for cmd in ["first", "second", "third"] {
            queue.queue_command(cmd).unwrap();
        }
        drop(queue);

        let join = spawn_command_writer(
            pty,
            commands,
            events,
            CancellationToken::new(),
            WriterOptions {
                acknowledge: false,
                ..WriterOptions::default()
            },
        )
        .unwrap();
        join.join().unwrap();

        assert_eq!(buf.text(), "first\nsecond\nthird\n");
        assert!(rx.try_recv().is_err());
    }

    /// Sets its flag when dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Write for DropFlag {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn writer_thread_releases_dead_pty_while_idle() {
        let dropped = Arc::new(AtomicBool::new(false));
        let handle = Arc::new(PtyHandle::detached());
        let (events, _rx) = mpsc::channel(16);
        let (_queue, commands) = command_queue(16);
        let pty = PtyWriter::new(Box::new(DropFlag(Arc::clone(&dropped))), Arc::clone(&handle));
        let cancel = CancellationToken::new();
        let opts = WriterOptions {
            dequeue_timeout: Duration::from_millis(10),
            ..WriterOptions::default()
        };
        let join = spawn_command_writer(pty, commands, events, cancel.clone(), opts).unwrap();

        handle.close();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !dropped.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(dropped.load(Ordering::SeqCst));

        cancel.cancel();
        join.join().unwrap();
    }

    #[test]
    fn writer_thread_stops_on_cancel() {
        let handle = Arc::new(PtyHandle::detached());
        let (events, _rx) = mpsc::channel(16);
        let (_queue, commands) = command_queue(16);
        let pty = PtyWriter::new(Box::new(io::sink()), handle);
        let cancel = CancellationToken::new();

        let join =
            spawn_command_writer(pty, commands, events, cancel.clone(), WriterOptions::default())
                .unwrap();
        cancel.cancel();
        join.join().unwrap();
    }
}
