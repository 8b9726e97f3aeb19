//! Relay lifecycle: bind, start the child, run the accept loop, shut down.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use ptycast_common::{RelayError, RelayMessage, Result};
use ptycast_config::PtycastConfig;
use ptycast_pty::{
    command_queue, spawn_command_writer, spawn_output_reader, start_with_fallback, LaunchSpec,
    PtyHandle, ReaderOptions, Supervisor, Termination, WriterOptions,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;

use crate::broadcast::run_broadcast;
use crate::connection::handle_connection;
use crate::context::RelayContext;
use crate::registry::Registry;

/// How long connections get to send their close frames on shutdown.
const CLOSE_DRAIN: Duration = Duration::from_secs(1);

/// A bound listener plus a running child and its PTY threads.
pub struct Relay {
    ctx: Arc<RelayContext>,
    listener: TcpListener,
    supervisor: Arc<Supervisor>,
    events_rx: mpsc::Receiver<RelayMessage>,
    threads: Vec<JoinHandle<()>>,
    pid_file: Option<PathBuf>,
    error_backoff: Duration,
}

impl Relay {
    /// Bind the listener, start the child on a fresh PTY and spawn the
    /// reader and writer threads.
    ///
    /// The listener is bound first so a taken port never leaves an orphaned
    /// child behind.
    pub async fn start(config: &PtycastConfig, cancel: CancellationToken) -> Result<Self> {
        let bind_addr = config.server.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| RelayError::Network(format!("failed to bind {bind_addr}: {e}")))?;

        let spec = launch_spec(config);
        let candidates: Vec<PathBuf> = config
            .launch
            .working_dir_candidates
            .iter()
            .map(PathBuf::from)
            .collect();
        let marker = config.launch.marker_file.as_deref();
        let session = start_with_fallback(&spec, &candidates, marker)?;
        let supervisor = Arc::new(session.supervisor);

        let pid_file = config.launch.pid_file.as_ref().map(PathBuf::from);
        if let (Some(path), Some(pid)) = (&pid_file, supervisor.pid()) {
            match write_pid_file(path, pid) {
                Ok(()) => tracing::info!(pid, path = %path.display(), "Wrote PID file"),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Failed to write PID file")
                }
            }
        }

        let relay = &config.relay;
        let (events, events_rx) = mpsc::channel(relay.message_capacity.max(1));
        let (commands, commands_rx) = command_queue(relay.command_capacity);
        let backoff = Duration::from_millis(relay.error_backoff_ms);

        let reader = spawn_output_reader(
            session.reader,
            Arc::clone(&session.handle),
            events.clone(),
            cancel.clone(),
            ReaderOptions {
                chunk: relay.read_chunk,
                poll_interval: Duration::from_millis(relay.poll_interval_ms),
                error_backoff: backoff,
            },
        )?;
        let writer = spawn_command_writer(
            session.writer,
            commands_rx,
            events.clone(),
            cancel.clone(),
            WriterOptions {
                dequeue_timeout: Duration::from_millis(relay.command_timeout_ms),
                acknowledge: relay.acknowledge_commands,
                error_backoff: backoff,
            },
        )?;

        if let Some(banner) = &config.launch.startup_message {
            if events.try_send(RelayMessage::output(banner.clone())).is_err() {
                tracing::warn!("Could not queue startup message");
            }
        }

        if let Some(input) = config.launch.initial_input.clone() {
            let delay = Duration::from_millis(config.launch.initial_input_delay_ms);
            let commands = commands.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        match commands.queue_command(input.as_str()) {
                            Ok(()) => tracing::info!(command = %input, "Initial input queued"),
                            Err(e) => tracing::warn!(error = %e, "Could not queue initial input"),
                        }
                    }
                }
            });
        }

        let ctx = Arc::new(RelayContext {
            server: config.server.clone(),
            acknowledge: relay.acknowledge_commands,
            registry: Registry::new(),
            commands,
            pty: session.handle,
            cancel,
        });

        Ok(Self {
            ctx,
            listener,
            supervisor,
            events_rx,
            threads: vec![reader, writer],
            pid_file,
            error_backoff: backoff,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve clients until the cancellation token fires, then shut down.
    pub async fn run(self) -> Result<()> {
        let Self {
            ctx,
            listener,
            supervisor,
            events_rx,
            threads,
            pid_file,
            error_backoff,
        } = self;

        let broadcast = tokio::spawn(run_broadcast(
            events_rx,
            ctx.registry.clone(),
            ctx.send_timeout(),
            error_backoff,
            ctx.cancel.clone(),
        ));
        let watchdog = tokio::spawn(stop_child_on_pty_death(
            Arc::clone(&ctx.pty),
            Arc::clone(&supervisor),
            ctx.cancel.clone(),
        ));

        match listener.local_addr() {
            Ok(addr) => tracing::info!("PTY WebSocket server listening on ws://{addr}"),
            Err(e) => tracing::warn!(error = %e, "Listening on unknown address"),
        }

        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tracing::info!(peer = %addr, "Connection attempt");
                        let ctx = Arc::clone(&ctx);
                        tokio::spawn(async move {
                            let config = websocket_config(ctx.server.max_message_size);
                            match accept_async_with_config(stream, Some(config)).await {
                                Ok(ws) => handle_connection(ws, addr, ctx).await,
                                Err(e) => {
                                    tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "TCP accept error");
                    }
                },
            }
        }

        drop(listener);
        shutdown(&ctx, supervisor, threads, pid_file.as_deref()).await;
        if let Err(e) = watchdog.await {
            tracing::warn!(error = %e, "PTY watchdog ended abnormally");
        }
        if let Err(e) = broadcast.await {
            tracing::warn!(error = %e, "Broadcast task ended abnormally");
        }
        Ok(())
    }
}

/// Terminate the child group as soon as the PTY dies, whatever killed it.
///
/// The relay itself keeps serving; clients have already been told the
/// session ended.
async fn stop_child_on_pty_death(
    pty: Arc<PtyHandle>,
    supervisor: Arc<Supervisor>,
    cancel: CancellationToken,
) {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        _ = pty.closed() => {}
    }
    tracing::warn!("PTY closed, stopping child process group");
    terminate_child(supervisor).await;
}

/// Run the blocking terminate sequence off the async runtime.
async fn terminate_child(supervisor: Arc<Supervisor>) {
    let outcome = tokio::task::spawn_blocking(move || {
        tracing::debug!(
            pid = ?supervisor.pid(),
            running = supervisor.is_running(),
            "Terminating child"
        );
        supervisor.terminate()
    })
    .await;
    match outcome {
        Ok(Ok(Termination::AlreadyReaped)) => {}
        Ok(Ok(outcome)) => tracing::info!(?outcome, "Child process stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Error terminating child process"),
        Err(e) => tracing::error!(error = %e, "Terminate task failed"),
    }
}

/// Stop everything started by [`Relay::start`].
async fn shutdown(
    ctx: &RelayContext,
    supervisor: Arc<Supervisor>,
    threads: Vec<JoinHandle<()>>,
    pid_file: Option<&Path>,
) {
    tracing::info!("Shutting down relay");
    ctx.cancel.cancel();

    let deadline = tokio::time::Instant::now() + CLOSE_DRAIN;
    while !ctx.registry.is_empty().await && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    terminate_child(supervisor).await;
    ctx.pty.close();

    let joined = tokio::task::spawn_blocking(move || {
        for thread in threads {
            let name = thread.thread().name().unwrap_or("pty").to_owned();
            if thread.join().is_err() {
                tracing::error!(thread = %name, "PTY thread panicked");
            }
        }
    })
    .await;
    if let Err(e) = joined {
        tracing::error!(error = %e, "Failed to join PTY threads");
    }

    if let Some(path) = pid_file {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::debug!(path = %path.display(), error = %e, "PID file not removed");
        }
    }
    tracing::info!("Relay stopped");
}

/// Translate configuration into what the PTY crate needs to spawn.
pub fn launch_spec(config: &PtycastConfig) -> LaunchSpec {
    let launch = &config.launch;
    let mut env: Vec<(String, String)> = launch
        .env
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    env.sort();

    let mut spec = LaunchSpec::new(launch.program.as_str())
        .size(launch.cols, launch.rows)
        .terminate_grace(Duration::from_secs(config.relay.terminate_grace_secs));
    spec.args = launch.args.clone();
    spec.env = env;
    spec
}

fn websocket_config(max_message_size: usize) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_message_size);
    config.max_frame_size = Some(max_message_size);
    config
}

fn write_pid_file(path: &Path, pid: u32) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, pid.to_string())
}
