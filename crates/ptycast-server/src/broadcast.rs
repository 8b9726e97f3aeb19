//! Broadcast fan-out: internal channel → every registered client.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::FutureExt;
use ptycast_common::RelayMessage;
use ptycast_pty::panic_message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::ServerFrame;
use crate::registry::Registry;

/// Drain the internal channel until it closes or `cancel` fires.
///
/// A sweep that panics is logged and the loop resumes after `backoff`.
pub async fn run_broadcast(
    mut rx: mpsc::Receiver<RelayMessage>,
    registry: Registry,
    send_timeout: Duration,
    backoff: Duration,
    cancel: CancellationToken,
) {
    tracing::info!("Broadcast loop started");
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        let sweep = broadcast_frame(&registry, ServerFrame::from(message), send_timeout);
        if !survive_panic(sweep, backoff, &cancel).await {
            break;
        }
    }
    tracing::info!("Broadcast loop stopped");
}

/// Await `fut`, absorbing a panic. Returns `false` if `cancel` fired during
/// the back-off that follows one.
async fn survive_panic<F: Future>(fut: F, backoff: Duration, cancel: &CancellationToken) -> bool {
    let Err(payload) = AssertUnwindSafe(fut).catch_unwind().await else {
        return true;
    };
    tracing::error!(
        panic = panic_message(&*payload),
        "Broadcast sweep panicked, resuming after backoff"
    );
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(backoff) => true,
    }
}

/// Deliver one frame to a snapshot of the registry.
///
/// Clients are served concurrently; one that is closed or too slow is
/// dropped from the registry after the sweep without affecting the rest.
/// Returns the number of successful deliveries.
pub async fn broadcast_frame(
    registry: &Registry,
    frame: ServerFrame,
    send_timeout: Duration,
) -> usize {
    let clients = registry.snapshot().await;
    if clients.is_empty() {
        return 0;
    }

    let results = join_all(clients.iter().map(|client| {
        let frame = frame.clone();
        async move { (client, client.deliver(frame, send_timeout).await) }
    }))
    .await;

    let mut failed = Vec::new();
    for (client, result) in results {
        if let Err(e) = result {
            tracing::warn!(
                client = client.id.short(),
                peer = %client.addr,
                error = %e,
                "Dropping client after failed delivery"
            );
            failed.push(client.id.clone());
        }
    }

    if !failed.is_empty() {
        let removed = registry.remove_all(&failed).await;
        let remaining = registry.len().await;
        tracing::info!(removed, remaining, "Pruned disconnected clients");
    }
    clients.len() - failed.len()
}
