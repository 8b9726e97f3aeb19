//! Panic-guarded loop driver for the reader and writer threads.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// What a loop step wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Run `step` until it returns [`Flow::Stop`] or `cancel` fires.
///
/// A panic inside `step` is caught at the loop boundary, logged, and the
/// loop resumes after `backoff`.
pub fn run_guarded<F>(name: &str, cancel: &CancellationToken, backoff: Duration, mut step: F)
where
    F: FnMut() -> Flow,
{
    tracing::debug!(worker = name, "Worker loop started");
    while !cancel.is_cancelled() {
        match panic::catch_unwind(AssertUnwindSafe(&mut step)) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => break,
            Err(payload) => {
                tracing::error!(
                    worker = name,
                    panic = panic_message(&*payload),
                    "Worker step panicked, backing off"
                );
                std::thread::sleep(backoff);
            }
        }
    }
    tracing::debug!(worker = name, "Worker loop exited");
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}
