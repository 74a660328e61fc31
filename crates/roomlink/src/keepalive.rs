//! Background keep-alive for an authenticated session.
//!
//! Every send stamps [`ActivityClock`]. The keep-alive task wakes up every
//! poll interval and, once the session has been idle for the keep-alive
//! interval, sends a `KeepAliveNotice` through the same turn lock as
//! ordinary requests, so it never lands in the middle of an exchange.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use roomlink_protocol::KeepAliveNotice;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::session::Shared;
use crate::ClientError;

/// Time of the last send, as milliseconds since the clock was created.
///
/// Atomic so request paths and the keep-alive task never lose an update.
#[derive(Debug)]
pub(crate) struct ActivityClock {
    base: Instant,
    last_ms: AtomicU64,
}

impl ActivityClock {
    pub(crate) fn new() -> Self {
        Self {
            base: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    pub(crate) fn touch(&self) {
        let now = u64::try_from(self.base.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_ms.fetch_max(now, Ordering::AcqRel);
    }

    pub(crate) fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Acquire));
        self.base.elapsed().saturating_sub(last)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct KeepAliveSettings {
    pub interval: Duration,
    pub poll_interval: Duration,
    pub initial_jitter_ms: u64,
}

/// Handle to a running keep-alive task.
///
/// Dropping the handle aborts the task.
pub(crate) struct KeepAlive {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl KeepAlive {
    pub(crate) fn spawn(shared: Arc<Shared>, settings: KeepAliveSettings) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(shared, settings, shutdown_rx));
        Self {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Signals the task and waits for it to finish.
    ///
    /// Must not be awaited while holding the turn lock: the task may be
    /// waiting for it.
    pub(crate) async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "keep-alive task ended abnormally");
            }
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    shared: Arc<Shared>,
    settings: KeepAliveSettings,
    mut shutdown: oneshot::Receiver<()>,
) {
    let jitter = match settings.initial_jitter_ms {
        0 => Duration::ZERO,
        max => Duration::from_millis(rand::rng().random_range(0..max)),
    };
    tokio::select! {
        _ = &mut shutdown => return,
        _ = tokio::time::sleep(jitter) => {}
    }

    loop {
        tokio::select! {
            _ = &mut shutdown => return,
            _ = tokio::time::sleep(settings.poll_interval) => {}
        }
        if shared.activity.idle_for() < settings.interval {
            continue;
        }

        let result = match shared.begin().await {
            Ok(mut turn) => turn.send(KeepAliveNotice {}.into()).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => tracing::trace!("keep-alive sent"),
            Err(ClientError::NotConnected) => {
                tracing::debug!("keep-alive stopping: session gone");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "keep-alive failed; session closed");
                return;
            }
        }
    }
}
