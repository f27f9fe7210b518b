//! Background renewal of a held lock.
//!
//! A [`RenewalHandle`] owns a tokio task that calls
//! [`LockManager::try_renew`] on a fixed cadence. The task never releases
//! the lock; it only keeps it from expiring while the holder is still
//! working, and reports when the lock has been lost.

use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::manager::LockManager;

/// Lifecycle of a keep-alive task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalState {
    /// The task is running and the last renewal (if any) succeeded.
    Renewing,
    /// The task was stopped by its handle.
    Stopped,
    /// The lock is no longer held by this request id.
    Lost,
}

/// Handle to a running keep-alive task.
///
/// Dropping the handle stops the task; the lock itself is left to expire or
/// to be released by the caller.
#[derive(Debug)]
pub struct RenewalHandle {
    state_rx: watch::Receiver<RenewalState>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RenewalHandle {
    /// Current state of the task.
    #[must_use]
    pub fn state(&self) -> RenewalState {
        *self.state_rx.borrow()
    }

    /// Whether renewal has stopped because the lock was lost.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.state() == RenewalState::Lost
    }

    /// Wait until the task ends and return its final state.
    ///
    /// Resolves as soon as the lock is lost; a task that is never stopped
    /// and never loses its lock keeps this future pending.
    pub async fn wait(&self) -> RenewalState {
        let mut rx = self.state_rx.clone();
        match rx.wait_for(|s| *s != RenewalState::Renewing).await {
            Ok(state) => *state,
            // Sender dropped without a final state: the task panicked or was
            // aborted, which is as good as stopped.
            Err(_) => RenewalState::Stopped,
        }
    }

    /// Stop renewing and return the final state.
    ///
    /// Returns [`RenewalState::Lost`] if the lock had already been lost, and
    /// [`RenewalState::Stopped`] otherwise, including when the task died
    /// without recording a state.
    pub async fn stop(mut self) -> RenewalState {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "lock renewal task ended abnormally");
            }
        }
        match self.state() {
            RenewalState::Renewing => RenewalState::Stopped,
            state => state,
        }
    }
}

pub(crate) fn spawn(
    manager: LockManager,
    lock_key: String,
    request_id: String,
    ttl: Duration,
    every: Duration,
) -> RenewalHandle {
    let (state_tx, state_rx) = watch::channel(RenewalState::Renewing);
    let (stop_tx, stop_rx) = oneshot::channel();

    let task = tokio::spawn(run(
        manager, lock_key, request_id, ttl, every, state_tx, stop_rx,
    ));

    RenewalHandle {
        state_rx,
        stop_tx: Some(stop_tx),
        task: Some(task),
    }
}

async fn run(
    manager: LockManager,
    lock_key: String,
    request_id: String,
    ttl: Duration,
    every: Duration,
    state_tx: watch::Sender<RenewalState>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    debug!(lock_key, request_id, ?ttl, ?every, "lock renewal started");

    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_renewed = Instant::now();

    loop {
        tokio::select! {
            // Resolves on an explicit stop and when the handle is dropped.
            _ = &mut stop_rx => {
                debug!(lock_key, request_id, "lock renewal stopped");
                state_tx.send_replace(RenewalState::Stopped);
                return;
            }
            _ = ticker.tick() => {
                match manager.try_renew(&lock_key, &request_id, ttl).await {
                    Ok(true) => last_renewed = Instant::now(),
                    Ok(false) => {
                        info!(lock_key, request_id, "lock lost, stopping renewal");
                        state_tx.send_replace(RenewalState::Lost);
                        return;
                    }
                    Err(e) => {
                        warn!(lock_key, request_id, error = %e, "failed to renew lock");
                        if last_renewed.elapsed() >= ttl {
                            warn!(lock_key, request_id, "lock ttl elapsed without renewal");
                            state_tx.send_replace(RenewalState::Lost);
                            return;
                        }
                    }
                }
            }
        }
    }
}
