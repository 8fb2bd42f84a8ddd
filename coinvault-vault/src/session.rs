//! Idle auto-lock.

use crate::vault::EncryptedVault;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::info;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity after which the vault key is dropped (seconds).
    pub idle_timeout_secs: u64,

    /// Inactivity after which a warning is emitted (seconds).
    pub warning_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            warning_secs: 25 * 60,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn warning_after(&self) -> Duration {
        Duration::from_secs(self.warning_secs.min(self.idle_timeout_secs))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The vault will lock after `remaining` more inactivity.
    Warning { remaining: Duration },
    Locked,
}

/// Locks the vault after a period without [`SessionGuard::touch`].
///
/// Only the in-memory key is cleared; stored rows are never touched.
pub struct SessionGuard {
    activity_tx: watch::Sender<Instant>,
    events: broadcast::Sender<SessionEvent>,
    task: JoinHandle<()>,
}

impl SessionGuard {
    pub fn start(vault: Arc<EncryptedVault>, config: SessionConfig) -> Self {
        let (activity_tx, activity_rx) = watch::channel(Instant::now());
        let (events, _) = broadcast::channel(16);
        let task = tokio::spawn(run(vault, config, activity_rx, events.clone()));
        Self {
            activity_tx,
            events,
            task,
        }
    }

    /// Records user activity, restarting the countdown.
    pub fn touch(&self) {
        self.activity_tx.send_replace(Instant::now());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    vault: Arc<EncryptedVault>,
    config: SessionConfig,
    mut activity_rx: watch::Receiver<Instant>,
    events: broadcast::Sender<SessionEvent>,
) {
    let idle = config.idle_timeout();
    let warn_after = config.warning_after();

    loop {
        let last_activity = *activity_rx.borrow_and_update();
        let warn_at = last_activity + warn_after;
        let lock_at = last_activity + idle;
        let mut warned = false;

        loop {
            tokio::select! {
                changed = activity_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    break;
                }
                _ = sleep_until(warn_at), if !warned => {
                    warned = true;
                    if vault.is_unlocked() {
                        let _ = events.send(SessionEvent::Warning { remaining: idle - warn_after });
                    }
                }
                _ = sleep_until(lock_at) => {
                    if vault.is_unlocked() {
                        vault.lock();
                        info!("session idle for {}s, vault locked", idle.as_secs());
                        let _ = events.send(SessionEvent::Locked);
                    }
                    if activity_rx.changed().await.is_err() {
                        return;
                    }
                    break;
                }
            }
        }
    }
}
