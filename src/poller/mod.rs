use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, time::sleep};

use crate::api::{ConnectionState, InstanceApi};

/// Idempotent cancellation flag shared with background tasks.
#[derive(Clone)]
pub struct CancelFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelFlag {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests cancellation. Safe to call more than once.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Latest status observed by a poller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollerStatus {
    /// Mapped connection state; `None` until the first query lands.
    pub connection: Option<ConnectionState>,
    /// Message of the most recent failed query, cleared on success.
    pub last_error: Option<String>,
}

impl PollerStatus {
    pub fn is_connected(&self) -> bool {
        self.connection == Some(ConnectionState::Connected)
    }
}

/// Periodic connection-status poller for a single credential.
///
/// The first query is issued immediately; afterwards one query runs per
/// interval tick. Once the instance reports connected the poller goes
/// sticky: ticks keep elapsing but no further queries are made. Query
/// errors are recorded as a transient `last_error` and never stop the
/// schedule.
pub struct StatusPoller {
    rx: watch::Receiver<PollerStatus>,
    cancel: CancelFlag,
}

impl StatusPoller {
    /// Spawns the polling task.
    pub fn spawn(api: Arc<dyn InstanceApi>, token: String, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(PollerStatus::default());
        let cancel = CancelFlag::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            poll_loop(api, token, interval, tx, task_cancel).await;
        });

        Self { rx, cancel }
    }

    /// Returns the latest observed status.
    pub fn status(&self) -> PollerStatus {
        self.rx.borrow().clone()
    }

    /// Subscribes to status updates.
    pub fn subscribe(&self) -> watch::Receiver<PollerStatus> {
        self.rx.clone()
    }

    /// Stops the polling task. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    api: Arc<dyn InstanceApi>,
    token: String,
    interval: Duration,
    tx: watch::Sender<PollerStatus>,
    cancel: CancelFlag,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        if !tx.borrow().is_connected() {
            let observed = api.connection_status(&token).await;
            if cancel.is_cancelled() {
                // Late completion after teardown: discard the result.
                return;
            }

            let next = match observed {
                Ok(connection) => PollerStatus {
                    connection: Some(connection),
                    last_error: None,
                },
                Err(error) => {
                    tracing::warn!(error = %error, "status poll failed");
                    PollerStatus {
                        connection: tx.borrow().connection,
                        last_error: Some(error.to_string()),
                    }
                }
            };
            let _ = tx.send(next);
        }

        tokio::select! {
            _ = sleep(interval) => {}
            _ = cancel.cancelled() => return,
        }
    }
}
