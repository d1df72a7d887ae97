//! Debounced task-file writes: most status transitions coalesce into a
//! single save every `DEBOUNCE` interval via a single-slot channel, but a
//! transition into a terminal status bypasses the debounce and saves
//! immediately, and graceful shutdown drains and force-saves within a fixed
//! deadline.

use std::sync::Arc;
use std::time::Duration;

use drake_store::{TaskFile, TaskStatus, Wal};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

pub const DEBOUNCE: Duration = Duration::from_millis(drake_store::config::DEFAULT_DEBOUNCE_MILLIS);
pub const SHUTDOWN_DRAIN_DEADLINE: Duration = Duration::from_secs(5);

/// A pending save request. The channel is single-slot: a new request
/// overwrites whatever was queued, since only the latest state matters.
pub struct SaveRequest {
    pub reason_is_terminal: bool,
}

pub struct Debouncer {
    tx: mpsc::Sender<SaveRequest>,
}

impl Debouncer {
    /// Spawns the background task that shares `files` with the tick loop and
    /// owns `wal`. The loop locks `files` only at save time, so whatever
    /// mutations the tick loop has made by then are what gets written --
    /// unlike an owned snapshot, which would only ever reflect state as of
    /// `spawn`. One debouncer covers every task file in the project: a
    /// per-file debouncer sharing one `Wal` could checkpoint (truncate) the
    /// log out from under another file's not-yet-saved transitions.
    pub fn spawn(files: Arc<Mutex<Vec<TaskFile>>>, wal: Wal) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<SaveRequest>(1);

        let handle = tokio::spawn(async move {
            let save_all = || async {
                let files = files.lock().await;
                for file in files.iter() {
                    let _ = file.save();
                }
                let _ = wal.checkpoint();
            };

            loop {
                let Some(first) = rx.recv().await else {
                    break;
                };

                if first.reason_is_terminal {
                    save_all().await;
                    continue;
                }

                let deadline = Instant::now() + DEBOUNCE;
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => break,
                        maybe_next = rx.recv() => {
                            match maybe_next {
                                Some(next) if next.reason_is_terminal => break,
                                Some(_) => continue,
                                None => break,
                            }
                        }
                    }
                }

                save_all().await;
            }
        });

        (Self { tx }, handle)
    }

    pub async fn request_save(&self, terminal: bool) {
        let _ = self.tx.send(SaveRequest { reason_is_terminal: terminal }).await;
    }

    /// Drains any in-flight save within [`SHUTDOWN_DRAIN_DEADLINE`], then
    /// drops the sender so the background task exits.
    pub async fn shutdown(self) {
        let _ = tokio::time::timeout(SHUTDOWN_DRAIN_DEADLINE, self.tx.send(SaveRequest { reason_is_terminal: true })).await;
    }
}

/// Whether a transition into `new_status` should bypass debouncing.
pub fn is_terminal(new_status: TaskStatus) -> bool {
    matches!(new_status, TaskStatus::Done | TaskStatus::Failed)
}
