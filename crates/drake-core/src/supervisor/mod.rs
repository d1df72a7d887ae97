//! Supervisor (Drake): the per-project tick loop. Generalises
//! `gator-core::orchestrator::run_orchestrator` from polling a Postgres-backed
//! plan DAG to polling the file-based Task Store.

pub mod debounce;
pub mod execution;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use drake_store::{AgentType, TaskRecord, TaskStatus, Wal, WalEntry, WorkerRecord, WorkerStatus};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::worker::LivenessTracker;

#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub max_concurrent_workers: usize,
    pub worker_stuck_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workers: drake_store::config::DEFAULT_PARALLEL_LIMIT,
            worker_stuck_timeout: Duration::from_secs(drake_store::config::DEFAULT_KOBOLD_TIMEOUT_SECS),
        }
    }
}

/// A single tick's verdict, returned so the CLI driver can decide whether to
/// keep ticking.
#[derive(Debug, PartialEq, Eq)]
pub enum TickResult {
    /// There is more work; call tick again.
    Continue,
    /// Every task reached a terminal status.
    AllDone,
    /// At least one task is permanently blocked and nothing is runnable.
    Stalled { blocked_task_ids: Vec<String> },
}

pub struct WorkerCompletion {
    pub task_id: String,
    /// `Ok` carries the commit sha the step produced, if the working tree
    /// actually changed.
    pub outcome: Result<Option<String>, String>,
}

/// Holds the pieces a tick needs: the concurrency gate, the channel workers
/// report back on, and which tasks are currently assigned to a live worker.
pub struct Supervisor {
    config: SupervisorConfig,
    semaphore: Arc<Semaphore>,
    in_flight: HashMap<String, tokio::task::JoinHandle<()>>,
    /// Mirrors `in_flight`'s keys, but carries the [`WorkerRecord`] status
    /// reporting reads -- `in_flight` alone can't answer "since when".
    worker_records: HashMap<String, WorkerRecord>,
    /// Mirrors `in_flight`'s keys too, but carries the live last-response
    /// timestamp the watchdog reads; `worker_records` is a spawn-time
    /// snapshot and is never updated from inside the spawned task.
    liveness: HashMap<String, LivenessTracker>,
    result_tx: mpsc::Sender<WorkerCompletion>,
    result_rx: mpsc::Receiver<WorkerCompletion>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (result_tx, result_rx) = mpsc::channel(config.max_concurrent_workers.max(1));
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_workers.max(1))),
            in_flight: HashMap::new(),
            worker_records: HashMap::new(),
            liveness: HashMap::new(),
            result_tx,
            result_rx,
            config,
        }
    }

    pub fn live_task_ids(&self) -> Vec<String> {
        self.in_flight.keys().cloned().collect()
    }

    /// Snapshot of every worker currently assigned to a task, for `drake
    /// status` and the stuck-worker watchdog.
    pub fn active_workers(&self) -> Vec<WorkerRecord> {
        self.worker_records.values().cloned().collect()
    }

    /// Drains any worker-completion results that have already arrived,
    /// applying each to `tasks` (status -> Done or Failed). Non-blocking:
    /// returns immediately if nothing is ready.
    pub fn drain_completions(&mut self, tasks: &mut [TaskRecord]) -> Vec<String> {
        let mut updated = Vec::new();
        while let Ok(completion) = self.result_rx.try_recv() {
            self.in_flight.remove(&completion.task_id);
            self.worker_records.remove(&completion.task_id);
            self.liveness.remove(&completion.task_id);
            if let Some(task) = tasks.iter_mut().find(|t| t.id == completion.task_id) {
                match completion.outcome {
                    Ok(commit_sha) => {
                        task.status = TaskStatus::Done;
                        if commit_sha.is_some() {
                            task.commit_sha = commit_sha;
                        }
                    }
                    Err(message) => {
                        // A worker failure is the task's own failure, not a
                        // dependency's -- BlockedByFailure is reserved for
                        // tasks waiting on a Failed dependency.
                        task.status = TaskStatus::Failed;
                        task.error_message = Some(message);
                    }
                }
            }
            updated.push(completion.task_id);
        }
        updated
    }

    /// Force-fails any Working task whose worker has gone quiet for longer
    /// than `timeout`, measured from its last observed provider response (or
    /// from spawn, if it never got one). The worker's task handle is
    /// aborted; any plan left on disk is untouched so a later retry can
    /// resume it rather than start over.
    pub async fn force_fail_stuck_workers(&mut self, tasks: &mut [TaskRecord], now: chrono::DateTime<Utc>, timeout: Duration) -> Vec<String> {
        let mut stuck_ids = Vec::new();
        for (task_id, record) in &self.worker_records {
            let last_response = match self.liveness.get(task_id) {
                Some(tracker) => tracker.last_model_response_at().await,
                None => None,
            };
            if crate::worker::is_stuck(record.started_at, last_response, now, timeout) {
                stuck_ids.push(task_id.clone());
            }
        }

        for task_id in &stuck_ids {
            if let Some(handle) = self.in_flight.remove(task_id) {
                handle.abort();
            }
            self.worker_records.remove(task_id);
            self.liveness.remove(task_id);
            if let Some(task) = tasks.iter_mut().find(|t| &t.id == task_id) {
                task.status = TaskStatus::Failed;
                task.error_message = Some(format!("worker stuck: no provider response within {}s", timeout.as_secs()));
            }
        }

        stuck_ids
    }

    /// Spawns a worker for `task` if a concurrency permit is available.
    /// Returns `false` if the caller should stop trying to spawn more this
    /// tick (no permits free).
    pub fn try_spawn<F, Fut>(&mut self, task: &TaskRecord, cancel: CancellationToken, run: F) -> bool
    where
        F: FnOnce(CancellationToken, LivenessTracker) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<Option<String>, String>> + Send + 'static,
    {
        let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
            return false;
        };
        let tx = self.result_tx.clone();
        let task_id = task.id.clone();
        let liveness = LivenessTracker::new();
        let handle = tokio::spawn({
            let liveness = liveness.clone();
            async move {
                let outcome = run(cancel, liveness).await;
                let _ = tx
                    .send(WorkerCompletion {
                        task_id: task_id.clone(),
                        outcome,
                    })
                    .await;
                drop(permit);
            }
        });
        self.in_flight.insert(task.id.clone(), handle);
        self.worker_records.insert(
            task.id.clone(),
            WorkerRecord {
                id: uuid::Uuid::new_v4(),
                task_id: Some(task.id.clone()),
                agent_type: task.assigned_agent_type.unwrap_or(AgentType::GenericCoding),
                status: WorkerStatus::Working,
                started_at: Utc::now(),
                last_model_response_at: None,
                error_message: None,
            },
        );
        self.liveness.insert(task.id.clone(), liveness);
        true
    }

    pub fn config(&self) -> SupervisorConfig {
        self.config
    }
}

/// Orders ready tasks for scheduling: `Critical > High > Normal > Low`, with
/// a secondary key of a cheap complexity heuristic (tasks whose description
/// starts with a verb implying more work sort after simpler ones, so small
/// wins get picked up first within a priority band).
pub fn schedule_order(tasks: &[&TaskRecord]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..tasks.len()).collect();
    indices.sort_by(|&a, &b| {
        tasks[b]
            .priority
            .cmp(&tasks[a].priority)
            .then_with(|| complexity_heuristic(&tasks[a].description).cmp(&complexity_heuristic(&tasks[b].description)))
    });
    indices
}

/// Maps a task description's first verb to one of three complexity tiers,
/// ascending. Anything not named below sorts first, alongside tier 0.
fn complexity_heuristic(description: &str) -> u8 {
    const TIER_1: &[&str] = &["setup", "create", "add"];
    const TIER_2: &[&str] = &["implement", "build"];
    const TIER_3: &[&str] = &["integrate", "refactor", "optimize"];

    let first_word = description.split_whitespace().next().unwrap_or("").to_ascii_lowercase();
    if TIER_1.contains(&first_word.as_str()) {
        1
    } else if TIER_2.contains(&first_word.as_str()) {
        2
    } else if TIER_3.contains(&first_word.as_str()) {
        3
    } else {
        0
    }
}

fn wal_entry(task_id: &str, previous: TaskStatus, new: TaskStatus, error_message: Option<String>) -> WalEntry {
    WalEntry {
        timestamp: Utc::now(),
        task_id: task_id.to_string(),
        previous_status: previous,
        new_status: new,
        assigned_agent: None,
        error_message,
    }
}

/// One tick of the supervisor loop: reclaim orphaned tasks, drain
/// completions, force-fail stuck workers, check termination, spawn ready
/// tasks bounded by the semaphore, then wait briefly for the next event
/// rather than busy-loop. Every status transition is appended to `wal`
/// before this function returns, ahead of whatever save the caller performs
/// against the task file next.
pub async fn run_tick(supervisor: &mut Supervisor, tasks: &mut [TaskRecord], cancel: &CancellationToken, ctx: &Arc<execution::TickContext>, wal: &Wal) -> TickResult {
    let before: HashMap<String, TaskStatus> = tasks.iter().map(|t| (t.id.clone(), t.status)).collect();

    let live_ids = supervisor.live_task_ids();
    for id in drake_store::task_file::reset_orphaned_tasks(tasks, &live_ids, &ctx.plans_dir) {
        if let Some(prev) = before.get(&id) {
            if let Some(task) = tasks.iter().find(|t| t.id == id) {
                let _ = wal.append(&wal_entry(&id, *prev, task.status, None));
            }
        }
    }

    for id in supervisor.drain_completions(tasks) {
        if let Some(prev) = before.get(&id) {
            if let Some(task) = tasks.iter().find(|t| t.id == id) {
                let _ = wal.append(&wal_entry(&id, *prev, task.status, task.error_message.clone()));
            }
        }
    }

    let stuck_timeout = supervisor.config().worker_stuck_timeout;
    let stuck = supervisor.force_fail_stuck_workers(tasks, Utc::now(), stuck_timeout).await;
    for id in stuck {
        if let Some(prev) = before.get(&id) {
            if let Some(task) = tasks.iter().find(|t| t.id == id) {
                let _ = wal.append(&wal_entry(&id, *prev, task.status, task.error_message.clone()));
            }
        }
    }

    if tasks.iter().all(|t| t.status == TaskStatus::Done) {
        return TickResult::AllDone;
    }

    let ready_ids: Vec<String> = {
        let ready = drake_store::task_file::get_ready_tasks(tasks);
        let order = schedule_order(&ready);
        order.into_iter().map(|i| ready[i].id.clone()).collect()
    };

    if ready_ids.is_empty() && supervisor.live_task_ids().is_empty() {
        let blocked: Vec<String> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::BlockedByFailure || t.status == TaskStatus::Failed)
            .map(|t| t.id.clone())
            .collect();
        if !blocked.is_empty() {
            return TickResult::Stalled { blocked_task_ids: blocked };
        }
    }

    for id in ready_ids {
        if cancel.is_cancelled() {
            break;
        }
        let Some(previous_status) = tasks.iter().find(|t| t.id == id).map(|t| t.status) else {
            continue;
        };

        let task_ctx = Arc::clone(ctx);
        let task = tasks.iter().find(|t| t.id == id).cloned().expect("looked up above");
        let spawned_task = task.clone();
        let spawned = supervisor.try_spawn(&task, cancel.clone(), move |_cancel, liveness| async move {
            execution::execute_task(task_ctx, spawned_task, liveness).await
        });
        if !spawned {
            break;
        }

        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.status = TaskStatus::Working;
            let _ = wal.append(&wal_entry(&id, previous_status, TaskStatus::Working, None));
        }
    }

    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(Duration::from_millis(50)) => {}
    }

    TickResult::Continue
}
