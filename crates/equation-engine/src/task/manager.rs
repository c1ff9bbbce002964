use super::{Task, TaskContext, TaskId, TaskState};
use crate::signals::TaskSignals;
use rayon::ThreadPool;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, trace};
use uuid::Uuid;

/// Worker pool shared by every [`TaskManager`].
///
/// Rayon's global pool can fail to initialize under tight resource limits
/// and then panics on first use; a crate-local pool with a degrade path
/// keeps task execution resilient. If even a single-thread pool cannot be
/// built, tasks run inline on the enqueueing thread.
static WORKER_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

fn desired_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn build_worker_pool() -> Option<ThreadPool> {
    let requested = desired_worker_threads().max(1);
    let try_build = |n| rayon::ThreadPoolBuilder::new().num_threads(n).build();

    match try_build(requested) {
        Ok(pool) => Some(pool),
        Err(_) if requested > 1 => try_build(1).ok(),
        Err(_) => None,
    }
}

fn worker_pool() -> Option<&'static ThreadPool> {
    WORKER_POOL.get_or_init(build_worker_pool).as_ref()
}

struct QueuedTask {
    id: TaskId,
    priority: i32,
    order: u64,
    task: Arc<dyn Task>,
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, FIFO within equal priority.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.order.cmp(&self.order))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedTask {}

struct RunningTask {
    task: Arc<dyn Task>,
    cancel: Arc<AtomicBool>,
    state: TaskState,
}

struct State {
    queue: BinaryHeap<QueuedTask>,
    running: HashMap<TaskId, RunningTask>,
    max_concurrent: usize,
    next_order: u64,
    shutting_down: bool,
}

struct Shared {
    state: Mutex<State>,
    idle: Condvar,
    signals: TaskSignals,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bounded-concurrency, priority-queued background task runner.
///
/// Dequeue order is `(priority desc, enqueue order asc)`. Cancellation is
/// cooperative: a queued task is dropped outright, a running task gets its
/// cancel flag set plus a [`Task::request_cancel`] call and keeps running
/// until it observes the flag. One mutex guards queue and running map.
pub struct TaskManager {
    shared: Arc<Shared>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(1)
    }
}

impl TaskManager {
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: BinaryHeap::new(),
                    running: HashMap::new(),
                    max_concurrent: max_concurrent.max(1),
                    next_order: 0,
                    shutting_down: false,
                }),
                idle: Condvar::new(),
                signals: TaskSignals::default(),
            }),
        }
    }

    #[must_use]
    pub fn signals(&self) -> &TaskSignals {
        &self.shared.signals
    }

    /// Stamps a fresh id, queues the task, and dispatches as capacity
    /// allows. After [`shutdown`] the task is rejected and immediately
    /// reported cancelled.
    ///
    /// [`shutdown`]: TaskManager::shutdown
    pub fn enqueue(&self, task: impl Task + 'static, priority: i32) -> TaskId {
        self.enqueue_arc(Arc::new(task), priority)
    }

    pub fn enqueue_arc(&self, task: Arc<dyn Task>, priority: i32) -> TaskId {
        let id = Uuid::new_v4();
        let rejected = {
            let mut state = self.shared.lock();
            if state.shutting_down {
                true
            } else {
                let order = state.next_order;
                state.next_order += 1;
                state.queue.push(QueuedTask {
                    id,
                    priority,
                    order,
                    task,
                });
                false
            }
        };
        self.shared.signals.queued.emit(id);
        if rejected {
            self.shared.signals.cancelled.emit(id);
            return id;
        }
        trace!(task = %id, priority, "task queued");
        Self::dispatch(&self.shared);
        id
    }

    /// Safe in any task state; transitions the task at most once toward a
    /// terminal state.
    pub fn cancel(&self, id: TaskId) {
        enum Found {
            Running(Arc<dyn Task>),
            Queued,
            None,
        }

        let found = {
            let mut state = self.shared.lock();
            if let Some(running) = state.running.get_mut(&id) {
                if running.state == TaskState::Running {
                    running.state = TaskState::Cancelling;
                    running.cancel.store(true, AtomicOrdering::SeqCst);
                    Found::Running(running.task.clone())
                } else {
                    Found::None
                }
            } else {
                let heap = std::mem::take(&mut state.queue);
                let before = heap.len();
                state.queue = heap.into_iter().filter(|queued| queued.id != id).collect();
                if state.queue.len() != before {
                    Found::Queued
                } else {
                    Found::None
                }
            }
        };

        match found {
            Found::Running(task) => {
                debug!(task = %id, "cancel requested for running task");
                task.request_cancel();
            }
            Found::Queued => {
                debug!(task = %id, "queued task cancelled");
                self.shared.signals.cancelled.emit(id);
                Self::emit_drained_if_idle(&self.shared);
            }
            Found::None => {}
        }
    }

    /// Cancels queued tasks, requests cancel on running ones, and waits for
    /// the running set to drain. The manager accepts no work afterwards.
    pub fn shutdown(&self) {
        let (dropped, running) = {
            let mut state = self.shared.lock();
            state.shutting_down = true;
            let dropped: Vec<TaskId> = std::mem::take(&mut state.queue)
                .into_iter()
                .map(|queued| queued.id)
                .collect();
            let running: Vec<Arc<dyn Task>> = state
                .running
                .values_mut()
                .map(|running| {
                    running.state = TaskState::Cancelling;
                    running.cancel.store(true, AtomicOrdering::SeqCst);
                    running.task.clone()
                })
                .collect();
            (dropped, running)
        };
        for id in dropped {
            self.shared.signals.cancelled.emit(id);
        }
        for task in running {
            task.request_cancel();
        }

        let mut state = self.shared.lock();
        while !state.running.is_empty() {
            state = self
                .shared
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        debug!("task manager shut down");
    }

    /// Drops every queued task without touching running ones.
    pub fn clear_queue(&self) {
        let dropped: Vec<TaskId> = {
            let mut state = self.shared.lock();
            std::mem::take(&mut state.queue)
                .into_iter()
                .map(|queued| queued.id)
                .collect()
        };
        for id in dropped {
            self.shared.signals.cancelled.emit(id);
        }
        Self::emit_drained_if_idle(&self.shared);
    }

    pub fn set_max_concurrent(&self, max_concurrent: usize) {
        {
            let mut state = self.shared.lock();
            state.max_concurrent = max_concurrent.max(1);
        }
        Self::dispatch(&self.shared);
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.lock().queue.len()
    }

    #[must_use]
    pub fn running_count(&self) -> usize {
        self.shared.lock().running.len()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.shared.lock();
        state.queue.is_empty() && state.running.is_empty()
    }

    #[must_use]
    pub fn running_task_ids(&self) -> Vec<TaskId> {
        self.shared.lock().running.keys().copied().collect()
    }

    /// Current state of a known task: `Pending` while queued,
    /// `Running`/`Cancelling` while executing, `None` once finished (the
    /// manager does not retain terminal tasks).
    #[must_use]
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        let state = self.shared.lock();
        if let Some(running) = state.running.get(&id) {
            return Some(running.state);
        }
        state
            .queue
            .iter()
            .any(|queued| queued.id == id)
            .then_some(TaskState::Pending)
    }

    fn dispatch(shared: &Arc<Shared>) {
        loop {
            let next = {
                let mut state = shared.lock();
                if state.shutting_down || state.running.len() >= state.max_concurrent {
                    return;
                }
                let Some(queued) = state.queue.pop() else {
                    return;
                };
                let cancel = Arc::new(AtomicBool::new(false));
                state.running.insert(
                    queued.id,
                    RunningTask {
                        task: queued.task.clone(),
                        cancel: cancel.clone(),
                        state: TaskState::Running,
                    },
                );
                (queued.id, queued.task, cancel)
            };

            let (id, task, cancel) = next;
            match worker_pool() {
                Some(pool) => {
                    let shared = shared.clone();
                    pool.spawn(move || Self::execute(&shared, id, task, &cancel));
                }
                None => Self::execute(shared, id, task, &cancel),
            }
        }
    }

    fn execute(shared: &Arc<Shared>, id: TaskId, task: Arc<dyn Task>, cancel: &AtomicBool) {
        shared.signals.started.emit(id);
        debug!(task = %id, name = task.name(), "task started");

        let ctx = TaskContext::new(id, cancel, &shared.signals);
        let result = task.run(&ctx);
        let was_cancelled = cancel.load(AtomicOrdering::SeqCst);

        {
            let mut state = shared.lock();
            state.running.remove(&id);
            shared.idle.notify_all();
        }

        if was_cancelled {
            debug!(task = %id, "task cancelled");
            shared.signals.cancelled.emit(id);
        } else {
            debug!(task = %id, "task finished");
            shared.signals.finished.emit(id, &result);
        }

        Self::dispatch(shared);
        Self::emit_drained_if_idle(shared);
    }

    fn emit_drained_if_idle(shared: &Arc<Shared>) {
        let drained = {
            let state = shared.lock();
            state.queue.is_empty() && state.running.is_empty()
        };
        if drained {
            shared.signals.queue_drained.emit();
        }
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("TaskManager")
            .field("pending", &state.queue.len())
            .field("running", &state.running.len())
            .field("max_concurrent", &state.max_concurrent)
            .finish_non_exhaustive()
    }
}
