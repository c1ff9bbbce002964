mod equation_tasks;
mod manager;

pub use equation_tasks::{EvalExpressionTask, UpdateEquationGroupTask};
pub use manager::TaskManager;

use crate::signals::TaskSignals;
use equation_model::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

pub type TaskId = Uuid;

/// Lifecycle of a submitted task. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    /// Cancel was requested while running; the task is expected to observe
    /// the flag at its next safe point.
    Cancelling,
    Completed,
    Cancelled,
}

/// Handed to [`Task::run`]; carries the cooperative cancel flag and the
/// progress channel.
pub struct TaskContext<'a> {
    id: TaskId,
    cancelled: &'a AtomicBool,
    signals: &'a TaskSignals,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(id: TaskId, cancelled: &'a AtomicBool, signals: &'a TaskSignals) -> Self {
        Self {
            id,
            cancelled,
            signals,
        }
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether a cancel was requested. Long-running tasks should poll this
    /// between units of work; nothing interrupts them mid-call.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Reports progress, clamped to 100.
    pub fn set_progress(&self, percent: u8, message: &str) {
        self.signals.progress.emit(self.id, percent.min(100), message);
    }
}

/// A unit of background work.
///
/// `run` executes on a worker thread while `request_cancel` may arrive from
/// any other thread, so implementations needing mutable state keep it behind
/// interior mutability.
pub trait Task: Send + Sync {
    fn name(&self) -> &str {
        "task"
    }

    fn run(&self, ctx: &TaskContext<'_>) -> Value;

    /// Extra hook invoked when the task is cancelled while running; the
    /// cooperative flag in [`TaskContext`] is set regardless.
    fn request_cancel(&self) {}
}
