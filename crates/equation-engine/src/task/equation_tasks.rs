use super::{Task, TaskContext};
use crate::group::GroupId;
use crate::manager::EquationManager;
use equation_model::{InterpretResult, Value};
use std::sync::{Arc, Mutex, PoisonError};

fn lock_manager(manager: &Mutex<EquationManager>) -> std::sync::MutexGuard<'_, EquationManager> {
    manager.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Re-evaluates one group's equations plus their transitive dependents in
/// topological order.
///
/// The manager is locked per equation, not for the whole walk, so the cancel
/// flag is observed between equations and other threads can read the manager
/// while a long interpretation is in flight elsewhere. Run these tasks with
/// `max_concurrent = 1` against any one manager.
pub struct UpdateEquationGroupTask {
    manager: Arc<Mutex<EquationManager>>,
    group_id: GroupId,
}

impl UpdateEquationGroupTask {
    #[must_use]
    pub fn new(manager: Arc<Mutex<EquationManager>>, group_id: GroupId) -> Self {
        Self { manager, group_id }
    }

    #[must_use]
    pub fn group_id(&self) -> GroupId {
        self.group_id
    }
}

impl Task for UpdateEquationGroupTask {
    fn name(&self) -> &str {
        "update-equation-group"
    }

    fn run(&self, ctx: &TaskContext<'_>) -> Value {
        ctx.set_progress(0, "collecting equations");
        let names: Vec<String> = {
            let manager = lock_manager(&self.manager);
            let Some(group) = manager.group(self.group_id) else {
                return Value::Bool(false);
            };
            let seeds = group.equation_names();
            manager
                .graph()
                .topological_sort_from_many(seeds.iter().map(String::as_str))
        };

        let total = names.len().max(1);
        ctx.set_progress(10, "updating equations");
        for (idx, name) in names.iter().enumerate() {
            if ctx.is_cancelled() {
                ctx.set_progress(100, "update cancelled");
                return Value::Bool(false);
            }
            let _ = lock_manager(&self.manager).update_equation_without_propagate(name);
            let percent = 10 + (80 * (idx + 1) / total) as u8;
            ctx.set_progress(percent, &format!("updated {name}"));
        }

        ctx.set_progress(100, "update completed");
        Value::Bool(true)
    }
}

/// Evaluates one expression against the manager's context and keeps the
/// full [`InterpretResult`] for inspection after the task finishes.
pub struct EvalExpressionTask {
    manager: Arc<Mutex<EquationManager>>,
    expression: String,
    result: Mutex<Option<InterpretResult>>,
}

impl EvalExpressionTask {
    #[must_use]
    pub fn new(manager: Arc<Mutex<EquationManager>>, expression: impl Into<String>) -> Self {
        Self {
            manager,
            expression: expression.into(),
            result: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The result of the last run, if the task has executed.
    #[must_use]
    pub fn result(&self) -> Option<InterpretResult> {
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Task for EvalExpressionTask {
    fn name(&self) -> &str {
        "eval-expression"
    }

    fn run(&self, _ctx: &TaskContext<'_>) -> Value {
        let result = lock_manager(&self.manager).eval(&self.expression);
        let value = result.value.clone();
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
        value
    }
}
