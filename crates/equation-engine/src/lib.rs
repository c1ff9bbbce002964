#![forbid(unsafe_code)]

//! Reactive equation engine.
//!
//! A user declares named equations whose right-hand sides are expressions in
//! a host scripting language, possibly referring to other equations. The
//! engine keeps the computed values consistent under arbitrary edits:
//! adding, editing, or removing a group invalidates exactly the transitive
//! set of dependents and re-evaluates them in a valid order, rejecting
//! dependency cycles at commit time.
//!
//! The entry point is [`EquationManager`]; parsing and interpretation of the
//! host language are injected through the adapter traits re-exported from
//! [`equation_model`]. Observers mirror the model through
//! [`EquationSignals`], and long-running group updates go through
//! [`TaskManager`] with cooperative cancellation.

pub mod context;
pub mod equation;
pub mod error;
pub mod graph;
pub mod signals;
pub mod task;

mod group;
mod manager;

pub use context::InMemoryContext;
pub use equation::{Equation, EquationKind};
pub use error::{EquationError, EquationResult};
pub use graph::{CycleError, DependencyGraph};
pub use group::{EquationGroup, GroupId};
pub use manager::EquationManager;
pub use signals::{
    Connection, EquationFields, EquationSignals, GroupFields, ScopedConnection, Signal,
    TaskSignals,
};
pub use task::{
    EvalExpressionTask, Task, TaskContext, TaskId, TaskManager, TaskState,
    UpdateEquationGroupTask,
};

pub use equation_model::{
    Context, EvalStatus, InterpretMode, InterpretResult, Interpreter, ItemKind, ParseItem,
    ParseMode, ParseResult, Parser, Value,
};
