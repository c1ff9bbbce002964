use crate::graph::CycleError;
use crate::group::GroupId;
use thiserror::Error;

/// Commit-time failures surfaced by [`EquationManager`] transactions.
///
/// Every variant aborts its transaction atomically; per-equation interpreter
/// failures are recorded on the equation instead and never raised here.
///
/// [`EquationManager`]: crate::EquationManager
#[derive(Debug, Error)]
pub enum EquationError {
    /// The parser rejected a statement.
    #[error("parse failed: {0}")]
    Parse(String),

    /// A commit would introduce a name already defined in another group (or
    /// twice within one statement).
    #[error("equation `{0}` already exists")]
    DuplicateName(String),

    #[error("equation group `{0}` not found")]
    GroupNotFound(GroupId),

    #[error("equation `{0}` not found")]
    EquationNotFound(String),

    /// A commit would introduce a dependency cycle; the graph was rolled
    /// back.
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

pub type EquationResult<T> = Result<T, EquationError>;
