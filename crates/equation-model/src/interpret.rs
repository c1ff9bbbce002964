use crate::{Context, EvalStatus, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpretMode {
    /// Execute a declaration; produced names are written into the context by
    /// the interpreter before it returns.
    Exec,
    /// Evaluate an expression; the produced value is returned in
    /// [`InterpretResult::value`] and the context is left untouched.
    Eval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpretResult {
    pub mode: InterpretMode,
    pub status: EvalStatus,
    pub message: String,
    /// Meaningful only on `Success` in [`InterpretMode::Eval`].
    pub value: Value,
}

impl InterpretResult {
    #[must_use]
    pub fn success(mode: InterpretMode, value: Value) -> Self {
        Self {
            mode,
            status: EvalStatus::Success,
            message: String::new(),
            value,
        }
    }

    #[must_use]
    pub fn error(mode: InterpretMode, status: EvalStatus, message: impl Into<String>) -> Self {
        Self {
            mode,
            status,
            message: message.into(),
            value: Value::Null,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Interpreter seam: runs code against a variable environment.
///
/// Side effects on the context are observable as soon as the call returns.
pub trait Interpreter: Send {
    fn interpret(
        &self,
        code: &str,
        context: &mut dyn Context,
        mode: InterpretMode,
    ) -> InterpretResult;
}

impl<F> Interpreter for F
where
    F: Fn(&str, &mut dyn Context, InterpretMode) -> InterpretResult + Send,
{
    fn interpret(
        &self,
        code: &str,
        context: &mut dyn Context,
        mode: InterpretMode,
    ) -> InterpretResult {
        self(code, context, mode)
    }
}
