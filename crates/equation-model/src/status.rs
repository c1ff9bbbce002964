use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome classification shared by parse results, interpret results, and
/// per-equation status.
///
/// `Init` marks an equation that has been registered but never evaluated.
/// Everything past `Success` mirrors the host language's exception taxonomy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvalStatus {
    #[default]
    Init,
    Success,
    SyntaxError,
    NameError,
    TypeError,
    ZeroDivisionError,
    ValueError,
    MemoryError,
    OverflowError,
    RecursionError,
    IndexError,
    KeyError,
    AttributeError,
}

impl EvalStatus {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, EvalStatus::Success)
    }

    /// True for every status describing a failure (neither `Init` nor
    /// `Success`).
    #[must_use]
    pub const fn is_error(self) -> bool {
        !matches!(self, EvalStatus::Init | EvalStatus::Success)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EvalStatus::Init => "Init",
            EvalStatus::Success => "Success",
            EvalStatus::SyntaxError => "SyntaxError",
            EvalStatus::NameError => "NameError",
            EvalStatus::TypeError => "TypeError",
            EvalStatus::ZeroDivisionError => "ZeroDivisionError",
            EvalStatus::ValueError => "ValueError",
            EvalStatus::MemoryError => "MemoryError",
            EvalStatus::OverflowError => "OverflowError",
            EvalStatus::RecursionError => "RecursionError",
            EvalStatus::IndexError => "IndexError",
            EvalStatus::KeyError => "KeyError",
            EvalStatus::AttributeError => "AttributeError",
        }
    }
}

impl fmt::Display for EvalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
