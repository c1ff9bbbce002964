use crate::EvalStatus;
use serde::{Deserialize, Serialize};

/// Item name used for the single anonymous item produced in
/// [`ParseMode::Expression`].
pub const EXPRESSION_ITEM_NAME: &str = "__expression__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    /// One statement, possibly containing several declarations (`a=1;b=2`).
    Statement,
    /// A single anonymous expression.
    Expression,
}

/// Kind of declaration a parsed item represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    #[default]
    Unknown,
    Expression,
    Variable,
    Function,
    Class,
    Import,
    ImportFrom,
}

/// One named declaration extracted from a statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseItem {
    pub name: String,
    /// The right-hand-side code of the declaration, without `name =`.
    pub code: String,
    pub kind: ItemKind,
    /// Names the code references, in source order.
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub mode: ParseMode,
    pub items: Vec<ParseItem>,
    pub status: EvalStatus,
    pub message: String,
}

impl ParseResult {
    #[must_use]
    pub fn success(mode: ParseMode, items: Vec<ParseItem>) -> Self {
        Self {
            mode,
            items,
            status: EvalStatus::Success,
            message: String::new(),
        }
    }

    #[must_use]
    pub fn error(mode: ParseMode, status: EvalStatus, message: impl Into<String>) -> Self {
        Self {
            mode,
            items: Vec::new(),
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Parser seam: turns source text into [`ParseItem`]s.
///
/// In [`ParseMode::Statement`] a successful result carries one or more items;
/// in [`ParseMode::Expression`] exactly one item named
/// [`EXPRESSION_ITEM_NAME`].
pub trait Parser: Send {
    fn parse(&self, source: &str, mode: ParseMode) -> ParseResult;
}

impl<F> Parser for F
where
    F: Fn(&str, ParseMode) -> ParseResult + Send,
{
    fn parse(&self, source: &str, mode: ParseMode) -> ParseResult {
        self(source, mode)
    }
}
