use crate::group::GroupId;
use crate::signals::EquationFields;
use equation_model::{EvalStatus, ItemKind, ParseItem};
use std::fmt;

/// What a declaration introduces into the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EquationKind {
    /// The parser could not classify the declaration.
    Error,
    Variable,
    Function,
    Class,
    Import,
    ImportFrom,
}

impl From<ItemKind> for EquationKind {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Variable => EquationKind::Variable,
            ItemKind::Function => EquationKind::Function,
            ItemKind::Class => EquationKind::Class,
            ItemKind::Import => EquationKind::Import,
            ItemKind::ImportFrom => EquationKind::ImportFrom,
            ItemKind::Unknown | ItemKind::Expression => EquationKind::Error,
        }
    }
}

impl fmt::Display for EquationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EquationKind::Error => "Error",
            EquationKind::Variable => "Variable",
            EquationKind::Function => "Function",
            EquationKind::Class => "Class",
            EquationKind::Import => "Import",
            EquationKind::ImportFrom => "ImportFrom",
        };
        f.write_str(name)
    }
}

/// A single named declaration owned by an [`EquationGroup`].
///
/// Pure data: the manager mutates fields through the crate-private setters
/// and emits the corresponding field-change signals itself.
///
/// [`EquationGroup`]: crate::EquationGroup
#[derive(Debug, Clone)]
pub struct Equation {
    name: String,
    content: String,
    kind: EquationKind,
    status: EvalStatus,
    message: String,
    dependencies: Vec<String>,
    group_id: GroupId,
}

impl Equation {
    pub(crate) fn from_item(item: &ParseItem, group_id: GroupId) -> Self {
        Self {
            name: item.name.clone(),
            content: item.code.clone(),
            kind: EquationKind::from(item.kind),
            status: EvalStatus::Init,
            message: String::new(),
            dependencies: item.dependencies.clone(),
            group_id,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Right-hand-side source, without the `name =` prefix.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn kind(&self) -> EquationKind {
        self.kind
    }

    #[must_use]
    pub fn status(&self) -> EvalStatus {
        self.status
    }

    /// Diagnostic text; empty on `Success`.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Names the content references, in source order.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    #[must_use]
    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    /// Folds a re-parsed item into this equation, returning the set of
    /// changed fields. Status and message are left for the next evaluation.
    pub(crate) fn apply_item(&mut self, item: &ParseItem) -> EquationFields {
        let mut changed = EquationFields::NONE;
        if self.content != item.code {
            self.content = item.code.clone();
            changed |= EquationFields::CONTENT;
        }
        let kind = EquationKind::from(item.kind);
        if self.kind != kind {
            self.kind = kind;
            changed |= EquationFields::KIND;
        }
        if self.dependencies != item.dependencies {
            self.dependencies = item.dependencies.clone();
            changed |= EquationFields::DEPENDENCIES;
        }
        changed
    }

    pub(crate) fn set_status(&mut self, status: EvalStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        true
    }

    pub(crate) fn set_message(&mut self, message: impl Into<String>) -> bool {
        let message = message.into();
        if self.message == message {
            return false;
        }
        self.message = message;
        true
    }
}
