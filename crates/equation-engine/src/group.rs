use crate::equation::Equation;
use indexmap::IndexMap;
use uuid::Uuid;

/// Opaque 128-bit group identifier, stable for the group's lifetime.
pub type GroupId = Uuid;

/// A user-visible unit created from one textual statement.
///
/// One statement may expand into several equations (`a=1;b=2`); the group
/// keeps them in statement order. Editing a group replaces its equation set
/// as a single transaction driven by the manager.
#[derive(Debug)]
pub struct EquationGroup {
    id: GroupId,
    statement: String,
    equations: IndexMap<String, Equation>,
}

impl EquationGroup {
    pub(crate) fn new(id: GroupId, statement: impl Into<String>) -> Self {
        Self {
            id,
            statement: statement.into(),
            equations: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// The original textual source the group was created or last edited
    /// from.
    #[must_use]
    pub fn statement(&self) -> &str {
        &self.statement
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Equation> {
        self.equations.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.equations.contains_key(name)
    }

    /// Equations in statement order.
    pub fn equations(&self) -> impl DoubleEndedIterator<Item = &Equation> {
        self.equations.values()
    }

    #[must_use]
    pub fn equation_names(&self) -> Vec<String> {
        self.equations.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.equations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    pub(crate) fn insert(&mut self, equation: Equation) {
        self.equations.insert(equation.name().to_string(), equation);
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Equation> {
        self.equations.get_mut(name)
    }

    pub(crate) fn set_statement(&mut self, statement: impl Into<String>) -> bool {
        let statement = statement.into();
        if self.statement == statement {
            return false;
        }
        self.statement = statement;
        true
    }

    pub(crate) fn take_equations(&mut self) -> IndexMap<String, Equation> {
        std::mem::take(&mut self.equations)
    }

    pub(crate) fn set_equations(&mut self, equations: IndexMap<String, Equation>) {
        self.equations = equations;
    }
}
