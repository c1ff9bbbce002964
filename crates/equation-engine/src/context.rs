use equation_model::{Context, Value};
use indexmap::IndexMap;

/// Default map-backed [`Context`] owned by the manager.
///
/// Iteration order of [`keys`](Context::keys) follows first insertion, which
/// keeps diagnostics and tests deterministic.
#[derive(Debug, Default)]
pub struct InMemoryContext {
    entries: IndexMap<String, Value>,
}

impl InMemoryContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Context for InMemoryContext {
    fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    fn set(&mut self, name: &str, value: Value) {
        self.entries.insert(name.to_string(), value);
    }

    fn remove(&mut self, name: &str) -> bool {
        self.entries.shift_remove(name).is_some()
    }

    fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}
