use crate::context::InMemoryContext;
use crate::equation::{Equation, EquationKind};
use crate::error::{EquationError, EquationResult};
use crate::graph::DependencyGraph;
use crate::group::{EquationGroup, GroupId};
use crate::signals::{EquationFields, EquationSignals, GroupFields};
use equation_model::{
    Context, EvalStatus, InterpretMode, InterpretResult, Interpreter, ParseItem, ParseMode, Parser,
};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};
use uuid::Uuid;

/// Orchestrates the statement → group → equation lifecycle.
///
/// The manager exclusively owns the dependency graph, the context, and every
/// group. It is single-threaded by contract: all mutations must happen on one
/// thread, and background work goes through the task layer with
/// `max_concurrent = 1` against any one manager.
///
/// Commit-time failures (`Parse`, `DuplicateName`, `Cycle`, `*NotFound`)
/// abort their transaction atomically. Interpreter failures are recorded on
/// the failing equation and surfaced through signals instead.
pub struct EquationManager {
    graph: DependencyGraph,
    context: Box<dyn Context>,
    parser: Box<dyn Parser>,
    interpreter: Box<dyn Interpreter>,
    groups: IndexMap<GroupId, EquationGroup>,
    owner_of: HashMap<String, GroupId>,
    signals: EquationSignals,
}

impl EquationManager {
    /// Builds a manager over an [`InMemoryContext`].
    pub fn new(parser: impl Parser + 'static, interpreter: impl Interpreter + 'static) -> Self {
        Self::with_context(
            Box::new(InMemoryContext::new()),
            Box::new(parser),
            Box::new(interpreter),
        )
    }

    pub fn with_context(
        context: Box<dyn Context>,
        parser: Box<dyn Parser>,
        interpreter: Box<dyn Interpreter>,
    ) -> Self {
        Self {
            graph: DependencyGraph::new(),
            context,
            parser,
            interpreter,
            groups: IndexMap::new(),
            owner_of: HashMap::new(),
            signals: EquationSignals::default(),
        }
    }

    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    #[must_use]
    pub fn context(&self) -> &dyn Context {
        self.context.as_ref()
    }

    #[must_use]
    pub fn signals(&self) -> &EquationSignals {
        &self.signals
    }

    #[must_use]
    pub fn equation(&self, name: &str) -> Option<&Equation> {
        let group_id = self.owner_of.get(name)?;
        self.groups.get(group_id)?.get(name)
    }

    #[must_use]
    pub fn contains_equation(&self, name: &str) -> bool {
        self.owner_of.contains_key(name)
    }

    #[must_use]
    pub fn group(&self, id: GroupId) -> Option<&EquationGroup> {
        self.groups.get(&id)
    }

    #[must_use]
    pub fn contains_group(&self, id: GroupId) -> bool {
        self.groups.contains_key(&id)
    }

    /// The group that owns `name`, if any.
    #[must_use]
    pub fn group_of(&self, name: &str) -> Option<GroupId> {
        self.owner_of.get(name).copied()
    }

    /// Groups in creation order.
    pub fn groups(&self) -> impl Iterator<Item = &EquationGroup> {
        self.groups.values()
    }

    /// Parses a statement and registers its declarations as a new group.
    ///
    /// Fails with `Parse` if the statement does not parse, `DuplicateName`
    /// if any declared name already exists (in any group, or twice within
    /// this statement), and `Cycle` if the new dependencies would close a
    /// loop. On failure nothing is changed.
    pub fn add_group(&mut self, statement: &str) -> EquationResult<GroupId> {
        let parsed = self.parser.parse(statement, ParseMode::Statement);
        if !parsed.is_success() {
            return Err(EquationError::Parse(parsed.message));
        }
        let items = parsed.items;

        let mut seen: HashSet<&str> = HashSet::new();
        for item in &items {
            if self.owner_of.contains_key(&item.name) || !seen.insert(item.name.as_str()) {
                return Err(EquationError::DuplicateName(item.name.clone()));
            }
        }

        let mut guard = self.graph.batch_update();
        for item in &items {
            guard.add_node(&item.name);
            for dep in &item.dependencies {
                guard.add_edge(&item.name, dep);
            }
        }
        guard.commit()?;

        let id = Uuid::new_v4();
        let mut group = EquationGroup::new(id, statement);
        for item in &items {
            group.insert(Equation::from_item(item, id));
            self.owner_of.insert(item.name.clone(), id);
        }
        for item in &items {
            self.graph.mark_dirty(&item.name);
        }
        self.groups.insert(id, group);
        debug!(group = %id, equations = items.len(), "equation group added");

        let group = &self.groups[&id];
        self.signals.group_added.emit(group);
        for equation in group.equations() {
            self.signals.equation_added.emit(equation);
        }
        Ok(id)
    }

    /// Re-parses a statement and applies the diff to an existing group.
    ///
    /// The new declaration set may reuse names that already belong to this
    /// group; colliding with another group is `DuplicateName`. Executes as
    /// one transaction: on any failure the previous state is restored.
    pub fn edit_group(&mut self, id: GroupId, new_statement: &str) -> EquationResult<()> {
        if !self.groups.contains_key(&id) {
            return Err(EquationError::GroupNotFound(id));
        }

        let parsed = self.parser.parse(new_statement, ParseMode::Statement);
        if !parsed.is_success() {
            return Err(EquationError::Parse(parsed.message));
        }
        let items = parsed.items;

        let mut seen: HashSet<&str> = HashSet::new();
        for item in &items {
            let foreign_owner = self
                .owner_of
                .get(&item.name)
                .is_some_and(|owner| *owner != id);
            if foreign_owner || !seen.insert(item.name.as_str()) {
                return Err(EquationError::DuplicateName(item.name.clone()));
            }
        }

        let group = &self.groups[&id];
        let old_names = group.equation_names();
        let new_names: HashSet<&str> = items.iter().map(|item| item.name.as_str()).collect();

        let removed: Vec<String> = old_names
            .iter()
            .filter(|name| !new_names.contains(name.as_str()))
            .cloned()
            .collect();
        let mut added: Vec<&ParseItem> = Vec::new();
        let mut changed: Vec<&ParseItem> = Vec::new();
        for item in &items {
            match group.get(&item.name) {
                None => added.push(item),
                Some(existing) => {
                    let same = existing.content() == item.code
                        && existing.kind() == EquationKind::from(item.kind)
                        && existing.dependencies() == item.dependencies.as_slice();
                    if !same {
                        changed.push(item);
                    }
                }
            }
        }

        // Dependents of removed and changed names, captured while their
        // nodes still exist. Marking happens only after a successful commit
        // so a failed edit leaves no trace, dirty flags included.
        let to_dirty: Vec<String> = self.graph.topological_sort_from_many(
            removed
                .iter()
                .map(String::as_str)
                .chain(changed.iter().map(|item| item.name.as_str())),
        );

        // A changed equation cycles through remove + add so its node comes
        // back with a zeroed event stamp, which defeats the staleness filter
        // on the next update.
        let mut guard = self.graph.batch_update();
        for name in removed.iter().rev() {
            guard.clear_dependency_edges(name);
            guard.remove_node(name);
        }
        for item in added.iter().chain(&changed) {
            guard.clear_dependency_edges(&item.name);
            guard.remove_node(&item.name);
            guard.add_node(&item.name);
            for dep in &item.dependencies {
                guard.add_edge(&item.name, dep);
            }
        }
        guard.commit()?;

        let group = self.groups.get_mut(&id).expect("group existence checked");
        let mut group_fields = GroupFields::NONE;
        if group.set_statement(new_statement) {
            group_fields |= GroupFields::STATEMENT;
        }
        if group.len() != items.len() {
            group_fields |= GroupFields::EQUATION_COUNT;
        }

        let mut old_equations = group.take_equations();
        let mut removed_equations: Vec<Equation> = Vec::new();
        for name in removed.iter().rev() {
            if let Some(equation) = old_equations.shift_remove(name) {
                removed_equations.push(equation);
            }
        }

        let mut rebuilt = IndexMap::with_capacity(items.len());
        let mut added_names: Vec<String> = Vec::new();
        let mut updated: Vec<(String, EquationFields)> = Vec::new();
        for item in &items {
            let equation = match old_equations.shift_remove(&item.name) {
                Some(mut existing) => {
                    let fields = existing.apply_item(item);
                    if !fields.is_empty() {
                        updated.push((item.name.clone(), fields));
                    }
                    existing
                }
                None => {
                    added_names.push(item.name.clone());
                    Equation::from_item(item, id)
                }
            };
            rebuilt.insert(item.name.clone(), equation);
        }
        group.set_equations(rebuilt);

        for name in &removed {
            self.owner_of.remove(name);
            self.context.remove(name);
        }
        for name in &added_names {
            self.owner_of.insert(name.clone(), id);
        }
        for name in &to_dirty {
            self.graph.mark_dirty(name);
        }
        for item in added.iter().chain(&changed) {
            self.graph.mark_dirty(&item.name);
        }
        debug!(
            group = %id,
            removed = removed.len(),
            added = added_names.len(),
            changed = changed.len(),
            "equation group edited"
        );

        for equation in &removed_equations {
            self.signals.equation_removing.emit(equation);
        }
        let group = &self.groups[&id];
        for name in &added_names {
            if let Some(equation) = group.get(name) {
                self.signals.equation_added.emit(equation);
            }
        }
        for (name, fields) in &updated {
            if let Some(equation) = group.get(name) {
                self.signals.equation_updated.emit(equation, *fields);
            }
        }
        if !group_fields.is_empty() {
            self.signals.group_updated.emit(group, group_fields);
        }
        Ok(())
    }

    /// Removes a group and all of its equations atomically.
    ///
    /// Surviving equations that referenced the removed names keep their
    /// (now latent) edges and become dirty; they acquire `NameError` on the
    /// next update.
    pub fn remove_group(&mut self, id: GroupId) -> EquationResult<()> {
        if !self.groups.contains_key(&id) {
            return Err(EquationError::GroupNotFound(id));
        }

        {
            let group = &self.groups[&id];
            self.signals.group_removing.emit(group);
            for equation in group.equations().rev() {
                self.signals.equation_removing.emit(equation);
            }
        }

        let group = self
            .groups
            .shift_remove(&id)
            .expect("group existence checked");
        for name in group.equation_names().iter().rev() {
            self.graph.mark_dirty(name);
            self.graph.clear_dependency_edges(name);
            self.graph.remove_node(name);
            self.context.remove(name);
            self.owner_of.remove(name);
        }
        debug!(group = %id, equations = group.len(), "equation group removed");
        Ok(())
    }

    /// Re-evaluates every dirty equation, dependencies first. Blocks the
    /// caller for the duration of interpretation.
    pub fn update(&mut self) {
        for name in self.graph.topological_sort() {
            if self.graph.is_dirty(&name) {
                self.update_one(&name);
            }
        }
    }

    /// Re-evaluates `name` and its transitive dependents in topological
    /// order.
    pub fn update_equation(&mut self, name: &str) -> EquationResult<()> {
        if !self.contains_equation(name) {
            return Err(EquationError::EquationNotFound(name.to_string()));
        }
        for node in self.graph.topological_sort_from(name) {
            if self.graph.is_dirty(&node) {
                self.update_one(&node);
            }
        }
        Ok(())
    }

    /// The single-node step of [`update`], without walking dependents.
    ///
    /// Background tasks drive this directly so they can observe the cancel
    /// flag between equations.
    ///
    /// [`update`]: EquationManager::update
    pub fn update_equation_without_propagate(&mut self, name: &str) -> EquationResult<()> {
        if !self.contains_equation(name) {
            return Err(EquationError::EquationNotFound(name.to_string()));
        }
        if self.graph.is_dirty(name) {
            self.update_one(name);
        }
        Ok(())
    }

    /// Flags an equation and its transitive dependents for re-evaluation
    /// without changing any input.
    ///
    /// The staleness filter may still skip interpretation for nodes whose
    /// stamps prove the cached values current; they end up clean either way.
    pub fn mark_dirty(&mut self, name: &str) -> EquationResult<()> {
        if !self.contains_equation(name) {
            return Err(EquationError::EquationNotFound(name.to_string()));
        }
        self.graph.mark_dirty(name);
        Ok(())
    }

    /// Evaluates a free expression against the current context. The graph is
    /// not consulted and no state changes besides interpreter side effects.
    pub fn eval(&mut self, expression: &str) -> InterpretResult {
        self.interpreter
            .interpret(expression, self.context.as_mut(), InterpretMode::Eval)
    }

    /// Drops every group, graph node, and context entry.
    pub fn reset(&mut self) {
        self.graph.reset();
        self.context.clear();
        self.groups.clear();
        self.owner_of.clear();
        debug!("equation manager reset");
    }

    /// Re-evaluates one dirty node and records the outcome on its equation.
    fn update_one(&mut self, name: &str) {
        let Some(group_id) = self.owner_of.get(name).copied() else {
            self.graph.set_clean(name);
            return;
        };
        let (kind, content) = {
            let equation = self.groups[&group_id]
                .get(name)
                .expect("owner map and group agree");
            (equation.kind(), equation.content().to_string())
        };
        let mut fields = EquationFields::NONE;

        if kind == EquationKind::Error {
            if self.context.remove(name) {
                self.graph.update_event_stamp(name);
                fields |= EquationFields::VALUE;
            }
            self.set_outcome(group_id, name, EvalStatus::SyntaxError, None, &mut fields);
            self.finish_update(group_id, name, fields);
            return;
        }

        let declared = self.graph.declared_dependencies(name);
        let missing: Vec<String> = declared
            .into_iter()
            .filter(|dep| !self.graph.contains_node(dep))
            .collect();
        if !missing.is_empty() {
            if self.context.remove(name) {
                self.graph.update_event_stamp(name);
                fields |= EquationFields::VALUE;
            }
            let message = format!("missing: {}", missing.join(", "));
            self.set_outcome(
                group_id,
                name,
                EvalStatus::NameError,
                Some(message),
                &mut fields,
            );
            self.finish_update(group_id, name, fields);
            return;
        }

        // Staleness filter: when only a dirty flag propagated here and no
        // input was actually rewritten, the stamps already prove the cached
        // result current.
        let node = self.graph.node(name).expect("dirty nodes exist");
        let own_stamp = node.event_stamp();
        let max_dep_stamp = node
            .dependencies()
            .iter()
            .filter_map(|dep| self.graph.node(dep))
            .map(|dep| dep.event_stamp())
            .max()
            .unwrap_or(0);
        if own_stamp > max_dep_stamp {
            trace!(equation = name, "skipping interpretation, inputs unchanged");
            self.graph.set_clean(name);
            return;
        }

        let old_value = self.context.get(name).cloned();
        let result = self
            .interpreter
            .interpret(&content, self.context.as_mut(), InterpretMode::Exec);
        if result.is_success() {
            // The interpreter may have written the name itself (imports,
            // defs); otherwise store the returned value, null included,
            // whenever it differs from the current entry.
            let after = self.context.get(name).cloned();
            if after == old_value && old_value.as_ref() != Some(&result.value) {
                self.context.set(name, result.value.clone());
            }
            let new_value = self.context.get(name).cloned();
            if new_value != old_value {
                self.graph.update_event_stamp(name);
                fields |= EquationFields::VALUE;
            }
            self.set_outcome(group_id, name, EvalStatus::Success, None, &mut fields);
        } else {
            if self.context.remove(name) {
                self.graph.update_event_stamp(name);
                fields |= EquationFields::VALUE;
            }
            trace!(equation = name, status = %result.status, "interpretation failed");
            self.set_outcome(
                group_id,
                name,
                result.status,
                Some(result.message),
                &mut fields,
            );
        }
        self.finish_update(group_id, name, fields);
    }

    fn set_outcome(
        &mut self,
        group_id: GroupId,
        name: &str,
        status: EvalStatus,
        message: Option<String>,
        fields: &mut EquationFields,
    ) {
        let Some(equation) = self
            .groups
            .get_mut(&group_id)
            .and_then(|group| group.get_mut(name))
        else {
            return;
        };
        if equation.set_status(status) {
            *fields |= EquationFields::STATUS;
        }
        if equation.set_message(message.unwrap_or_default()) {
            *fields |= EquationFields::MESSAGE;
        }
    }

    fn finish_update(&mut self, group_id: GroupId, name: &str, fields: EquationFields) {
        self.graph.set_clean(name);
        if fields.is_empty() {
            return;
        }
        if let Some(equation) = self.groups.get(&group_id).and_then(|group| group.get(name)) {
            self.signals.equation_updated.emit(equation, fields);
        }
    }
}

impl std::fmt::Debug for EquationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EquationManager")
            .field("groups", &self.groups.len())
            .field("equations", &self.owner_of.len())
            .field("graph", &self.graph.stats())
            .finish_non_exhaustive()
    }
}
