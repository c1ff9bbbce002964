use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// A directed dependency edge: `from` depends on `to`.
///
/// Edges are stored independently of node membership, so an equation may
/// reference a name that has no live definition yet. Such an edge is *latent*;
/// it becomes *active* (reflected in both endpoints' adjacency sets) as soon
/// as both nodes exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    from: String,
    to: String,
}

impl Edge {
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    #[must_use]
    pub fn from(&self) -> &str {
        &self.from
    }

    #[must_use]
    pub fn to(&self) -> &str {
        &self.to
    }
}

/// Per-name vertex state. Adjacency sets contain **active** edges only.
#[derive(Debug, Clone, Default)]
pub struct Node {
    dependencies: HashSet<String>,
    dependents: HashSet<String>,
    dirty: bool,
    event_stamp: u64,
}

impl Node {
    #[must_use]
    pub fn dependencies(&self) -> &HashSet<String> {
        &self.dependencies
    }

    #[must_use]
    pub fn dependents(&self) -> &HashSet<String> {
        &self.dependents
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Monotone counter stamped on the node after its last observable write.
    #[must_use]
    pub fn event_stamp(&self) -> u64 {
        self.event_stamp
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    /// Cycle path of length ≥ 2; the first and last name are equal.
    pub path: Vec<String>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dependency cycle detected: ")?;
        for (idx, name) in self.path.iter().enumerate() {
            if idx > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{name}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CycleError {}

#[derive(Debug, Clone)]
pub struct GraphStats {
    pub nodes: usize,
    /// All edges, latent included.
    pub edges: usize,
    pub active_edges: usize,
    pub dirty: usize,
}

#[derive(Debug)]
enum UndoOp {
    AddNode(String),
    RemoveNode {
        name: String,
        index: usize,
        dirty: bool,
        event_stamp: u64,
    },
    AddEdge(Edge),
    RemoveEdge(Edge),
}

/// Name-keyed dependency graph with latent edges and commit-time cycle
/// detection.
///
/// Nodes exist only for names with a live definition; a reference to an
/// undefined name stays latent until the name is defined, at which point the
/// edge re-activates automatically. Mutations inside a [`batch_update`]
/// scope are recorded on an undo log and rolled back as one unit if the
/// batch would commit a cycle.
///
/// [`batch_update`]: DependencyGraph::batch_update
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: IndexMap<String, Node>,
    edges_by_from: HashMap<String, BTreeSet<String>>,
    edges_by_to: HashMap<String, BTreeSet<String>>,
    edge_count: usize,
    next_stamp: u64,
    batch: Option<Vec<UndoOp>>,
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node names in insertion order.
    #[must_use]
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    #[must_use]
    pub fn contains_edge(&self, from: &str, to: &str) -> bool {
        self.edges_by_from
            .get(from)
            .is_some_and(|targets| targets.contains(to))
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Every stored edge, latent included, sorted for determinism.
    #[must_use]
    pub fn edges(&self) -> Vec<Edge> {
        let mut out: Vec<Edge> = self
            .edges_by_from
            .iter()
            .flat_map(|(from, targets)| {
                targets.iter().map(move |to| Edge::new(from.clone(), to.clone()))
            })
            .collect();
        out.sort();
        out
    }

    #[must_use]
    pub fn edges_from(&self, from: &str) -> Vec<Edge> {
        self.edges_by_from
            .get(from)
            .into_iter()
            .flatten()
            .map(|to| Edge::new(from, to.clone()))
            .collect()
    }

    #[must_use]
    pub fn edges_to(&self, to: &str) -> Vec<Edge> {
        self.edges_by_to
            .get(to)
            .into_iter()
            .flatten()
            .map(|from| Edge::new(from.clone(), to))
            .collect()
    }

    /// Targets of every `from = name` edge, latent included.
    ///
    /// The missing-dependency check is `declared − active`: a declared target
    /// with no node is an unsatisfied reference.
    #[must_use]
    pub fn declared_dependencies(&self, name: &str) -> Vec<String> {
        self.edges_by_from
            .get(name)
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            nodes: self.nodes.len(),
            edges: self.edge_count,
            active_edges: self.nodes.values().map(|n| n.dependencies.len()).sum(),
            dirty: self.nodes.values().filter(|n| n.dirty).count(),
        }
    }

    /// Adds a node, activating every latent edge that touches it.
    ///
    /// Idempotent; returns whether the node was actually inserted.
    pub fn add_node(&mut self, name: &str) -> bool {
        if self.nodes.contains_key(name) {
            return false;
        }
        self.nodes.insert(name.to_string(), Node::default());

        let outgoing: Vec<String> = self
            .edges_by_from
            .get(name)
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        for to in outgoing {
            self.activate_edge(name, &to);
        }

        let incoming: Vec<String> = self
            .edges_by_to
            .get(name)
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        for from in incoming {
            self.activate_edge(&from, name);
        }

        if let Some(log) = &mut self.batch {
            log.push(UndoOp::AddNode(name.to_string()));
        }
        true
    }

    /// Removes a node, downgrading its edges back to latent.
    ///
    /// Edges are retained so a later [`add_node`] with the same name
    /// re-activates them. Idempotent.
    ///
    /// [`add_node`]: DependencyGraph::add_node
    pub fn remove_node(&mut self, name: &str) -> bool {
        let Some(index) = self.nodes.get_index_of(name) else {
            return false;
        };
        let (_, node) = self
            .nodes
            .shift_remove_index(index)
            .expect("index looked up above");

        let outgoing: Vec<String> = self
            .edges_by_from
            .get(name)
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        for to in outgoing {
            if let Some(n) = self.nodes.get_mut(&to) {
                n.dependents.remove(name);
            }
        }

        let incoming: Vec<String> = self
            .edges_by_to
            .get(name)
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        for from in incoming {
            if let Some(n) = self.nodes.get_mut(&from) {
                n.dependencies.remove(name);
            }
        }

        if let Some(log) = &mut self.batch {
            log.push(UndoOp::RemoveNode {
                name: name.to_string(),
                index,
                dirty: node.dirty,
                event_stamp: node.event_stamp,
            });
        }
        true
    }

    /// Inserts a `from depends on to` edge; activates it only when both
    /// endpoints exist. Idempotent.
    pub fn add_edge(&mut self, from: &str, to: &str) -> bool {
        if self.contains_edge(from, to) {
            return false;
        }
        self.edges_by_from
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        self.edges_by_to
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
        self.edge_count += 1;

        self.activate_edge(from, to);

        if let Some(log) = &mut self.batch {
            log.push(UndoOp::AddEdge(Edge::new(from, to)));
        }
        true
    }

    /// Removes an edge entirely (latent storage included). Idempotent.
    pub fn remove_edge(&mut self, from: &str, to: &str) -> bool {
        if !self.contains_edge(from, to) {
            return false;
        }
        if let Some(targets) = self.edges_by_from.get_mut(from) {
            targets.remove(to);
            if targets.is_empty() {
                self.edges_by_from.remove(from);
            }
        }
        if let Some(sources) = self.edges_by_to.get_mut(to) {
            sources.remove(from);
            if sources.is_empty() {
                self.edges_by_to.remove(to);
            }
        }
        self.edge_count -= 1;

        if let Some(n) = self.nodes.get_mut(from) {
            n.dependencies.remove(to);
        }
        if let Some(n) = self.nodes.get_mut(to) {
            n.dependents.remove(from);
        }

        if let Some(log) = &mut self.batch {
            log.push(UndoOp::RemoveEdge(Edge::new(from, to)));
        }
        true
    }

    /// Drops every `from = name` edge. Used when a definition is removed or
    /// replaced and its declared dependencies no longer apply.
    pub fn clear_dependency_edges(&mut self, name: &str) {
        let targets: Vec<String> = self
            .edges_by_from
            .get(name)
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        for to in targets {
            self.remove_edge(name, &to);
        }
    }

    fn activate_edge(&mut self, from: &str, to: &str) {
        if self.nodes.contains_key(from) && self.nodes.contains_key(to) {
            self.nodes
                .get_mut(from)
                .expect("endpoint checked above")
                .dependencies
                .insert(to.to_string());
            self.nodes
                .get_mut(to)
                .expect("endpoint checked above")
                .dependents
                .insert(from.to_string());
        }
    }

    /// Marks `name` and all transitive dependents dirty.
    ///
    /// Propagation stops at nodes that are already dirty: their dependents
    /// were marked when they were. Idempotent; a no-op for unknown names.
    pub fn mark_dirty(&mut self, name: &str) {
        if !self.nodes.contains_key(name) {
            return;
        }
        let mut queue = VecDeque::new();
        queue.push_back(name.to_string());
        while let Some(cur) = queue.pop_front() {
            let Some(node) = self.nodes.get_mut(&cur) else {
                continue;
            };
            if node.dirty {
                continue;
            }
            node.dirty = true;
            let dependents: Vec<String> = node.dependents.iter().cloned().collect();
            queue.extend(dependents);
        }
    }

    pub fn set_clean(&mut self, name: &str) {
        if let Some(node) = self.nodes.get_mut(name) {
            node.dirty = false;
        }
    }

    #[must_use]
    pub fn is_dirty(&self, name: &str) -> bool {
        self.nodes.get(name).is_some_and(|n| n.dirty)
    }

    /// Stamps the node with a fresh value strictly greater than any stamp
    /// issued before, across the whole graph.
    pub fn update_event_stamp(&mut self, name: &str) {
        if let Some(node) = self.nodes.get_mut(name) {
            self.next_stamp += 1;
            node.event_stamp = self.next_stamp;
        }
    }

    /// Kahn's algorithm over all existing nodes; dependencies precede
    /// dependents. Ties between ready nodes break by node insertion order.
    ///
    /// When the graph contains a cycle the returned order is shorter than
    /// [`node_count`]; [`batch_update`] commits use that as the cycle test.
    ///
    /// [`node_count`]: DependencyGraph::node_count
    /// [`batch_update`]: DependencyGraph::batch_update
    #[must_use]
    pub fn topological_sort(&self) -> Vec<String> {
        let mut in_degree: Vec<usize> = self
            .nodes
            .values()
            .map(|node| node.dependencies.len())
            .collect();

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter_map(|(idx, &deg)| (deg == 0).then_some(idx))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(idx) = ready.pop_first() {
            let (name, node) = self
                .nodes
                .get_index(idx)
                .expect("ready indices come from the node table");
            order.push(name.clone());
            for dependent in &node.dependents {
                let dep_idx = self
                    .nodes
                    .get_index_of(dependent)
                    .expect("active dependents are existing nodes");
                in_degree[dep_idx] -= 1;
                if in_degree[dep_idx] == 0 {
                    ready.insert(dep_idx);
                }
            }
        }
        order
    }

    /// The subgraph reachable from `seed` via dependents (seed included), in
    /// the same deterministic order as [`topological_sort`].
    ///
    /// [`topological_sort`]: DependencyGraph::topological_sort
    #[must_use]
    pub fn topological_sort_from(&self, seed: &str) -> Vec<String> {
        self.topological_sort_from_many(std::iter::once(seed))
    }

    /// Like [`topological_sort_from`], seeded from several names at once.
    ///
    /// [`topological_sort_from`]: DependencyGraph::topological_sort_from
    #[must_use]
    pub fn topological_sort_from_many<'a>(
        &self,
        seeds: impl IntoIterator<Item = &'a str>,
    ) -> Vec<String> {
        let mut reachable: HashSet<usize> = HashSet::new();
        let mut queue = VecDeque::new();
        for seed in seeds {
            if let Some(idx) = self.nodes.get_index_of(seed) {
                if reachable.insert(idx) {
                    queue.push_back(idx);
                }
            }
        }
        while let Some(idx) = queue.pop_front() {
            let (_, node) = self
                .nodes
                .get_index(idx)
                .expect("reachable indices come from the node table");
            for dependent in &node.dependents {
                let dep_idx = self
                    .nodes
                    .get_index_of(dependent)
                    .expect("active dependents are existing nodes");
                if reachable.insert(dep_idx) {
                    queue.push_back(dep_idx);
                }
            }
        }

        let mut in_degree: HashMap<usize, usize> = HashMap::with_capacity(reachable.len());
        let mut ready: BTreeSet<usize> = BTreeSet::new();
        for &idx in &reachable {
            let (_, node) = self.nodes.get_index(idx).expect("reachable node");
            let deg = node
                .dependencies
                .iter()
                .filter(|dep| {
                    self.nodes
                        .get_index_of(dep.as_str())
                        .is_some_and(|i| reachable.contains(&i))
                })
                .count();
            in_degree.insert(idx, deg);
            if deg == 0 {
                ready.insert(idx);
            }
        }

        let mut order = Vec::with_capacity(reachable.len());
        while let Some(idx) = ready.pop_first() {
            let (name, node) = self.nodes.get_index(idx).expect("reachable node");
            order.push(name.clone());
            for dependent in &node.dependents {
                let dep_idx = self
                    .nodes
                    .get_index_of(dependent)
                    .expect("active dependents are existing nodes");
                if let Some(deg) = in_degree.get_mut(&dep_idx) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(dep_idx);
                    }
                }
            }
        }
        order
    }

    /// Opens a batch scope. Structural mutations made through the guard are
    /// recorded; [`BatchGuard::commit`] runs the cycle check and either
    /// discards the log or rolls everything back and reports the cycle path.
    /// Dropping the guard without committing rolls back unconditionally.
    ///
    /// Guards cannot nest: the guard holds the only mutable borrow.
    pub fn batch_update(&mut self) -> BatchGuard<'_> {
        self.batch = Some(Vec::new());
        BatchGuard {
            graph: self,
            committed: false,
        }
    }

    fn end_batch(&mut self) -> Result<(), CycleError> {
        if self.topological_sort().len() == self.nodes.len() {
            self.batch = None;
            return Ok(());
        }
        let path = self.find_cycle().unwrap_or_default();
        self.rollback_batch();
        Err(CycleError { path })
    }

    fn rollback_batch(&mut self) {
        let Some(log) = self.batch.take() else {
            return;
        };
        for op in log.into_iter().rev() {
            match op {
                UndoOp::AddNode(name) => {
                    self.remove_node(&name);
                }
                UndoOp::RemoveNode {
                    name,
                    index,
                    dirty,
                    event_stamp,
                } => {
                    // add_node appends; put the node back where it was so
                    // insertion-order tie-breaking is restored exactly.
                    self.add_node(&name);
                    let last = self.nodes.len() - 1;
                    if index < last {
                        self.nodes.move_index(last, index);
                    }
                    let node = self
                        .nodes
                        .get_mut(&name)
                        .expect("node re-added during rollback");
                    node.dirty = dirty;
                    node.event_stamp = event_stamp;
                }
                UndoOp::AddEdge(edge) => {
                    self.remove_edge(&edge.from, &edge.to);
                }
                UndoOp::RemoveEdge(edge) => {
                    self.add_edge(&edge.from, &edge.to);
                }
            }
        }
    }

    /// DFS cycle-path extraction over the nodes a failed Kahn pass could not
    /// emit, following active dependencies. When a dependency is found on the
    /// current DFS stack, the stack suffix (closed with the repeated name) is
    /// the cycle.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let emitted: HashSet<String> = self.topological_sort().into_iter().collect();
        let remaining: Vec<&String> = self
            .nodes
            .keys()
            .filter(|name| !emitted.contains(*name))
            .collect();
        if remaining.is_empty() {
            return None;
        }
        let remaining_set: HashSet<&str> = remaining.iter().map(|s| s.as_str()).collect();

        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        struct Frame {
            name: String,
            neighbors: Vec<String>,
            idx: usize,
        }

        let sorted_neighbors = |name: &str| -> Vec<String> {
            let Some(node) = self.nodes.get(name) else {
                return Vec::new();
            };
            let mut out: Vec<String> = node
                .dependencies
                .iter()
                .filter(|dep| remaining_set.contains(dep.as_str()))
                .cloned()
                .collect();
            out.sort_by_key(|n| self.nodes.get_index_of(n.as_str()));
            out
        };

        let mut color: HashMap<&str, Color> = remaining_set
            .iter()
            .map(|&name| (name, Color::White))
            .collect();

        for start in &remaining {
            if color.get(start.as_str()) != Some(&Color::White) {
                continue;
            }

            let mut stack: Vec<String> = vec![(*start).clone()];
            let mut pos_in_stack: HashMap<String, usize> = HashMap::new();
            pos_in_stack.insert((*start).clone(), 0);
            color.insert(start.as_str(), Color::Gray);
            let mut frames = vec![Frame {
                name: (*start).clone(),
                neighbors: sorted_neighbors(start.as_str()),
                idx: 0,
            }];

            while let Some(frame) = frames.last_mut() {
                if frame.idx >= frame.neighbors.len() {
                    let done = frame.name.clone();
                    if let Some(entry) = self.nodes.get_key_value(done.as_str()) {
                        color.insert(entry.0.as_str(), Color::Black);
                    }
                    pos_in_stack.remove(&done);
                    stack.pop();
                    frames.pop();
                    continue;
                }

                let next = frame.neighbors[frame.idx].clone();
                frame.idx += 1;

                match color.get(next.as_str()).copied().unwrap_or(Color::Black) {
                    Color::White => {
                        color.insert(
                            self.nodes
                                .get_key_value(next.as_str())
                                .expect("neighbor is an existing node")
                                .0
                                .as_str(),
                            Color::Gray,
                        );
                        stack.push(next.clone());
                        pos_in_stack.insert(next.clone(), stack.len() - 1);
                        frames.push(Frame {
                            neighbors: sorted_neighbors(&next),
                            name: next,
                            idx: 0,
                        });
                    }
                    Color::Gray => {
                        let start_idx = pos_in_stack.get(&next).copied().unwrap_or(0);
                        let mut cycle: Vec<String> = stack[start_idx..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                    Color::Black => {}
                }
            }
        }
        None
    }

    /// Drops every node and edge and restarts the stamp counter.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.edges_by_from.clear();
        self.edges_by_to.clear();
        self.edge_count = 0;
        self.next_stamp = 0;
        self.batch = None;
    }
}

/// Scoped batch handle returned by [`DependencyGraph::batch_update`].
///
/// Derefs to the graph so mutations go through the usual methods. `commit`
/// performs the cycle check; dropping the guard un-committed rolls back.
#[derive(Debug)]
pub struct BatchGuard<'g> {
    graph: &'g mut DependencyGraph,
    committed: bool,
}

impl BatchGuard<'_> {
    pub fn commit(mut self) -> Result<(), CycleError> {
        self.committed = true;
        self.graph.end_batch()
    }
}

impl Deref for BatchGuard<'_> {
    type Target = DependencyGraph;

    fn deref(&self) -> &Self::Target {
        self.graph
    }
}

impl DerefMut for BatchGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.graph
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.graph.rollback_batch();
        }
    }
}
