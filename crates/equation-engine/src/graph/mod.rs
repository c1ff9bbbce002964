mod dependency_graph;

pub use dependency_graph::{
    BatchGuard, CycleError, DependencyGraph, Edge, GraphStats, Node,
};
