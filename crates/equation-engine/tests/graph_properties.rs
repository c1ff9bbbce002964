use equation_engine::DependencyGraph;
use pretty_assertions::assert_eq;

#[test]
fn topological_order_respects_every_dependency() {
    // A layered DAG: row i depends on two nodes of row i-1.
    let mut graph = DependencyGraph::new();
    let rows = 20;
    let cols = 8;
    for row in 0..rows {
        for col in 0..cols {
            let name = format!("n{row}_{col}");
            graph.add_node(&name);
            if row > 0 {
                graph.add_edge(&name, &format!("n{}_{}", row - 1, col));
                graph.add_edge(&name, &format!("n{}_{}", row - 1, (col + 1) % cols));
            }
        }
    }

    let order = graph.topological_sort();
    assert_eq!(order.len(), graph.node_count());
    let position = |name: &str| order.iter().position(|n| n == name).unwrap();
    for name in graph.node_names() {
        let node = graph.node(&name).unwrap();
        for dep in node.dependencies() {
            assert!(
                position(dep) < position(&name),
                "{dep} must precede {name}"
            );
        }
    }

    // Determinism: a second sort of the same graph is identical.
    assert_eq!(graph.topological_sort(), order);
}

#[test]
fn latent_edge_survives_node_removal_and_readdition() {
    let mut graph = DependencyGraph::new();
    graph.add_node("a");
    graph.add_node("b");
    graph.add_edge("a", "b");

    graph.remove_node("b");
    graph.add_node("b");

    assert!(graph.node("a").unwrap().dependencies().contains("b"));
    assert!(graph.node("b").unwrap().dependents().contains("a"));
}

#[test]
fn dirty_closure_is_exactly_seed_plus_transitive_dependents() {
    // diamond: d -> {b, c} -> a, plus unrelated x
    let mut graph = DependencyGraph::new();
    for name in ["a", "b", "c", "d", "x"] {
        graph.add_node(name);
    }
    graph.add_edge("b", "a");
    graph.add_edge("c", "a");
    graph.add_edge("d", "b");
    graph.add_edge("d", "c");

    graph.mark_dirty("a");
    let dirty: Vec<String> = graph
        .node_names()
        .into_iter()
        .filter(|n| graph.is_dirty(n))
        .collect();
    assert_eq!(dirty, vec!["a", "b", "c", "d"]);

    // Idempotent.
    graph.mark_dirty("a");
    assert!(!graph.is_dirty("x"));
}

#[test]
fn cycle_path_is_reported_through_the_loop() {
    let mut graph = DependencyGraph::new();
    let mut guard = graph.batch_update();
    for name in ["a", "b", "c"] {
        guard.add_node(name);
    }
    guard.add_edge("a", "b");
    guard.add_edge("b", "c");
    guard.add_edge("c", "a");
    let err = guard.commit().unwrap_err();

    assert_eq!(err.path.len(), 4);
    assert_eq!(err.path.first(), err.path.last());
    for pair in err.path.windows(2) {
        assert_ne!(pair[0], pair[1]);
    }
    assert!(err.to_string().starts_with("dependency cycle detected: "));
}

#[test]
fn nodes_outside_the_cycle_are_not_in_the_path() {
    let mut graph = DependencyGraph::new();
    graph.add_node("root");
    let mut guard = graph.batch_update();
    for name in ["a", "b"] {
        guard.add_node(name);
    }
    // root depends on the cycle but is not part of it.
    guard.add_edge("root", "a");
    guard.add_edge("a", "b");
    guard.add_edge("b", "a");
    let err = guard.commit().unwrap_err();

    assert!(!err.path.contains(&"root".to_string()));
    assert_eq!(err.path.first(), err.path.last());
}

#[test]
fn handles_wide_fanout_without_pathological_behavior() {
    let mut graph = DependencyGraph::new();
    graph.add_node("input");
    let dependents = 10_000;
    for idx in 0..dependents {
        let name = format!("dep{idx}");
        graph.add_node(&name);
        graph.add_edge(&name, "input");
    }

    graph.mark_dirty("input");
    let dirty = graph.stats().dirty;
    assert_eq!(dirty, dependents + 1);

    let order = graph.topological_sort();
    assert_eq!(order.len(), dependents + 1);
    assert_eq!(order.first().map(String::as_str), Some("input"));
    // Ties resolve by insertion order.
    assert_eq!(order.get(1).map(String::as_str), Some("dep0"));
    assert_eq!(
        order.last().map(String::as_str),
        Some(format!("dep{}", dependents - 1).as_str())
    );
}

#[test]
fn subgraph_sort_from_many_merges_seed_cones() {
    let mut graph = DependencyGraph::new();
    for name in ["a", "b", "c", "d", "e"] {
        graph.add_node(name);
    }
    graph.add_edge("b", "a");
    graph.add_edge("c", "b");
    graph.add_edge("e", "d");

    let order = graph.topological_sort_from_many(["b", "d"]);
    assert_eq!(order, vec!["b", "c", "d", "e"]);
}
