mod common;

use common::{int, new_manager};
use equation_engine::{EquationError, EvalStatus, GroupId};
use pretty_assertions::assert_eq;

/// Full observable manager state, captured for atomicity checks.
#[derive(Debug, PartialEq)]
struct Snapshot {
    nodes: Vec<String>,
    edges: Vec<(String, String)>,
    dirty: Vec<String>,
    context_keys: Vec<String>,
    equations: Vec<(String, String, Vec<String>)>,
    statements: Vec<String>,
}

fn snapshot(manager: &equation_engine::EquationManager) -> Snapshot {
    let graph = manager.graph();
    Snapshot {
        nodes: graph.node_names(),
        edges: graph
            .edges()
            .iter()
            .map(|e| (e.from().to_string(), e.to().to_string()))
            .collect(),
        dirty: graph
            .node_names()
            .into_iter()
            .filter(|n| graph.is_dirty(n))
            .collect(),
        context_keys: manager.context().keys(),
        equations: manager
            .groups()
            .flat_map(|group| group.equations())
            .map(|eq| {
                (
                    eq.name().to_string(),
                    eq.content().to_string(),
                    eq.dependencies().to_vec(),
                )
            })
            .collect(),
        statements: manager
            .groups()
            .map(|group| group.statement().to_string())
            .collect(),
    }
}

#[test]
fn cycle_on_add_leaves_state_untouched() {
    let mut manager = new_manager();
    manager.add_group("a=b*c;b=d;c=2").unwrap();
    manager.add_group("d=e").unwrap();
    manager.update();
    let before = snapshot(&manager);

    assert!(matches!(
        manager.add_group("e=b"),
        Err(EquationError::Cycle(_))
    ));
    assert_eq!(snapshot(&manager), before);

    assert!(matches!(
        manager.add_group("d2=a+b;e=d2"),
        Err(EquationError::Cycle(_))
    ));
    assert_eq!(snapshot(&manager), before);
}

#[test]
fn cycle_on_edit_restores_previous_statement() {
    let mut manager = new_manager();
    let id = manager.add_group("a=1").unwrap();
    manager.add_group("b=a").unwrap();
    manager.update();
    let before = snapshot(&manager);

    assert!(matches!(
        manager.edit_group(id, "a=b"),
        Err(EquationError::Cycle(_))
    ));
    assert_eq!(snapshot(&manager), before);
    assert_eq!(manager.group(id).unwrap().statement(), "a=1");
}

#[test]
fn duplicate_on_add_and_edit_is_atomic() {
    let mut manager = new_manager();
    let id = manager.add_group("a=1;b=2").unwrap();
    manager.add_group("c=3").unwrap();
    manager.update();
    let before = snapshot(&manager);

    let err = manager.add_group("x=1;a=3").unwrap_err();
    assert!(matches!(err, EquationError::DuplicateName(name) if name == "a"));
    assert_eq!(snapshot(&manager), before);

    let err = manager.edit_group(id, "c=2").unwrap_err();
    assert!(matches!(err, EquationError::DuplicateName(name) if name == "c"));
    assert_eq!(snapshot(&manager), before);

    // Duplicates inside one statement are rejected too.
    let err = manager.add_group("y=1;y=2").unwrap_err();
    assert!(matches!(err, EquationError::DuplicateName(name) if name == "y"));
    assert_eq!(snapshot(&manager), before);
}

#[test]
fn parse_error_is_atomic() {
    let mut manager = new_manager();
    let id = manager.add_group("a=1").unwrap();
    manager.update();
    let before = snapshot(&manager);

    assert!(matches!(
        manager.add_group("not a statement"),
        Err(EquationError::Parse(_))
    ));
    assert!(matches!(
        manager.edit_group(id, "==="),
        Err(EquationError::Parse(_))
    ));
    assert_eq!(snapshot(&manager), before);
}

#[test]
fn unknown_group_and_equation_report_not_found() {
    let mut manager = new_manager();
    let id = manager.add_group("a=1").unwrap();
    manager.remove_group(id).unwrap();

    assert!(matches!(
        manager.edit_group(id, "a=2"),
        Err(EquationError::GroupNotFound(found)) if found == id
    ));
    assert!(matches!(
        manager.remove_group(id),
        Err(EquationError::GroupNotFound(found)) if found == id
    ));
    assert!(matches!(
        manager.update_equation("a"),
        Err(EquationError::EquationNotFound(name)) if name == "a"
    ));
    assert!(matches!(
        manager.mark_dirty("a"),
        Err(EquationError::EquationNotFound(name)) if name == "a"
    ));

    let ghost: GroupId = GroupId::new_v4();
    assert!(manager.group(ghost).is_none());
    assert!(!manager.contains_group(ghost));
}

#[test]
fn group_accessors_reflect_statement_order() {
    let mut manager = new_manager();
    let id = manager.add_group("d=1;b=d;a=b").unwrap();

    let group = manager.group(id).unwrap();
    assert_eq!(group.equation_names(), vec!["d", "b", "a"]);
    assert_eq!(group.statement(), "d=1;b=d;a=b");
    assert_eq!(group.len(), 3);
    assert!(group.contains("b"));
    assert!(!group.is_empty());

    let b = manager.equation("b").unwrap();
    assert_eq!(b.group_id(), id);
    assert_eq!(b.content(), "d");
    assert_eq!(b.dependencies(), ["d"]);
    assert_eq!(b.status(), EvalStatus::Init);
    assert_eq!(manager.group_of("b"), Some(id));
}

#[test]
fn edit_keeps_group_id_and_reorders_equations() {
    let mut manager = new_manager();
    let id = manager.add_group("a=1").unwrap();
    manager.edit_group(id, "a=2;b=a").unwrap();
    assert_eq!(
        manager.group(id).unwrap().equation_names(),
        vec!["a", "b"]
    );

    manager.edit_group(id, "b=3;c=b+1").unwrap();
    let group = manager.group(id).unwrap();
    assert_eq!(group.id(), id);
    assert_eq!(group.equation_names(), vec!["b", "c"]);
    assert!(!manager.contains_equation("a"));

    manager.update();
    assert_eq!(int(&manager, "b"), Some(3));
    assert_eq!(int(&manager, "c"), Some(4));
}

#[test]
fn update_equation_walks_only_the_dependent_cone() {
    let mut manager = new_manager();
    let id = manager.add_group("e=5").unwrap();
    manager.add_group("d=e;f=1").unwrap();
    manager.add_group("g=d+e").unwrap();
    manager.update();
    assert_eq!(int(&manager, "g"), Some(10));

    manager.edit_group(id, "e=6").unwrap();
    manager.update_equation("e").unwrap();

    assert_eq!(int(&manager, "e"), Some(6));
    assert_eq!(int(&manager, "d"), Some(6));
    assert_eq!(int(&manager, "g"), Some(12));
    assert_eq!(int(&manager, "f"), Some(1));
}

#[test]
fn reset_clears_everything() {
    let mut manager = new_manager();
    manager.add_group("a=1;b=a").unwrap();
    manager.update();
    assert!(manager.context().contains("a"));

    manager.reset();
    assert_eq!(manager.groups().count(), 0);
    assert!(!manager.contains_equation("a"));
    assert_eq!(manager.graph().node_count(), 0);
    assert_eq!(manager.graph().edge_count(), 0);
    assert!(manager.context().keys().is_empty());

    // The manager is usable again after a reset.
    manager.add_group("a=7").unwrap();
    manager.update();
    assert_eq!(int(&manager, "a"), Some(7));
}

#[test]
fn editing_content_without_dependency_change_still_propagates() {
    let mut manager = new_manager();
    let id = manager.add_group("a=1").unwrap();
    manager.add_group("b=a+1").unwrap();
    manager.update();
    assert_eq!(int(&manager, "b"), Some(2));

    manager.edit_group(id, "a=41").unwrap();
    manager.update();
    assert_eq!(int(&manager, "a"), Some(41));
    assert_eq!(int(&manager, "b"), Some(42));
}
