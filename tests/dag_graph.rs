// tests/dag_graph.rs

use taskdag::dag::JobDag;
use taskdag::errors::TaskdagError;

fn diamond() -> JobDag {
    JobDag::builder()
        .node("extract")
        .node("clean")
        .node("enrich")
        .node("load")
        .edge("extract", "clean")
        .edge("extract", "enrich")
        .edge("enrich", "load")
        .edge("clean", "load")
        .build()
        .unwrap()
}

#[test]
fn all_nodes_keeps_insertion_order() {
    let dag = diamond();
    let nodes: Vec<&str> = dag.all_nodes().collect();
    assert_eq!(nodes, vec!["extract", "clean", "enrich", "load"]);
    assert_eq!(dag.len(), 4);
}

#[test]
fn parents_and_children_are_in_node_order() {
    let dag = diamond();

    assert!(dag.direct_parents("extract").is_empty());
    assert_eq!(dag.direct_parents("load"), vec!["clean", "enrich"]);
    assert_eq!(dag.direct_children("extract"), vec!["clean", "enrich"]);
    assert!(dag.direct_children("load").is_empty());
    assert_eq!(dag.roots(), vec!["extract"]);
}

#[test]
fn unknown_job_has_no_neighbours() {
    let dag = diamond();
    assert!(!dag.contains("missing"));
    assert!(dag.direct_parents("missing").is_empty());
    assert!(dag.direct_children("missing").is_empty());
}

#[test]
fn duplicate_nodes_and_edges_collapse() {
    let dag = JobDag::builder()
        .node("a")
        .node("b")
        .node("a")
        .edge("a", "b")
        .edge("a", "b")
        .build()
        .unwrap();

    assert_eq!(dag.len(), 2);
    assert_eq!(dag.direct_parents("b"), vec!["a"]);
}

#[test]
fn cycle_is_rejected() {
    let result = JobDag::builder()
        .node("a")
        .node("b")
        .node("c")
        .edge("a", "b")
        .edge("b", "c")
        .edge("c", "a")
        .build();

    match result {
        Err(TaskdagError::CyclicDependency(msg)) => assert!(msg.contains("cycle detected")),
        other => panic!("Expected CyclicDependency, got: {:?}", other),
    }
}

#[test]
fn self_edge_is_a_cycle() {
    let result = JobDag::builder().node("a").edge("a", "a").build();
    assert!(matches!(result, Err(TaskdagError::CyclicDependency(_))));
}

#[test]
fn edge_to_unknown_job_is_rejected() {
    let result = JobDag::builder().node("a").edge("ghost", "a").build();

    match result {
        Err(TaskdagError::UnknownDependency { job, parent }) => {
            assert_eq!(job, "a");
            assert_eq!(parent, "ghost");
        }
        other => panic!("Expected UnknownDependency, got: {:?}", other),
    }
}
