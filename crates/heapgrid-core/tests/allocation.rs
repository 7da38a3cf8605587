//! Allocation caller-chain population and auto-expansion.

mod common;

use std::sync::Arc;

use heapgrid_core::{GridConfig, HeapGrid, NodeId, NodeKind};
use heapgrid_model::AllocationCallers;

use common::{MockSnapshot, allocation_frame};

fn caller_names(grid: &HeapGrid, id: NodeId) -> Vec<String> {
    grid.children(id)
        .expect("children")
        .iter()
        .filter_map(|entry| entry.node_id())
        .map(|child| match grid.node(child).expect("child").kind() {
            NodeKind::Allocation(meta) => meta.frame().name.clone(),
            other => panic!("expected allocation rows, got {other:?}"),
        })
        .collect()
}

#[tokio::test]
async fn expand_appends_the_single_caller_chain_then_branching_callers() {
    let mut snapshot = MockSnapshot::default();
    snapshot.allocation_callers.insert(
        1,
        AllocationCallers {
            nodes_with_single_caller: vec![
                allocation_frame(2, "allocate", 10, 100, true),
                allocation_frame(3, "makeBuffer", 10, 100, true),
            ],
            branching_callers: vec![
                allocation_frame(4, "onClick", 2, 10, false),
                allocation_frame(5, "onTimer", 8, 90, false),
            ],
        },
    );
    let mut grid = HeapGrid::new(Arc::new(snapshot), GridConfig::default());
    let head = grid
        .attach_allocation(allocation_frame(1, "ArrayBuffer", 20, 200, true))
        .expect("attach allocation row");

    grid.expand(head).await.expect("expand");

    // Chain: head -> allocate -> makeBuffer, each link expanded with the
    // head and pre-populated.
    let allocate = grid.children(head).expect("children")[0]
        .node_id()
        .expect("chain link");
    assert_eq!(caller_names(&grid, head), ["allocate"]);
    assert_eq!(caller_names(&grid, allocate), ["makeBuffer"]);
    assert!(grid.node(allocate).expect("allocate").is_expanded());
    assert!(grid.node(allocate).expect("allocate").is_populated());

    // Branching callers hang off the last chain link, largest size first
    // under the default sort.
    let make_buffer = grid.children(allocate).expect("children")[0]
        .node_id()
        .expect("chain link");
    assert!(grid.node(make_buffer).expect("makeBuffer").is_expanded());
    assert_eq!(caller_names(&grid, make_buffer), ["onTimer", "onClick"]);
}

#[tokio::test]
async fn branching_only_nodes_do_not_auto_expand_past_the_fork() {
    let mut snapshot = MockSnapshot::default();
    snapshot.allocation_callers.insert(
        1,
        AllocationCallers {
            nodes_with_single_caller: vec![],
            branching_callers: vec![
                allocation_frame(4, "onClick", 2, 10, false),
                allocation_frame(5, "onTimer", 8, 90, false),
            ],
        },
    );
    let mut grid = HeapGrid::new(Arc::new(snapshot), GridConfig::default());
    let head = grid
        .attach_allocation(allocation_frame(1, "ArrayBuffer", 20, 200, true))
        .expect("attach allocation row");

    grid.expand(head).await.expect("expand");

    assert_eq!(caller_names(&grid, head), ["onTimer", "onClick"]);
    for entry in grid.children(head).expect("children").to_vec() {
        let child = entry.node_id().expect("allocation child");
        assert!(!grid.node(child).expect("child").is_expanded());
    }
}
