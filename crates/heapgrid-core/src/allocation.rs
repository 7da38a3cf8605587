//! Allocation stack population.
//!
//! Allocation rows bypass the range machinery: the callers of a frame are
//! fetched in one request, the unambiguous single-caller chain is appended
//! link by link (each link pre-populated, and expanded along with the
//! head), and the branching callers follow, ordered by the grid's current
//! allocation sort column.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use heapgrid_model::{AllocationFrame, SortColumn};

use crate::error::{GridError, Result};
use crate::grid::{GridEvent, HeapGrid};
use crate::node::{ChildEntry, GridNode, NodeId, NodeKind};

impl HeapGrid {
    pub(crate) async fn populate_allocation_node(&mut self, id: NodeId) -> Result<()> {
        let frame_id = match &self.node(id)?.kind {
            NodeKind::Allocation(meta) => meta.frame.id,
            _ => return Err(GridError::UnsupportedNodeKind),
        };
        self.node_mut(id)?.populated = true;
        debug!(node = id.0, frame = frame_id, "fetching allocation callers");

        let snapshot = Arc::clone(&self.snapshot);
        let callers = snapshot
            .allocation_node_callers(frame_id)
            .await
            .map_err(GridError::provider)?;

        let head_expanded = self.node(id)?.is_expanded();
        let mut parent = id;
        for frame in callers.nodes_with_single_caller {
            let child = self.append_allocation_child(parent, frame)?;
            let child_node = self.node_mut(child)?;
            child_node.populated = true;
            if head_expanded {
                child_node.expanded = true;
            }
            parent = child;
        }

        let mut branching = callers.branching_callers;
        let (column, ascending) = self.sort_order();
        branching.sort_by(|a, b| allocation_order(column, ascending, a, b));
        for frame in branching {
            self.append_allocation_child(parent, frame)?;
        }
        self.push_event(GridEvent::VisibleNodesChanged);
        Ok(())
    }

    fn append_allocation_child(&mut self, parent: NodeId, frame: AllocationFrame) -> Result<NodeId> {
        let child = self.alloc(GridNode::new_allocation(frame, Some(parent)));
        self.node_mut(parent)?.children.push(ChildEntry::Node(child));
        Ok(child)
    }
}

fn allocation_order(
    column: SortColumn,
    ascending: bool,
    a: &AllocationFrame,
    b: &AllocationFrame,
) -> Ordering {
    let ordering = match column {
        SortColumn::Name => a.name.cmp(&b.name),
        SortColumn::Count => a.count.cmp(&b.count),
        SortColumn::LiveCount => a.live_count.cmp(&b.live_count),
        SortColumn::LiveSize => a.live_size.cmp(&b.live_size),
        _ => a.size.cmp(&b.size),
    };
    if ascending { ordering } else { ordering.reverse() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(name: &str, count: u64, size: u64) -> AllocationFrame {
        AllocationFrame {
            id: 1,
            name: name.to_string(),
            script_name: "app.js".to_string(),
            script_id: 1,
            line: 1,
            column: 1,
            count,
            size,
            live_count: count,
            live_size: size,
            has_children: false,
        }
    }

    #[test]
    fn branching_callers_order_by_size_descending_by_default() {
        let mut frames = vec![frame("a", 1, 10), frame("b", 2, 30), frame("c", 3, 20)];
        frames.sort_by(|a, b| allocation_order(SortColumn::Size, false, a, b));
        let names: Vec<_> = frames.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["b", "c", "a"]);
    }

    #[test]
    fn name_column_orders_lexicographically() {
        let mut frames = vec![frame("zz", 1, 10), frame("aa", 2, 30)];
        frames.sort_by(|a, b| allocation_order(SortColumn::Name, true, a, b));
        assert_eq!(frames[0].name, "aa");
    }
}
