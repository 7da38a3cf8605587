//! Instance filtering for per-class node providers.

use serde::{Deserialize, Serialize};

use crate::items::SnapshotObjectId;

/// Restricts which instances a per-class nodes provider serves.
///
/// An empty filter matches every instance of the class. The id window is
/// used by the "objects allocated between snapshot A and B" views; the
/// allocation node id restricts instances to one allocation stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFilter {
    pub min_node_id: Option<SnapshotObjectId>,
    pub max_node_id: Option<SnapshotObjectId>,
    pub allocation_node_id: Option<u64>,
}

impl NodeFilter {
    /// Filter to instances with `min < id <= max`.
    pub fn for_snapshot_range(min_node_id: SnapshotObjectId, max_node_id: SnapshotObjectId) -> Self {
        Self {
            min_node_id: Some(min_node_id),
            max_node_id: Some(max_node_id),
            allocation_node_id: None,
        }
    }

    /// Filter to instances allocated at one allocation stack node.
    pub fn for_allocation_node_id(allocation_node_id: u64) -> Self {
        Self {
            min_node_id: None,
            max_node_id: None,
            allocation_node_id: Some(allocation_node_id),
        }
    }

    /// True when the filter does not constrain anything.
    pub fn is_unfiltered(&self) -> bool {
        self.min_node_id.is_none()
            && self.max_node_id.is_none()
            && self.allocation_node_id.is_none()
    }
}
