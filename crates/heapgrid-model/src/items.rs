//! Heap graph item records exchanged with the snapshot backend.
//!
//! These are the wire-visible types: a snapshot provider serializes slices
//! of its virtual item sequence into [`ItemsRange`] envelopes, and the grid
//! turns the contained [`ProviderItem`]s into tree nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Distances at or above this value are synthetic ("reachable only through
/// internal system roots") and are rendered as unreachable.
pub const BASE_SYSTEM_DISTANCE: i32 = 100_000_000;

/// Stable identifier of a heap object, constant across snapshots of the
/// same process. This is the key used to correlate items across re-sorts
/// and across two diffed snapshots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SnapshotObjectId(pub u64);

impl SnapshotObjectId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SnapshotObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Category of a heap graph node, as reported by the snapshot serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeapNodeType {
    Object,
    String,
    #[serde(rename = "concatenated string")]
    ConcatenatedString,
    Regexp,
    Closure,
    Array,
    Number,
    Bigint,
    Hidden,
    Code,
    Synthetic,
}

impl HeapNodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeapNodeType::Object => "object",
            HeapNodeType::String => "string",
            HeapNodeType::ConcatenatedString => "concatenated string",
            HeapNodeType::Regexp => "regexp",
            HeapNodeType::Closure => "closure",
            HeapNodeType::Array => "array",
            HeapNodeType::Number => "number",
            HeapNodeType::Bigint => "bigint",
            HeapNodeType::Hidden => "hidden",
            HeapNodeType::Code => "code",
            HeapNodeType::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for HeapNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a heap graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeapEdgeType {
    Property,
    Element,
    Context,
    Internal,
    Hidden,
    Shortcut,
    Weak,
    Invisible,
}

/// A heap graph node as serialized by the snapshot backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapNode {
    pub id: SnapshotObjectId,
    pub name: String,
    pub node_type: HeapNodeType,
    /// Graph distance from the nearest GC root.
    pub distance: i32,
    pub self_size: u64,
    pub retained_size: u64,
    /// Position of the node record inside the snapshot, used to address
    /// the node in provider factory calls.
    pub node_index: u64,
    #[serde(default)]
    pub can_be_queried: bool,
    #[serde(default)]
    pub detached_dom_tree_node: bool,
}

/// A heap graph edge together with its target node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapEdge {
    pub name: String,
    pub edge_type: HeapEdgeType,
    /// Position of the edge record inside the snapshot; stable identity of
    /// the reference itself.
    pub edge_index: u64,
    pub node: HeapNode,
}

/// A node flowing out of the diff-merge provider, tagged with the side of
/// the diff it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub node: HeapNode,
    pub is_added_not_removed: bool,
}

/// One frame of an allocation stack, with live/total allocation tallies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationFrame {
    pub id: u64,
    pub name: String,
    pub script_name: String,
    pub script_id: u64,
    pub line: u32,
    pub column: u32,
    pub count: u64,
    pub size: u64,
    pub live_count: u64,
    pub live_size: u64,
    pub has_children: bool,
}

/// Callers of an allocation frame, split into the unambiguous single-caller
/// chain and the callers where the stack branches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationCallers {
    pub nodes_with_single_caller: Vec<AllocationFrame>,
    pub branching_callers: Vec<AllocationFrame>,
}

/// Per-class summary of all instances with a given constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub count: u64,
    pub distance: i32,
    pub self_size: u64,
    pub max_retained_size: u64,
}

/// Per-class delta between a base snapshot and the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDiff {
    pub added_count: u64,
    pub removed_count: u64,
    pub count_delta: i64,
    pub added_size: u64,
    pub removed_size: u64,
    pub size_delta: i64,
    /// Snapshot-local indexes of the deleted instances in the base
    /// snapshot, handed to its deleted-nodes provider.
    pub deleted_indexes: Vec<u64>,
}

/// A single item of a provider's virtual sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderItem {
    Edge(HeapEdge),
    Node(HeapNode),
    Diff(DiffEntry),
}

impl ProviderItem {
    pub fn as_edge(&self) -> Option<&HeapEdge> {
        match self {
            ProviderItem::Edge(edge) => Some(edge),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&HeapNode> {
        match self {
            ProviderItem::Node(node) => Some(node),
            ProviderItem::Diff(entry) => Some(&entry.node),
            ProviderItem::Edge(_) => None,
        }
    }
}

/// A serialized slice of a provider's virtual sequence.
///
/// `start_position..end_position` is the half-open interval actually
/// covered by `items`; a provider is allowed to return a superset of what
/// was requested. `total_length` is the authoritative length of the whole
/// sequence under the current sort order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsRange {
    pub start_position: u64,
    pub end_position: u64,
    pub total_length: u64,
    pub items: Vec<ProviderItem>,
}

impl ItemsRange {
    pub fn new(
        start_position: u64,
        end_position: u64,
        total_length: u64,
        items: Vec<ProviderItem>,
    ) -> Self {
        Self {
            start_position,
            end_position,
            total_length,
            items,
        }
    }

    /// An empty slice of an empty sequence.
    pub fn empty() -> Self {
        Self::new(0, 0, 0, Vec::new())
    }
}

/// Stable, position-independent identity of a child row, used to match
/// previously expanded nodes when a parent is repopulated after a re-sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChildIdentity {
    /// A reference row keyed by the edge record index.
    Edge(u64),
    /// An instance row keyed by the snapshot object id.
    Object(SnapshotObjectId),
}
