//! Grid nodes and their kind-specific capabilities.
//!
//! All node kinds share one population/sort engine. A kind contributes the
//! four capabilities the engine needs: how to build a provider, how a
//! fetched item becomes a child node, the stable identity used to match
//! children across re-sorts, and the comparator table for the current sort
//! column. The kinds are a tagged union rather than a class hierarchy; the
//! engine matches on them in exactly those four places.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use heapgrid_model::{
    Aggregate, AllocationFrame, ChildIdentity, ClassDiff, ComparatorConfig, HeapEdge, HeapNode,
    NodeFilter, ProviderItem, SortColumn, SortField,
};

use crate::columns::{
    ColumnId, signed_with_separator, to_percent_string, to_ui_distance, with_thousands_separator,
};
use crate::provider::{ChildrenProvider, SnapshotAccess};
use crate::ranges::RangeList;

/// Handle to a node inside a [`HeapGrid`](crate::HeapGrid) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// One entry of a node's ordered child list: either a materialized child
/// or a "show more" placeholder standing in for the unfetched interval
/// `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEntry {
    Node(NodeId),
    More { from: u64, to: u64 },
}

impl ChildEntry {
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            ChildEntry::Node(id) => Some(*id),
            ChildEntry::More { .. } => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ChildEntry::More { .. })
    }
}

/// A reference row: one edge of a parent object, pointing at its target.
pub struct ObjectMeta {
    pub(crate) edge: HeapEdge,
    /// Incoming instead of outgoing references; children come from the
    /// retaining-edges provider and expansion walks the retainer chain.
    pub(crate) retaining: bool,
    pub(crate) snapshot: Arc<dyn SnapshotAccess>,
}

impl ObjectMeta {
    pub fn edge(&self) -> &HeapEdge {
        &self.edge
    }

    pub fn is_retaining(&self) -> bool {
        self.retaining
    }
}

impl fmt::Debug for ObjectMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectMeta")
            .field("edge", &self.edge)
            .field("retaining", &self.retaining)
            .finish_non_exhaustive()
    }
}

/// A live (or deleted, in diff views) instance row.
pub struct InstanceMeta {
    pub(crate) node: HeapNode,
    pub(crate) is_deleted_node: bool,
    /// The snapshot this instance lives in: the base snapshot for deleted
    /// rows, the current one otherwise.
    pub(crate) snapshot: Arc<dyn SnapshotAccess>,
}

impl InstanceMeta {
    pub fn node(&self) -> &HeapNode {
        &self.node
    }

    pub fn is_deleted_node(&self) -> bool {
        self.is_deleted_node
    }
}

impl fmt::Debug for InstanceMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceMeta")
            .field("node", &self.node)
            .field("is_deleted_node", &self.is_deleted_node)
            .finish_non_exhaustive()
    }
}

/// A class aggregate row; children are the instances of the class.
#[derive(Debug)]
pub struct ConstructorMeta {
    pub(crate) class_name: String,
    pub(crate) aggregate: Aggregate,
    pub(crate) filter: NodeFilter,
}

impl ConstructorMeta {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn aggregate(&self) -> &Aggregate {
        &self.aggregate
    }
}

/// A per-class diff row; children are added instances followed by removed
/// ones, served through the diff-merge provider.
#[derive(Debug)]
pub struct DiffMeta {
    pub(crate) class_name: String,
    pub(crate) diff: ClassDiff,
}

impl DiffMeta {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn diff(&self) -> &ClassDiff {
        &self.diff
    }
}

/// An allocation stack frame row.
#[derive(Debug)]
pub struct AllocationMeta {
    pub(crate) frame: AllocationFrame,
}

impl AllocationMeta {
    pub fn frame(&self) -> &AllocationFrame {
        &self.frame
    }
}

/// Variant tag of a grid node.
#[derive(Debug)]
pub enum NodeKind {
    /// The synthetic grid root; top-level rows are attached under it.
    Root,
    Object(ObjectMeta),
    Instance(InstanceMeta),
    Constructor(ConstructorMeta),
    Diff(DiffMeta),
    Allocation(AllocationMeta),
}

impl NodeKind {
    /// Primary display label of the row.
    pub fn label(&self) -> &str {
        match self {
            NodeKind::Root => "",
            NodeKind::Object(meta) => &meta.edge.node.name,
            NodeKind::Instance(meta) => &meta.node.name,
            NodeKind::Constructor(meta) => &meta.class_name,
            NodeKind::Diff(meta) => &meta.class_name,
            NodeKind::Allocation(meta) => &meta.frame.name,
        }
    }

    /// The heap graph node behind the row, for kinds that have one.
    pub fn heap_node(&self) -> Option<&HeapNode> {
        match self {
            NodeKind::Object(meta) => Some(&meta.edge.node),
            NodeKind::Instance(meta) => Some(&meta.node),
            _ => None,
        }
    }

    /// Kinds whose children come from a paginated provider (everything but
    /// the root and allocation frames, which have their own caller-chain
    /// population).
    pub(crate) fn supports_range_population(&self) -> bool {
        matches!(
            self,
            NodeKind::Object(_) | NodeKind::Instance(_) | NodeKind::Constructor(_)
                | NodeKind::Diff(_)
        )
    }

    /// Map the view's sort column to this kind's primary/secondary field
    /// pair. Sorting by name keeps the largest retainers first within a
    /// name group, so the secondary direction is fixed, not the view's.
    pub(crate) fn comparator(
        &self,
        column: SortColumn,
        ascending: bool,
    ) -> Option<ComparatorConfig> {
        use SortField as F;
        let cfg = ComparatorConfig::new;
        match self {
            NodeKind::Object(_) => Some(match column {
                SortColumn::Object => cfg(F::EdgeName, ascending, F::RetainedSize, false),
                SortColumn::Count => cfg(F::EdgeName, true, F::RetainedSize, false),
                SortColumn::ShallowSize => cfg(F::SelfSize, ascending, F::EdgeName, true),
                SortColumn::RetainedSize => cfg(F::RetainedSize, ascending, F::EdgeName, true),
                SortColumn::Distance => cfg(F::Distance, ascending, F::Name, true),
                _ => cfg(F::EdgeName, true, F::RetainedSize, false),
            }),
            NodeKind::Instance(_) => Some(match column {
                SortColumn::Object => cfg(F::EdgeName, ascending, F::RetainedSize, false),
                SortColumn::Distance => cfg(F::Distance, ascending, F::RetainedSize, false),
                SortColumn::Count => cfg(F::EdgeName, true, F::RetainedSize, false),
                SortColumn::AddedSize | SortColumn::RemovedSize | SortColumn::ShallowSize => {
                    cfg(F::SelfSize, ascending, F::EdgeName, true)
                }
                SortColumn::RetainedSize => cfg(F::RetainedSize, ascending, F::EdgeName, true),
                _ => cfg(F::EdgeName, true, F::RetainedSize, false),
            }),
            NodeKind::Constructor(_) => Some(match column {
                SortColumn::Object => cfg(F::Name, ascending, F::Id, true),
                SortColumn::Distance => cfg(F::Distance, ascending, F::RetainedSize, false),
                SortColumn::ShallowSize => cfg(F::SelfSize, ascending, F::Id, true),
                SortColumn::RetainedSize => cfg(F::RetainedSize, ascending, F::Id, true),
                _ => cfg(F::Name, true, F::Id, true),
            }),
            NodeKind::Diff(_) => Some(match column {
                SortColumn::Object => cfg(F::Name, ascending, F::Id, true),
                SortColumn::AddedCount | SortColumn::RemovedCount | SortColumn::CountDelta => {
                    cfg(F::Name, true, F::Id, true)
                }
                SortColumn::AddedSize | SortColumn::RemovedSize | SortColumn::SizeDelta => {
                    cfg(F::SelfSize, ascending, F::Id, true)
                }
                _ => cfg(F::Name, true, F::Id, true),
            }),
            NodeKind::Root | NodeKind::Allocation(_) => None,
        }
    }

    /// Stable identity of a fetched item, as seen by this (parent) kind.
    pub(crate) fn identity_for_item(&self, item: &ProviderItem) -> Option<ChildIdentity> {
        match self {
            NodeKind::Object(_) | NodeKind::Instance(_) => {
                item.as_edge().map(|edge| ChildIdentity::Edge(edge.edge_index))
            }
            NodeKind::Constructor(_) | NodeKind::Diff(_) => {
                item.as_node().map(|node| ChildIdentity::Object(node.id))
            }
            NodeKind::Root | NodeKind::Allocation(_) => None,
        }
    }

    /// Stable identity of a node of this kind when it is matched as a
    /// previously expanded child.
    pub(crate) fn identity_as_child(&self) -> Option<ChildIdentity> {
        match self {
            NodeKind::Object(meta) => Some(ChildIdentity::Edge(meta.edge.edge_index)),
            NodeKind::Instance(meta) => Some(ChildIdentity::Object(meta.node.id)),
            _ => None,
        }
    }
}

/// A node of the grid tree.
///
/// Fields are engine-managed; embedders read the node through the getter
/// surface.
pub struct GridNode {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<ChildEntry>,
    pub(crate) has_children: bool,
    pub(crate) expanded: bool,
    pub(crate) populated: bool,
    pub(crate) cycled_with_ancestor: bool,
    pub(crate) instance_count: u64,
    pub(crate) retrieved_ranges: RangeList,
    pub(crate) saved_children: Option<HashMap<ChildIdentity, NodeId>>,
    pub(crate) provider: Option<Box<dyn ChildrenProvider>>,
    pub(crate) columns: BTreeMap<ColumnId, String>,
}

impl GridNode {
    fn new(
        kind: NodeKind,
        parent: Option<NodeId>,
        has_children: bool,
        columns: BTreeMap<ColumnId, String>,
    ) -> Self {
        Self {
            kind,
            parent,
            children: Vec::new(),
            has_children,
            expanded: false,
            populated: false,
            cycled_with_ancestor: false,
            instance_count: 0,
            retrieved_ranges: RangeList::new(),
            saved_children: None,
            provider: None,
            columns,
        }
    }

    pub(crate) fn new_root() -> Self {
        Self::new(NodeKind::Root, None, true, BTreeMap::new())
    }

    pub(crate) fn new_object(
        edge: HeapEdge,
        retaining: bool,
        snapshot: Arc<dyn SnapshotAccess>,
        total_size: u64,
        parent: Option<NodeId>,
        cycled_with_ancestor: bool,
    ) -> Self {
        let columns = generic_object_columns(&edge.node, total_size);
        let meta = ObjectMeta {
            edge,
            retaining,
            snapshot,
        };
        let mut node = Self::new(NodeKind::Object(meta), parent, false, columns);
        node.cycled_with_ancestor = cycled_with_ancestor;
        node
    }

    pub(crate) fn new_instance(
        node: HeapNode,
        is_deleted_node: bool,
        snapshot: Arc<dyn SnapshotAccess>,
        total_size: u64,
        parent: Option<NodeId>,
    ) -> Self {
        let mut columns = generic_object_columns(&node, total_size);
        let size = with_thousands_separator(node.self_size);
        if is_deleted_node {
            columns.insert(ColumnId::RemovedCount, "\u{2022}".to_string());
            columns.insert(ColumnId::RemovedSize, size);
        } else {
            columns.insert(ColumnId::AddedCount, "\u{2022}".to_string());
            columns.insert(ColumnId::AddedSize, size);
        }
        let meta = InstanceMeta {
            node,
            is_deleted_node,
            snapshot,
        };
        Self::new(NodeKind::Instance(meta), parent, false, columns)
    }

    pub(crate) fn new_constructor(
        class_name: String,
        aggregate: Aggregate,
        filter: NodeFilter,
        total_size: u64,
        parent: Option<NodeId>,
    ) -> Self {
        let mut columns = BTreeMap::new();
        columns.insert(ColumnId::Object, class_name.clone());
        columns.insert(ColumnId::Count, with_thousands_separator(aggregate.count));
        columns.insert(ColumnId::Distance, to_ui_distance(aggregate.distance));
        columns.insert(
            ColumnId::ShallowSize,
            with_thousands_separator(aggregate.self_size),
        );
        columns.insert(
            ColumnId::RetainedSize,
            with_thousands_separator(aggregate.max_retained_size),
        );
        if total_size > 0 {
            columns.insert(
                ColumnId::ShallowSizePercent,
                to_percent_string(aggregate.self_size as f64 / total_size as f64 * 100.0),
            );
            columns.insert(
                ColumnId::RetainedSizePercent,
                to_percent_string(aggregate.max_retained_size as f64 / total_size as f64 * 100.0),
            );
        }
        let has_children = aggregate.count > 0;
        let meta = ConstructorMeta {
            class_name,
            aggregate,
            filter,
        };
        Self::new(NodeKind::Constructor(meta), parent, has_children, columns)
    }

    pub(crate) fn new_diff(class_name: String, diff: ClassDiff, parent: Option<NodeId>) -> Self {
        let mut columns = BTreeMap::new();
        columns.insert(ColumnId::Object, class_name.clone());
        columns.insert(ColumnId::AddedCount, with_thousands_separator(diff.added_count));
        columns.insert(
            ColumnId::RemovedCount,
            with_thousands_separator(diff.removed_count),
        );
        columns.insert(ColumnId::CountDelta, signed_with_separator(diff.count_delta));
        columns.insert(ColumnId::AddedSize, with_thousands_separator(diff.added_size));
        columns.insert(
            ColumnId::RemovedSize,
            with_thousands_separator(diff.removed_size),
        );
        columns.insert(ColumnId::SizeDelta, signed_with_separator(diff.size_delta));
        let meta = DiffMeta { class_name, diff };
        Self::new(NodeKind::Diff(meta), parent, true, columns)
    }

    pub(crate) fn new_allocation(frame: AllocationFrame, parent: Option<NodeId>) -> Self {
        let mut columns = BTreeMap::new();
        columns.insert(ColumnId::Name, frame.name.clone());
        columns.insert(ColumnId::LiveCount, with_thousands_separator(frame.live_count));
        columns.insert(ColumnId::Count, with_thousands_separator(frame.count));
        columns.insert(ColumnId::LiveSize, with_thousands_separator(frame.live_size));
        columns.insert(ColumnId::Size, with_thousands_separator(frame.size));
        let has_children = frame.has_children;
        let meta = AllocationMeta { frame };
        Self::new(NodeKind::Allocation(meta), parent, has_children, columns)
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[ChildEntry] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        self.has_children
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn is_cycled_with_ancestor(&self) -> bool {
        self.cycled_with_ancestor
    }

    pub fn instance_count(&self) -> u64 {
        self.instance_count
    }

    pub fn retrieved_ranges(&self) -> &RangeList {
        &self.retrieved_ranges
    }

    pub fn columns(&self) -> &BTreeMap<ColumnId, String> {
        &self.columns
    }

    pub fn column(&self, id: ColumnId) -> Option<&str> {
        self.columns.get(&id).map(String::as_str)
    }

    pub(crate) fn distance(&self) -> Option<i32> {
        self.kind.heap_node().map(|node| node.distance)
    }
}

fn generic_object_columns(node: &HeapNode, total_size: u64) -> BTreeMap<ColumnId, String> {
    let mut columns = BTreeMap::new();
    columns.insert(ColumnId::Distance, to_ui_distance(node.distance));
    columns.insert(ColumnId::ShallowSize, with_thousands_separator(node.self_size));
    columns.insert(
        ColumnId::RetainedSize,
        with_thousands_separator(node.retained_size),
    );
    if total_size > 0 {
        columns.insert(
            ColumnId::ShallowSizePercent,
            to_percent_string(node.self_size as f64 / total_size as f64 * 100.0),
        );
        columns.insert(
            ColumnId::RetainedSizePercent,
            to_percent_string(node.retained_size as f64 / total_size as f64 * 100.0),
        );
    }
    columns
}
