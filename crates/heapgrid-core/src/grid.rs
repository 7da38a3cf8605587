//! The grid: an arena of nodes plus the population and sort engine.
//!
//! All tree mutation funnels through [`HeapGrid`] methods that take
//! `&mut self` and hold it across their awaits, so population and sort on
//! a node are serialized by construction. Each node owns its provider
//! exclusively; sibling subtrees never share state, and the engine swaps a
//! provider out of its node for the duration of a request and puts it back
//! after the await.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, trace};

use heapgrid_model::{
    Aggregate, AllocationFrame, ClassDiff, ComparatorConfig, HeapEdge, HeapNode, ItemsRange,
    NodeFilter, ProviderItem, SnapshotObjectId, SortColumn,
};

use crate::config::GridConfig;
use crate::diff::DiffMergeProvider;
use crate::error::{GridError, Result};
use crate::node::{ChildEntry, GridNode, NodeId, NodeKind};
use crate::provider::{ChildrenProvider, SnapshotAccess};
use crate::ranges::IndexRange;

/// Notifications for the embedding view, drained with
/// [`HeapGrid::take_events`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridEvent {
    /// Every chunk of a population call has been fetched and merged.
    PopulateComplete(NodeId),
    /// The set or order of visible rows changed; the view should refresh.
    VisibleNodesChanged,
    /// Retainer auto-expansion reached its stopping point.
    ExpandRetainersComplete,
    /// A recursive sort finished at every level.
    SortingComplete,
}

/// A tree of heap snapshot rows over paginated providers.
pub struct HeapGrid {
    pub(crate) nodes: Vec<Option<GridNode>>,
    pub(crate) free_indices: Vec<usize>,
    pub(crate) root: NodeId,
    pub(crate) snapshot: Arc<dyn SnapshotAccess>,
    pub(crate) base_snapshot: Option<Arc<dyn SnapshotAccess>>,
    pub(crate) config: GridConfig,
    pub(crate) sort_column: SortColumn,
    pub(crate) sort_ascending: bool,
    pub(crate) name_filter: Option<String>,
    pub(crate) events: VecDeque<GridEvent>,
    pub(crate) recursive_sorting_depth: u32,
}

impl HeapGrid {
    /// A grid over one snapshot (summary, containment, retainers,
    /// allocation views).
    pub fn new(snapshot: Arc<dyn SnapshotAccess>, config: GridConfig) -> Self {
        Self {
            nodes: vec![Some(GridNode::new_root())],
            free_indices: Vec::new(),
            root: NodeId(0),
            snapshot,
            base_snapshot: None,
            config,
            sort_column: SortColumn::RetainedSize,
            sort_ascending: false,
            name_filter: None,
            events: VecDeque::new(),
            recursive_sorting_depth: 0,
        }
    }

    /// A grid diffing `snapshot` against `base_snapshot` (comparison view).
    pub fn with_base_snapshot(
        snapshot: Arc<dyn SnapshotAccess>,
        base_snapshot: Arc<dyn SnapshotAccess>,
        config: GridConfig,
    ) -> Self {
        let mut grid = Self::new(snapshot, config);
        grid.base_snapshot = Some(base_snapshot);
        grid
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.get(id.0).is_some_and(Option::is_some)
    }

    /// Read access to a node. Fails for ids of disposed nodes.
    pub fn node(&self, id: NodeId) -> Result<&GridNode> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(GridError::InvalidNode)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut GridNode> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(GridError::InvalidNode)
    }

    pub fn children(&self, id: NodeId) -> Result<&[ChildEntry]> {
        Ok(self.node(id)?.children())
    }

    pub fn take_events(&mut self) -> Vec<GridEvent> {
        self.events.drain(..).collect()
    }

    pub(crate) fn push_event(&mut self, event: GridEvent) {
        self.events.push_back(event);
    }

    /// Change the sort column. Takes effect on the next `sort()` or
    /// `populate()` call; already materialized children keep their order.
    pub fn set_sort_order(&mut self, column: SortColumn, ascending: bool) {
        self.sort_column = column;
        self.sort_ascending = ascending;
    }

    pub fn sort_order(&self) -> (SortColumn, bool) {
        (self.sort_column, self.sort_ascending)
    }

    /// Lowercased substring filter applied to constructor and diff rows.
    pub fn set_name_filter(&mut self, filter: impl Into<String>) {
        self.name_filter = Some(filter.into().to_lowercase());
    }

    pub fn reset_name_filter(&mut self) {
        self.name_filter = None;
    }

    /// Whether the row is hidden by the current name filter. Only class
    /// rows participate in name filtering.
    pub fn filtered_out(&self, id: NodeId) -> Result<bool> {
        let Some(filter) = &self.name_filter else {
            return Ok(false);
        };
        let node = self.node(id)?;
        Ok(match node.kind() {
            NodeKind::Constructor(_) | NodeKind::Diff(_) => {
                !node.kind().label().to_lowercase().contains(filter)
            }
            _ => false,
        })
    }

    // ---------------------------------------------------------------------
    // Top-level row attachment
    // ---------------------------------------------------------------------

    /// Attach a class aggregate row under the root.
    pub fn attach_constructor(
        &mut self,
        class_name: impl Into<String>,
        aggregate: Aggregate,
        filter: NodeFilter,
    ) -> Result<NodeId> {
        let total_size = self.snapshot.total_size();
        let node = GridNode::new_constructor(
            class_name.into(),
            aggregate,
            filter,
            total_size,
            Some(self.root),
        );
        self.attach_to_root(node)
    }

    /// Attach a per-class diff row under the root.
    pub fn attach_diff_class(
        &mut self,
        class_name: impl Into<String>,
        diff: ClassDiff,
    ) -> Result<NodeId> {
        let node = GridNode::new_diff(class_name.into(), diff, Some(self.root));
        self.attach_to_root(node)
    }

    /// Attach a reference row under the root. With `retaining` set the row
    /// serves the retainers view: children are retaining edges and
    /// expansion walks the retainer chain.
    pub async fn attach_object(&mut self, edge: HeapEdge, retaining: bool) -> Result<NodeId> {
        let total_size = self.snapshot.total_size();
        let node = GridNode::new_object(
            edge,
            retaining,
            Arc::clone(&self.snapshot),
            total_size,
            Some(self.root),
            false,
        );
        let id = self.attach_to_root(node)?;
        self.update_has_children(id).await?;
        Ok(id)
    }

    /// Attach an instance row under the root. Deleted instances resolve
    /// against the base snapshot when one is configured.
    pub async fn attach_instance(
        &mut self,
        node: HeapNode,
        is_deleted_node: bool,
    ) -> Result<NodeId> {
        let snapshot = if is_deleted_node {
            self.base_snapshot
                .clone()
                .unwrap_or_else(|| Arc::clone(&self.snapshot))
        } else {
            Arc::clone(&self.snapshot)
        };
        let total_size = self.snapshot.total_size();
        let grid_node =
            GridNode::new_instance(node, is_deleted_node, snapshot, total_size, Some(self.root));
        let id = self.attach_to_root(grid_node)?;
        self.update_has_children(id).await?;
        Ok(id)
    }

    /// Attach an allocation stack frame row under the root.
    pub fn attach_allocation(&mut self, frame: AllocationFrame) -> Result<NodeId> {
        let node = GridNode::new_allocation(frame, Some(self.root));
        self.attach_to_root(node)
    }

    fn attach_to_root(&mut self, node: GridNode) -> Result<NodeId> {
        let id = self.alloc(node);
        let root = self.root;
        self.node_mut(root)?.children.push(ChildEntry::Node(id));
        Ok(id)
    }

    pub(crate) fn alloc(&mut self, node: GridNode) -> NodeId {
        match self.free_indices.pop() {
            Some(index) => {
                self.nodes[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    // ---------------------------------------------------------------------
    // Providers
    // ---------------------------------------------------------------------

    fn create_provider_for(&self, id: NodeId) -> Result<Box<dyn ChildrenProvider>> {
        let node = self.node(id)?;
        match &node.kind {
            NodeKind::Object(meta) => Ok(if meta.retaining {
                meta.snapshot
                    .create_retaining_edges_provider(meta.edge.node.node_index)
            } else {
                meta.snapshot.create_edges_provider(meta.edge.node.node_index)
            }),
            NodeKind::Instance(meta) => {
                Ok(meta.snapshot.create_edges_provider(meta.node.node_index))
            }
            NodeKind::Constructor(meta) => Ok(self
                .snapshot
                .create_nodes_provider_for_class(&meta.class_name, meta.filter.clone())),
            NodeKind::Diff(meta) => {
                let base = self
                    .base_snapshot
                    .as_ref()
                    .ok_or(GridError::InvariantViolation {
                        reason: "diff rows require a base snapshot",
                    })?;
                let added = self
                    .snapshot
                    .create_added_nodes_provider(base.uid(), &meta.class_name);
                let removed = base.create_deleted_nodes_provider(&meta.diff.deleted_indexes);
                Ok(Box::new(DiffMergeProvider::new(
                    added,
                    removed,
                    meta.diff.added_count,
                    meta.diff.removed_count,
                )))
            }
            NodeKind::Root | NodeKind::Allocation(_) => Err(GridError::UnsupportedNodeKind),
        }
    }

    fn ensure_provider(&mut self, id: NodeId) -> Result<()> {
        if self.node(id)?.provider.is_none() {
            let provider = self.create_provider_for(id)?;
            self.node_mut(id)?.provider = Some(provider);
        }
        Ok(())
    }

    pub(crate) fn take_provider(&mut self, id: NodeId) -> Result<Box<dyn ChildrenProvider>> {
        self.node_mut(id)?
            .provider
            .take()
            .ok_or_else(|| GridError::invariant("provider missing while a request was in flight"))
    }

    pub(crate) fn restore_provider(&mut self, id: NodeId, provider: Box<dyn ChildrenProvider>) {
        match self.nodes.get_mut(id.0).and_then(Option::as_mut) {
            Some(node) => node.provider = Some(provider),
            None => {
                // The node was disposed while the request was in flight;
                // the response has no target anymore.
                let mut provider = provider;
                provider.dispose();
            }
        }
    }

    fn comparator_for(&self, id: NodeId) -> Result<ComparatorConfig> {
        self.node(id)?
            .kind
            .comparator(self.sort_column, self.sort_ascending)
            .ok_or(GridError::UnsupportedNodeKind)
    }

    async fn sort_and_rewind_provider(
        &mut self,
        id: NodeId,
        comparator: ComparatorConfig,
    ) -> Result<()> {
        self.ensure_provider(id)?;
        let mut provider = self.take_provider(id)?;
        let result = provider.sort_and_rewind(comparator).await;
        self.restore_provider(id, provider);
        result.map_err(GridError::provider)
    }

    /// Resolve `has_children` for a freshly created reference or instance
    /// row by probing the provider for emptiness. An empty probe result
    /// disposes the probe provider again: childless nodes hold no provider.
    pub(crate) async fn update_has_children(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        let probes = matches!(node.kind, NodeKind::Object(_) | NodeKind::Instance(_))
            && !node.cycled_with_ancestor;
        if !probes {
            return Ok(());
        }
        self.ensure_provider(id)?;
        let mut provider = self.take_provider(id)?;
        match provider.is_empty().await {
            Ok(true) => {
                provider.dispose();
                self.node_mut(id)?.has_children = false;
            }
            Ok(false) => {
                self.restore_provider(id, provider);
                self.node_mut(id)?.has_children = true;
            }
            Err(source) => {
                self.restore_provider(id, provider);
                return Err(GridError::provider(source));
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Population
    // ---------------------------------------------------------------------

    /// First-time population: rewind the provider under the current
    /// comparator and fetch the default leading span. A no-op once the
    /// node is populated, childless, or cycled with an ancestor.
    pub async fn populate(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        if node.populated {
            return Ok(());
        }
        if matches!(node.kind, NodeKind::Allocation(_)) {
            return self.populate_allocation_node(id).await;
        }
        if !node.kind.supports_range_population() {
            return Err(GridError::UnsupportedNodeKind);
        }
        if !node.has_children || node.cycled_with_ancestor {
            return Ok(());
        }
        self.node_mut(id)?.populated = true;
        let comparator = self.comparator_for(id)?;
        self.sort_and_rewind_provider(id, comparator).await?;
        self.populate_children(id, None, None).await
    }

    /// Ensure the inclusive request span is materialized: fetch it in
    /// provider-order chunks and merge each into the range list. Chunk
    /// *n + 1* is not requested before chunk *n* has been merged.
    pub async fn populate_children(
        &mut self,
        id: NodeId,
        from_position: Option<u64>,
        to_position: Option<u64>,
    ) -> Result<()> {
        if !self.node(id)?.kind.supports_range_population() {
            return Err(GridError::UnsupportedNodeKind);
        }
        let from = from_position.unwrap_or(0);
        let to = to_position.unwrap_or(from + self.config.default_populate_count);
        debug!(node = id.0, from, to, "populating children");

        let mut first_not_serialized = from;
        let mut created = Vec::new();
        while first_not_serialized < to {
            let end = (first_not_serialized + self.config.default_populate_count).min(to);
            self.ensure_provider(id)?;
            let mut provider = self.take_provider(id)?;
            let fetched = provider.serialize_items_range(first_not_serialized, end).await;
            self.restore_provider(id, provider);
            let items_range = fetched.map_err(GridError::provider)?;
            first_not_serialized = end;
            created.extend(self.children_retrieved(id, items_range)?);
        }
        for child in created {
            self.update_has_children(child).await?;
        }
        if self.node(id)?.expanded {
            self.push_event(GridEvent::VisibleNodesChanged);
        }
        self.push_event(GridEvent::PopulateComplete(id));
        Ok(())
    }

    fn children_retrieved(&mut self, id: NodeId, items_range: ItemsRange) -> Result<Vec<NodeId>> {
        let Some(mut node) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            return Err(GridError::InvalidNode);
        };
        let result = self.merge_items_range(&mut node, id, items_range);
        self.nodes[id.0] = Some(node);
        result
    }

    /// Merge one fetched slice into the node's ranges and child list.
    ///
    /// This is the crux of correctness: the physical insertion index is
    /// derived by walking the ordered ranges, counting covered positions
    /// plus one placeholder per gap, and must stay exact while ranges are
    /// stretched, bracketed by fresh placeholders, or merged with their
    /// successor.
    fn merge_items_range(
        &mut self,
        node: &mut GridNode,
        id: NodeId,
        items_range: ItemsRange,
    ) -> Result<Vec<NodeId>> {
        let ItemsRange {
            start_position,
            end_position,
            total_length,
            items,
        } = items_range;
        trace!(
            node = id.0,
            start_position,
            end_position,
            total_length,
            fetched = items.len(),
            "merging fetched slice"
        );
        let items_len = items.len() as u64;
        let mut created = Vec::new();
        let mut item_index = 0usize;
        let mut item_position = start_position;
        let mut insertion_index = 0usize;

        if node.retrieved_ranges.is_empty() {
            if start_position > 0 {
                node.retrieved_ranges.push(IndexRange::new(0, 0));
                node.children.insert(
                    insertion_index,
                    ChildEntry::More {
                        from: 0,
                        to: start_position,
                    },
                );
                insertion_index += 1;
            }
            node.retrieved_ranges
                .push(IndexRange::new(start_position, end_position));
            for item in items {
                self.insert_retrieved_child(node, id, item, insertion_index, &mut created)?;
                insertion_index += 1;
            }
            if end_position < total_length {
                node.children.insert(
                    insertion_index,
                    ChildEntry::More {
                        from: end_position,
                        to: total_length,
                    },
                );
            }
        } else {
            // Locate the first range whose right bound can absorb the new
            // items, accumulating the physical index on the way.
            let mut range_index = 0usize;
            let mut found = false;
            while let Some(range) = node.retrieved_ranges.get(range_index) {
                if range.to >= item_position {
                    found = true;
                    break;
                }
                insertion_index += range.len() as usize;
                if range.to < total_length {
                    // Skip the placeholder that follows the range.
                    insertion_index += 1;
                }
                range_index += 1;
            }

            let starts_before_range = node
                .retrieved_ranges
                .get(range_index)
                .is_some_and(|range| start_position < range.from);
            if !found || starts_before_range {
                // A disjoint range opens inside a gap: narrow the preceding
                // placeholder and bracket the new range with a fresh one.
                if insertion_index == 0 {
                    return Err(GridError::invariant(
                        "disjoint range without a preceding placeholder",
                    ));
                }
                let gap_end = if found {
                    node.retrieved_ranges
                        .get(range_index)
                        .map_or(total_length, |range| range.from)
                } else {
                    total_length
                };
                set_placeholder_end(node, insertion_index - 1, start_position)?;
                node.children.insert(
                    insertion_index,
                    ChildEntry::More {
                        from: start_position,
                        to: gap_end,
                    },
                );
                if !found {
                    range_index = node.retrieved_ranges.len();
                }
                node.retrieved_ranges
                    .insert(range_index, IndexRange::new(start_position, start_position));
            } else {
                let range_from = node
                    .retrieved_ranges
                    .get(range_index)
                    .map_or(item_position, |range| range.from);
                insertion_index += (item_position - range_from) as usize;
            }
            // From here `range.from <= item_position <= range.to` holds and
            // `insertion_index` sits right before the following placeholder.

            // Stretch the range right, consuming items and swallowing
            // placeholders until the fetched slice is covered.
            loop {
                let Some(range) = node.retrieved_ranges.get(range_index) else {
                    break;
                };
                if range.to >= end_position {
                    break;
                }
                let skip = (range.to - item_position) as usize;
                insertion_index += skip;
                item_index += skip;
                item_position = range.to;

                let next_range = node.retrieved_ranges.get(range_index + 1);
                let mut new_end_of_range = next_range.map_or(total_length, |range| range.from);
                if new_end_of_range > end_position {
                    new_end_of_range = end_position;
                }
                while item_position < new_end_of_range {
                    let item = items.get(item_index).cloned().ok_or_else(|| {
                        GridError::invariant("provider returned fewer items than its range covers")
                    })?;
                    self.insert_retrieved_child(node, id, item, insertion_index, &mut created)?;
                    item_index += 1;
                    insertion_index += 1;
                    item_position += 1;
                }

                match next_range.filter(|range| new_end_of_range == range.from) {
                    Some(next) => {
                        // The stretched range touches its successor: splice
                        // the two and drop the placeholder between them.
                        node.retrieved_ranges.set_to(range_index, next.to);
                        remove_placeholder(node, insertion_index)?;
                        node.retrieved_ranges.remove(range_index + 1);
                    }
                    None => {
                        node.retrieved_ranges.set_to(range_index, new_end_of_range);
                        if new_end_of_range == total_length {
                            remove_placeholder(node, insertion_index)?;
                        } else {
                            set_placeholder_start(node, insertion_index, end_position)?;
                        }
                    }
                }
            }
        }

        // TODO: dedupe re-fetched items so instance_count matches the
        // materialized child count.
        node.instance_count += items_len;
        Ok(created)
    }

    fn insert_retrieved_child(
        &mut self,
        node: &mut GridNode,
        parent_id: NodeId,
        item: ProviderItem,
        insertion_index: usize,
        created: &mut Vec<NodeId>,
    ) -> Result<()> {
        let identity = node.kind.identity_for_item(&item);
        if let (Some(identity), Some(saved)) = (identity, node.saved_children.as_mut()) {
            if let Some(existing) = saved.remove(&identity) {
                node.children
                    .insert(insertion_index, ChildEntry::Node(existing));
                return Ok(());
            }
        }
        let child = self.create_child_for(parent_id, node, item)?;
        node.children.insert(insertion_index, ChildEntry::Node(child));
        created.push(child);
        Ok(())
    }

    fn create_child_for(
        &mut self,
        parent_id: NodeId,
        parent: &GridNode,
        item: ProviderItem,
    ) -> Result<NodeId> {
        let total_size = self.snapshot.total_size();
        let child = match &parent.kind {
            NodeKind::Object(meta) => {
                let ProviderItem::Edge(edge) = item else {
                    return Err(GridError::invariant("reference rows expect edge items"));
                };
                let cycled =
                    self.is_cycled_with_ancestor(edge.node.id, &parent.kind, parent.parent);
                GridNode::new_object(
                    edge,
                    meta.retaining,
                    Arc::clone(&meta.snapshot),
                    total_size,
                    Some(parent_id),
                    cycled,
                )
            }
            NodeKind::Instance(meta) => {
                let ProviderItem::Edge(edge) = item else {
                    return Err(GridError::invariant("instance rows expect edge items"));
                };
                // The ancestor chain restarts below an instance row.
                GridNode::new_object(
                    edge,
                    false,
                    Arc::clone(&meta.snapshot),
                    total_size,
                    Some(parent_id),
                    false,
                )
            }
            NodeKind::Constructor(_) => {
                let node = match item {
                    ProviderItem::Node(node) => node,
                    ProviderItem::Diff(entry) => entry.node,
                    ProviderItem::Edge(_) => {
                        return Err(GridError::invariant("class rows expect node items"));
                    }
                };
                GridNode::new_instance(
                    node,
                    false,
                    Arc::clone(&self.snapshot),
                    total_size,
                    Some(parent_id),
                )
            }
            NodeKind::Diff(_) => {
                let ProviderItem::Diff(entry) = item else {
                    return Err(GridError::invariant("diff rows expect tagged node items"));
                };
                let (snapshot, is_deleted) = if entry.is_added_not_removed {
                    (Arc::clone(&self.snapshot), false)
                } else {
                    let base = self.base_snapshot.as_ref().ok_or(
                        GridError::InvariantViolation {
                            reason: "diff rows require a base snapshot",
                        },
                    )?;
                    (Arc::clone(base), true)
                };
                GridNode::new_instance(entry.node, is_deleted, snapshot, total_size, Some(parent_id))
            }
            NodeKind::Root | NodeKind::Allocation(_) => {
                return Err(GridError::UnsupportedNodeKind);
            }
        };
        Ok(self.alloc(child))
    }

    /// Walk strict ancestors along the unbroken chain of reference rows;
    /// true when one of them is the same heap object.
    fn is_cycled_with_ancestor(
        &self,
        child_id: SnapshotObjectId,
        parent_kind: &NodeKind,
        grandparent: Option<NodeId>,
    ) -> bool {
        let NodeKind::Object(parent_meta) = parent_kind else {
            return false;
        };
        if parent_meta.edge.node.id == child_id {
            return true;
        }
        let mut current = grandparent;
        while let Some(ancestor_id) = current {
            let Ok(ancestor) = self.node(ancestor_id) else {
                break;
            };
            match &ancestor.kind {
                NodeKind::Object(meta) => {
                    if meta.edge.node.id == child_id {
                        return true;
                    }
                    current = ancestor.parent;
                }
                _ => break,
            }
        }
        false
    }

    // ---------------------------------------------------------------------
    // Placeholders and lookup
    // ---------------------------------------------------------------------

    /// The `[from, to)` interval of the placeholder at `child_index`, if
    /// that entry is one.
    pub fn placeholder_bounds(&self, id: NodeId, child_index: usize) -> Result<Option<(u64, u64)>> {
        Ok(match self.node(id)?.children.get(child_index) {
            Some(ChildEntry::More { from, to }) => Some((*from, *to)),
            _ => None,
        })
    }

    /// "Show all": materialize the placeholder's whole interval.
    pub async fn populate_placeholder(&mut self, id: NodeId, child_index: usize) -> Result<()> {
        match self.placeholder_bounds(id, child_index)? {
            Some((from, to)) => self.populate_children(id, Some(from), Some(to)).await,
            None => Err(GridError::InvariantViolation {
                reason: "child index does not refer to a placeholder",
            }),
        }
    }

    /// "Show more": materialize the next default chunk of the placeholder.
    pub async fn populate_placeholder_chunk(
        &mut self,
        id: NodeId,
        child_index: usize,
    ) -> Result<()> {
        match self.placeholder_bounds(id, child_index)? {
            Some((from, to)) => {
                let end = (from + self.config.default_populate_count).min(to);
                self.populate_children(id, Some(from), Some(end)).await
            }
            None => Err(GridError::InvariantViolation {
                reason: "child index does not refer to a placeholder",
            }),
        }
    }

    /// The materialized child at a virtual position, or `None` inside a
    /// placeholder gap.
    pub fn child_for_position(&self, id: NodeId, position: u64) -> Option<NodeId> {
        let node = self.node(id).ok()?;
        let physical = node.retrieved_ranges.physical_index_of(position)?;
        node.children.get(physical).and_then(ChildEntry::node_id)
    }

    // ---------------------------------------------------------------------
    // Expansion
    // ---------------------------------------------------------------------

    /// Expand a row, populating it first when needed. Retaining rows
    /// cascade down the retainer chain; allocation rows auto-expand while
    /// the caller chain is unambiguous.
    pub async fn expand(&mut self, id: NodeId) -> Result<()> {
        enum Flavor {
            Retaining,
            Allocation,
            Plain,
        }
        let flavor = match &self.node(id)?.kind {
            NodeKind::Object(meta) if meta.retaining => Flavor::Retaining,
            NodeKind::Allocation(_) => Flavor::Allocation,
            NodeKind::Root => return Err(GridError::UnsupportedNodeKind),
            _ => Flavor::Plain,
        };
        match flavor {
            Flavor::Retaining => self.expand_retainer_chain(id).await,
            Flavor::Allocation => {
                self.populate(id).await?;
                self.mark_expanded(id)?;
                let mut current = id;
                loop {
                    let only_child = {
                        let children = self.node(current)?.children();
                        if children.len() == 1 {
                            children[0].node_id()
                        } else {
                            None
                        }
                    };
                    let Some(child) = only_child else {
                        break;
                    };
                    self.populate(child).await?;
                    self.mark_expanded(child)?;
                    current = child;
                }
                Ok(())
            }
            Flavor::Plain => {
                if !self.node(id)?.populated {
                    self.populate(id).await?;
                }
                self.mark_expanded(id)
            }
        }
    }

    pub(crate) fn mark_expanded(&mut self, id: NodeId) -> Result<()> {
        self.node_mut(id)?.expanded = true;
        self.push_event(GridEvent::VisibleNodesChanged);
        Ok(())
    }

    pub fn collapse(&mut self, id: NodeId) -> Result<()> {
        self.node_mut(id)?.expanded = false;
        self.push_event(GridEvent::VisibleNodesChanged);
        Ok(())
    }

    /// Mark populated and expand without fetching anything; rewinds the
    /// provider so a subsequent explicit population starts clean.
    pub async fn expand_without_populate(&mut self, id: NodeId) -> Result<()> {
        self.node_mut(id)?.populated = true;
        self.mark_expanded(id)?;
        let comparator = self.comparator_for(id)?;
        self.sort_and_rewind_provider(id, comparator).await
    }

    // ---------------------------------------------------------------------
    // Reveal by object id
    // ---------------------------------------------------------------------

    /// Materialize and return the instance row for `object_id` under a
    /// class row, expanding the covering range on demand. Name filters are
    /// reset: reveal must work for filtered-out rows too. Returns the path
    /// `[class row, instance row]`, or empty when the id is not in the
    /// class.
    pub async fn reveal_by_id(
        &mut self,
        id: NodeId,
        object_id: SnapshotObjectId,
    ) -> Result<Vec<NodeId>> {
        if !matches!(self.node(id)?.kind, NodeKind::Constructor(_)) {
            return Err(GridError::UnsupportedNodeKind);
        }
        self.reset_name_filter();
        self.expand_without_populate(id).await?;

        self.ensure_provider(id)?;
        let mut provider = self.take_provider(id)?;
        let position = provider.node_position(object_id).await;
        self.restore_provider(id, provider);
        let Some(position) = position.map_err(GridError::provider)? else {
            self.collapse(id)?;
            return Ok(Vec::new());
        };

        self.populate_children(id, Some(position), None).await?;
        Ok(match self.child_for_position(id, position) {
            Some(child) => vec![id, child],
            None => Vec::new(),
        })
    }

    // ---------------------------------------------------------------------
    // Sorting
    // ---------------------------------------------------------------------

    /// Re-derive children order under the current comparator without
    /// discarding expanded subtrees, then recursively re-sort every
    /// still-expanded child. Emits `SortingComplete` when the outermost
    /// sort finishes.
    pub fn sort(&mut self, id: NodeId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.recursive_sorting_depth += 1;
            let result = self.sort_inner(id).await;
            self.recursive_sorting_depth -= 1;
            if self.recursive_sorting_depth == 0 {
                self.push_event(GridEvent::SortingComplete);
            }
            result
        })
    }

    async fn sort_inner(&mut self, id: NodeId) -> Result<()> {
        if !self.node(id)?.kind.supports_range_population() {
            return Err(GridError::UnsupportedNodeKind);
        }
        if !self.node(id)?.has_children {
            return Ok(());
        }
        debug!(node = id.0, "re-sorting children");
        let comparator = self.comparator_for(id)?;
        self.sort_and_rewind_provider(id, comparator).await?;

        self.save_children(id)?;
        self.detach_children_for_resort(id)?;
        let instance_count = {
            let node = self.node_mut(id)?;
            node.retrieved_ranges.clear();
            std::mem::replace(&mut node.instance_count, 0)
        };
        self.populate_children(id, Some(0), Some(instance_count)).await?;

        let children: Vec<NodeId> = self
            .node(id)?
            .children
            .iter()
            .filter_map(|entry| entry.node_id())
            .collect();
        for child in children {
            if self.contains(child) && self.node(child)?.expanded {
                self.sort(child).await?;
            }
        }
        Ok(())
    }

    /// Harvest currently expanded children into the saved-children map so
    /// repopulation can reuse them in place. Leftovers of the previous
    /// harvest that were never reclaimed are disposed here.
    fn save_children(&mut self, id: NodeId) -> Result<()> {
        let leftovers: Vec<NodeId> = self
            .node_mut(id)?
            .saved_children
            .take()
            .map(|map| map.into_values().collect())
            .unwrap_or_default();
        for stale in leftovers {
            self.dispose_subtree(stale);
        }

        let children: Vec<NodeId> = self
            .node(id)?
            .children
            .iter()
            .filter_map(|entry| entry.node_id())
            .collect();
        let mut saved = HashMap::new();
        for child_id in children {
            let child = self.node(child_id)?;
            if !child.expanded {
                continue;
            }
            if let Some(identity) = child.kind.identity_as_child() {
                saved.insert(identity, child_id);
            }
        }
        if !saved.is_empty() {
            self.node_mut(id)?.saved_children = Some(saved);
        }
        Ok(())
    }

    /// Remove every child entry ahead of repopulation. Children harvested
    /// into the saved map stay alive, merely detached; the rest are
    /// disposed with their subtrees.
    fn detach_children_for_resort(&mut self, id: NodeId) -> Result<()> {
        let saved: HashSet<NodeId> = self
            .node(id)?
            .saved_children
            .as_ref()
            .map(|map| map.values().copied().collect())
            .unwrap_or_default();
        let entries = std::mem::take(&mut self.node_mut(id)?.children);
        for entry in entries {
            if let ChildEntry::Node(child) = entry {
                if !saved.contains(&child) {
                    self.dispose_subtree(child);
                }
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Disposal
    // ---------------------------------------------------------------------

    /// Detach a row from its parent and dispose its subtree, providers
    /// included.
    pub fn dispose(&mut self, id: NodeId) -> Result<()> {
        if id == self.root {
            return Err(GridError::UnsupportedNodeKind);
        }
        let parent = self.node(id)?.parent;
        if let Some(parent_id) = parent {
            if let Ok(parent_node) = self.node_mut(parent_id) {
                parent_node
                    .children
                    .retain(|entry| entry.node_id() != Some(id));
            }
        }
        self.dispose_subtree(id);
        self.push_event(GridEvent::VisibleNodesChanged);
        Ok(())
    }

    pub(crate) fn dispose_subtree(&mut self, id: NodeId) {
        let Some(mut node) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        if let Some(mut provider) = node.provider.take() {
            provider.dispose();
        }
        if let Some(saved) = node.saved_children.take() {
            for (_, stale) in saved {
                self.dispose_subtree(stale);
            }
        }
        for entry in node.children.drain(..) {
            if let ChildEntry::Node(child) = entry {
                self.dispose_subtree(child);
            }
        }
        self.free_indices.push(id.0);
    }
}

impl Drop for HeapGrid {
    fn drop(&mut self) {
        for slot in &mut self.nodes {
            if let Some(node) = slot.as_mut() {
                if let Some(mut provider) = node.provider.take() {
                    provider.dispose();
                }
            }
        }
    }
}

fn set_placeholder_end(node: &mut GridNode, index: usize, position: u64) -> Result<()> {
    match node.children.get_mut(index) {
        Some(ChildEntry::More { to, .. }) => {
            *to = position;
            Ok(())
        }
        _ => Err(GridError::invariant("expected a placeholder before the new range")),
    }
}

fn set_placeholder_start(node: &mut GridNode, index: usize, position: u64) -> Result<()> {
    match node.children.get_mut(index) {
        Some(ChildEntry::More { from, .. }) => {
            *from = position;
            Ok(())
        }
        _ => Err(GridError::invariant("expected a placeholder after the stretched range")),
    }
}

fn remove_placeholder(node: &mut GridNode, index: usize) -> Result<()> {
    match node.children.get(index) {
        Some(ChildEntry::More { .. }) => {
            node.children.remove(index);
            Ok(())
        }
        _ => Err(GridError::invariant("expected a placeholder at the merge boundary")),
    }
}
