//! Interfaces to the snapshot backend.
//!
//! The engine never touches the heap graph itself. It consumes two
//! abstractions: [`ChildrenProvider`], an asynchronous, sortable, paginated
//! source of ordered items for one parent node, and [`SnapshotAccess`],
//! the per-snapshot factory for providers plus the few whole-snapshot
//! facts the grid needs (uid, total size, allocation callers).

use async_trait::async_trait;

use heapgrid_model::{
    AllocationCallers, ComparatorConfig, ItemsRange, NodeFilter, SnapshotObjectId,
};

/// Error type surfaced by backend implementations.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// An asynchronous, sortable, paginated source of ordered items for one
/// parent node.
///
/// Each provider is owned exclusively by the node it serves; the engine
/// serializes all calls on it, so implementations may keep cursors or
/// other per-sequence state without interior synchronization.
#[async_trait]
pub trait ChildrenProvider: Send {
    /// Whether the virtual sequence has zero items.
    async fn is_empty(&mut self) -> ProviderResult<bool>;

    /// Virtual index of the item with the given identity under the current
    /// sort order, or `None` if the sequence does not contain it.
    async fn node_position(&mut self, id: SnapshotObjectId) -> ProviderResult<Option<u64>>;

    /// Re-sort the underlying sequence and reset internal cursors.
    async fn sort_and_rewind(&mut self, comparator: ComparatorConfig) -> ProviderResult<()>;

    /// Serialize the items covering at least `begin..end`. The returned
    /// range may be a superset of the request and carries the authoritative
    /// total length of the sequence.
    async fn serialize_items_range(&mut self, begin: u64, end: u64) -> ProviderResult<ItemsRange>;

    /// Release provider-side resources (for example a held worker-side
    /// object set). Called exactly once, when the owning node is disposed
    /// or the provider is discarded.
    fn dispose(&mut self);
}

/// Access to one heap snapshot held by the backend.
#[async_trait]
pub trait SnapshotAccess: Send + Sync {
    /// Identifier of this snapshot within the profiling session.
    fn uid(&self) -> u32;

    /// Total size of the heap in bytes; the denominator for percentage
    /// columns.
    fn total_size(&self) -> u64;

    /// Outgoing references of the object at `node_index`.
    fn create_edges_provider(&self, node_index: u64) -> Box<dyn ChildrenProvider>;

    /// Incoming ("what points to this object") references of the object at
    /// `node_index`.
    fn create_retaining_edges_provider(&self, node_index: u64) -> Box<dyn ChildrenProvider>;

    /// Instances of the class named `class_name`, restricted by `filter`.
    fn create_nodes_provider_for_class(
        &self,
        class_name: &str,
        filter: NodeFilter,
    ) -> Box<dyn ChildrenProvider>;

    /// Instances of `class_name` present in this snapshot but absent from
    /// the base snapshot identified by `base_uid`.
    fn create_added_nodes_provider(
        &self,
        base_uid: u32,
        class_name: &str,
    ) -> Box<dyn ChildrenProvider>;

    /// The objects at the given snapshot-local indexes (the deleted side
    /// of a diff, addressed inside the base snapshot).
    fn create_deleted_nodes_provider(&self, node_indexes: &[u64]) -> Box<dyn ChildrenProvider>;

    /// Callers of an allocation stack frame, split into the single-caller
    /// chain and the branching callers.
    async fn allocation_node_callers(&self, node_id: u64) -> ProviderResult<AllocationCallers>;
}
