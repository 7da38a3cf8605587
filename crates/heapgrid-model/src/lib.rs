//! Data model for heap snapshot grid views.
//!
//! This crate defines the types exchanged between a heap snapshot backend
//! and the tree-population engine in `heapgrid-core`: heap graph item
//! records, per-class aggregates and diffs, the serialized items-range
//! envelope, sort configuration, and instance filters. Everything here is
//! plain data — the backend serializes it across a worker boundary, so all
//! types carry serde derives.

pub mod comparator;
pub mod filter;
pub mod items;

pub use comparator::{ComparatorConfig, SortColumn, SortField};
pub use filter::NodeFilter;
pub use items::{
    Aggregate, AllocationCallers, AllocationFrame, BASE_SYSTEM_DISTANCE, ChildIdentity,
    ClassDiff, DiffEntry, HeapEdge, HeapEdgeType, HeapNode, HeapNodeType, ItemsRange,
    ProviderItem, SnapshotObjectId,
};
