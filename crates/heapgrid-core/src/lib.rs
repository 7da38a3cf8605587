//! Incremental, range-tracked tree population for heap snapshot grids.
//!
//! A heap snapshot holds millions of objects; a tree view over it can only
//! ever materialize a sliver. This crate keeps a live, mutable tree
//! consistent with an asynchronous, paginated backing source:
//!
//! - **Sparse ranges** — each node tracks which half-open intervals of its
//!   provider's virtual sequence are materialized; everything else is
//!   represented by "show more" placeholder rows.
//! - **Chunked population** — requested spans are fetched in fixed-size
//!   chunks, strictly in increasing-position order, and merged into the
//!   existing ranges (stretching, bracketing with placeholders, splicing
//!   with the successor range).
//! - **Sort with state preservation** — re-sorting harvests expanded
//!   children by stable identity and reuses them in place after
//!   repopulation, so the expanded shape of the subtree survives.
//! - **Snapshot diffing** — two independent providers (added and removed
//!   instances) are merged into one virtual index space by position
//!   offsetting, all added items before all removed ones.
//! - **Retainer chains** — expanding a retaining row cascades down the
//!   dominant retainer chain, with a cycle guard for cyclic object graphs.
//!
//! The snapshot backend stays behind two traits, [`ChildrenProvider`] and
//! [`SnapshotAccess`]; the engine never sees the heap graph itself.
//!
//! # Architecture
//!
//! - `grid.rs` - the node arena and the population/sort engine
//! - `node.rs` - node kinds and their capability set
//! - `ranges.rs` - retrieved-range bookkeeping and index translation
//! - `diff.rs` - the two-sided diff provider
//! - `retainers.rs` - retainer chain auto-expansion
//! - `allocation.rs` - allocation caller-chain population
//! - `columns.rs` - display column formatting
//! - `provider.rs` - backend interfaces
//! - `config.rs` / `error.rs` - tuning and structured errors

mod allocation;
mod columns;
mod config;
mod diff;
mod error;
mod grid;
mod node;
mod provider;
mod ranges;
mod retainers;

pub use columns::{
    ColumnId, sign_for_delta, signed_with_separator, to_percent_string, to_ui_distance,
    with_thousands_separator,
};
pub use config::GridConfig;
pub use diff::DiffMergeProvider;
pub use error::{GridError, Result};
pub use grid::{GridEvent, HeapGrid};
pub use node::{
    AllocationMeta, ChildEntry, ConstructorMeta, DiffMeta, GridNode, InstanceMeta, NodeId,
    NodeKind, ObjectMeta,
};
pub use provider::{ChildrenProvider, ProviderError, ProviderResult, SnapshotAccess};
pub use ranges::{IndexRange, RangeList};
