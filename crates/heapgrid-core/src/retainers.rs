//! Retainer chain auto-expansion.
//!
//! Expanding one retaining row should reveal the path toward the GC root
//! quickly: while a row has an unambiguous dominant retainer (its first
//! child) that is still more than one step away from a root, the chain is
//! expanded further, down to a bounded depth. Cyclic object graphs are cut
//! by the per-node cycle flag computed at construction; a row that repeats
//! one of its ancestors is never descended into.

use tracing::debug;

use crate::error::Result;
use crate::grid::{GridEvent, HeapGrid};
use crate::node::NodeId;

impl HeapGrid {
    /// Expand `id` and cascade down the single-retainer chain, at most
    /// [`GridConfig::retainer_expand_depth`](crate::GridConfig) levels.
    /// Every step populates before expanding, so the chain is never
    /// expanded into an empty shell. Emits `ExpandRetainersComplete` once
    /// the walk stops.
    pub(crate) async fn expand_retainer_chain(&mut self, id: NodeId) -> Result<()> {
        let mut current = id;
        let mut remaining = self.config.retainer_expand_depth;
        loop {
            if !self.node(current)?.is_populated() {
                self.populate(current).await?;
            }
            self.mark_expanded(current)?;

            remaining = remaining.saturating_sub(1);
            if remaining == 0 {
                debug!(node = current.0, "retainer expansion depth exhausted");
                break;
            }
            let Some(first) = self
                .node(current)?
                .children()
                .first()
                .and_then(|entry| entry.node_id())
            else {
                break;
            };
            let child = self.node(first)?;
            if child.is_cycled_with_ancestor() {
                debug!(node = first.0, "retainer chain cycles back into an ancestor");
                break;
            }
            if child.distance().is_none_or(|distance| distance <= 1) {
                break;
            }
            current = first;
        }
        self.push_event(GridEvent::ExpandRetainersComplete);
        Ok(())
    }
}
