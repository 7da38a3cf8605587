//! Merging the two sides of a snapshot diff into one provider.
//!
//! A diff row's children are the instances added since the base snapshot
//! followed by the instances removed from it. The two underlying providers
//! are independent and stay independently sorted; this provider only
//! concatenates their index spaces. Added items occupy `[0, added_count)`
//! and removed items occupy `[added_count, added_count + removed_count)` —
//! the boundary order is part of the observable contract and is never
//! replaced by a merge on the sort key.

use async_trait::async_trait;
use tracing::debug;

use heapgrid_model::{
    ComparatorConfig, DiffEntry, ItemsRange, ProviderItem, SnapshotObjectId,
};

use crate::provider::{ChildrenProvider, ProviderResult};

/// Presents an added-items provider and a removed-items provider as a
/// single provider over the concatenated virtual index space.
pub struct DiffMergeProvider {
    added: Box<dyn ChildrenProvider>,
    removed: Box<dyn ChildrenProvider>,
    added_count: u64,
    removed_count: u64,
}

impl DiffMergeProvider {
    pub fn new(
        added: Box<dyn ChildrenProvider>,
        removed: Box<dyn ChildrenProvider>,
        added_count: u64,
        removed_count: u64,
    ) -> Self {
        Self {
            added,
            removed,
            added_count,
            removed_count,
        }
    }

    fn total_length(&self) -> u64 {
        self.added_count + self.removed_count
    }
}

/// Rewrite every node item into a tagged diff entry.
fn tag_items(range: &mut ItemsRange, is_added_not_removed: bool) {
    let items = std::mem::take(&mut range.items);
    range.items = items
        .into_iter()
        .map(|item| match item {
            ProviderItem::Node(node) => ProviderItem::Diff(DiffEntry {
                node,
                is_added_not_removed,
            }),
            ProviderItem::Diff(mut entry) => {
                entry.is_added_not_removed = is_added_not_removed;
                ProviderItem::Diff(entry)
            }
            ProviderItem::Edge(edge) => {
                debug_assert!(false, "diff provider received an edge item");
                ProviderItem::Edge(edge)
            }
        })
        .collect();
}

#[async_trait]
impl ChildrenProvider for DiffMergeProvider {
    async fn is_empty(&mut self) -> ProviderResult<bool> {
        Ok(false)
    }

    async fn node_position(&mut self, _id: SnapshotObjectId) -> ProviderResult<Option<u64>> {
        Err("node position lookups are not available on diff providers".into())
    }

    async fn sort_and_rewind(&mut self, comparator: ComparatorConfig) -> ProviderResult<()> {
        self.added.sort_and_rewind(comparator).await?;
        self.removed.sort_and_rewind(comparator).await
    }

    async fn serialize_items_range(&mut self, begin: u64, end: u64) -> ProviderResult<ItemsRange> {
        debug!(begin, end, added_count = self.added_count, "diff slice requested");
        let mut added_items;
        let mut removed_range;
        if begin < self.added_count {
            let mut range = self.added.serialize_items_range(begin, end).await?;
            tag_items(&mut range, true);

            if range.end_position >= end {
                range.total_length = self.total_length();
                return Ok(range);
            }

            let removed_end = end - range.end_position;
            added_items = range;
            removed_range = self.removed.serialize_items_range(0, removed_end).await?;
        } else {
            added_items = ItemsRange::empty();
            removed_range = self
                .removed
                .serialize_items_range(begin - self.added_count, end - self.added_count)
                .await?;
        }

        if added_items.items.is_empty() {
            added_items.start_position = self.added_count + removed_range.start_position;
        }
        tag_items(&mut removed_range, false);
        added_items.items.append(&mut removed_range.items);
        added_items.end_position = self.added_count + removed_range.end_position;
        added_items.total_length = self.total_length();
        Ok(added_items)
    }

    fn dispose(&mut self) {
        self.added.dispose();
        self.removed.dispose();
    }
}
