//! Diff-merge provider: one virtual index space over two snapshots.

mod common;

use std::sync::Arc;

use heapgrid_core::{ChildrenProvider, DiffMergeProvider, GridConfig, HeapGrid, NodeKind};
use heapgrid_model::{ClassDiff, ProviderItem, SnapshotObjectId};

use common::{CallLog, MockSnapshot, VecProvider, heap_node};

fn added_provider(log: &Arc<CallLog>) -> Box<dyn ChildrenProvider> {
    let items = (1..=3)
        .map(|i| ProviderItem::Node(heap_node(i, &format!("Added#{i}"), 2, 10, 10)))
        .collect();
    Box::new(VecProvider::new(items, Arc::clone(log)))
}

fn removed_provider(log: &Arc<CallLog>) -> Box<dyn ChildrenProvider> {
    let items = (10..=14)
        .map(|i| ProviderItem::Node(heap_node(i, &format!("Removed#{i}"), 2, 10, 10)))
        .collect();
    Box::new(VecProvider::new(items, Arc::clone(log)))
}

fn tags(items: &[ProviderItem]) -> Vec<bool> {
    items
        .iter()
        .map(|item| match item {
            ProviderItem::Diff(entry) => entry.is_added_not_removed,
            other => panic!("expected tagged diff items, got {other:?}"),
        })
        .collect()
}

#[tokio::test]
async fn total_length_is_the_sum_of_both_sides() {
    let log = Arc::new(CallLog::default());
    let mut provider = DiffMergeProvider::new(added_provider(&log), removed_provider(&log), 3, 5);

    let range = provider.serialize_items_range(0, 8).await.expect("slice");
    assert_eq!(range.total_length, 8);
    assert_eq!(range.items.len(), 8);
    assert_eq!(tags(&range.items), [true, true, true, false, false, false, false, false]);
}

#[tokio::test]
async fn added_prefix_serves_only_added_items() {
    let log = Arc::new(CallLog::default());
    let mut provider = DiffMergeProvider::new(added_provider(&log), removed_provider(&log), 3, 5);

    let range = provider.serialize_items_range(0, 3).await.expect("slice");
    assert_eq!((range.start_position, range.end_position), (0, 3));
    assert_eq!(range.total_length, 8);
    assert_eq!(tags(&range.items), [true, true, true]);
}

#[tokio::test]
async fn straddling_slice_concatenates_added_tail_and_removed_head() {
    let log = Arc::new(CallLog::default());
    let mut provider = DiffMergeProvider::new(added_provider(&log), removed_provider(&log), 3, 5);

    let range = provider.serialize_items_range(2, 6).await.expect("slice");
    assert_eq!((range.start_position, range.end_position), (2, 6));
    assert_eq!(tags(&range.items), [true, false, false, false]);
    // Added item at position 2, then the removed head from position 0.
    let ids: Vec<u64> = range
        .items
        .iter()
        .filter_map(|item| item.as_node().map(|node| node.id.value()))
        .collect();
    assert_eq!(ids, [3, 10, 11, 12]);
}

#[tokio::test]
async fn suffix_slice_delegates_with_shifted_positions() {
    let log = Arc::new(CallLog::default());
    let mut provider = DiffMergeProvider::new(added_provider(&log), removed_provider(&log), 3, 5);

    let range = provider.serialize_items_range(3, 8).await.expect("slice");
    assert_eq!((range.start_position, range.end_position), (3, 8));
    assert_eq!(tags(&range.items), [false, false, false, false, false]);
    assert_eq!(log.serialized(), [(0, 5)]);
}

#[tokio::test]
async fn sort_is_applied_to_both_sides_without_merging_the_boundary() {
    let log = Arc::new(CallLog::default());
    let mut provider = DiffMergeProvider::new(added_provider(&log), removed_provider(&log), 3, 5);

    let comparator = heapgrid_model::ComparatorConfig::new(
        heapgrid_model::SortField::Name,
        false,
        heapgrid_model::SortField::Id,
        true,
    );
    provider.sort_and_rewind(comparator).await.expect("sort");
    assert_eq!(log.sorted().len(), 2);

    // Even name-descending keeps every added item ahead of every removed
    // item; only the order inside each side changes.
    let range = provider.serialize_items_range(0, 8).await.expect("slice");
    assert_eq!(tags(&range.items), [true, true, true, false, false, false, false, false]);
}

#[tokio::test]
async fn node_position_is_not_available() {
    let log = Arc::new(CallLog::default());
    let mut provider = DiffMergeProvider::new(added_provider(&log), removed_provider(&log), 3, 5);
    assert!(provider.node_position(SnapshotObjectId(1)).await.is_err());
    assert!(!provider.is_empty().await.expect("is_empty"));
}

#[tokio::test]
async fn dispose_releases_both_sides() {
    let log = Arc::new(CallLog::default());
    let mut provider = DiffMergeProvider::new(added_provider(&log), removed_provider(&log), 3, 5);
    provider.dispose();
    assert_eq!(log.disposed(), 2);
}

#[tokio::test]
async fn diff_rows_build_added_then_removed_instances() {
    let mut current = MockSnapshot::default();
    current.total_size = 10_000;
    current.added_instances.insert(
        "Leaky".to_string(),
        (1..=3).map(|i| heap_node(i, &format!("Leaky#{i}"), 2, 8, 8)).collect(),
    );
    let mut base = MockSnapshot::default();
    base.uid = 1;
    for i in 10..=14 {
        base.nodes_by_index
            .insert(i, heap_node(i, &format!("Leaky#{i}"), 2, 8, 8));
    }

    let mut grid =
        HeapGrid::with_base_snapshot(Arc::new(current), Arc::new(base), GridConfig::default());
    let diff_row = grid
        .attach_diff_class(
            "Leaky",
            ClassDiff {
                added_count: 3,
                removed_count: 5,
                count_delta: -2,
                added_size: 24,
                removed_size: 40,
                size_delta: -16,
                deleted_indexes: (10..=14).collect(),
            },
        )
        .expect("attach diff row");

    grid.populate(diff_row).await.expect("populate");

    let children = grid.children(diff_row).expect("children");
    assert_eq!(children.len(), 8);
    let deleted_flags: Vec<bool> = children
        .iter()
        .filter_map(|entry| entry.node_id())
        .map(|child| match grid.node(child).expect("child").kind() {
            NodeKind::Instance(meta) => meta.is_deleted_node(),
            other => panic!("expected instance rows, got {other:?}"),
        })
        .collect();
    assert_eq!(
        deleted_flags,
        [false, false, false, true, true, true, true, true]
    );
}
