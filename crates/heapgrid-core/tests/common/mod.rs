//! Scripted in-memory snapshot backend for engine tests.
#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use heapgrid_core::{ChildrenProvider, ProviderResult, SnapshotAccess};
use heapgrid_model::{
    AllocationCallers, AllocationFrame, ComparatorConfig, HeapEdge, HeapEdgeType, HeapNode,
    HeapNodeType, ItemsRange, NodeFilter, ProviderItem, SnapshotObjectId, SortField,
};

/// Records provider traffic for assertions.
#[derive(Default)]
pub struct CallLog {
    pub serialized: Mutex<Vec<(u64, u64)>>,
    pub sorted: Mutex<Vec<ComparatorConfig>>,
    pub emptiness_probes: Mutex<u64>,
    pub disposed: Mutex<u64>,
}

impl CallLog {
    pub fn emptiness_probes(&self) -> u64 {
        *self.emptiness_probes.lock().expect("log lock")
    }

    pub fn disposed(&self) -> u64 {
        *self.disposed.lock().expect("log lock")
    }

    pub fn sorted(&self) -> Vec<ComparatorConfig> {
        self.sorted.lock().expect("log lock").clone()
    }

    pub fn serialized(&self) -> Vec<(u64, u64)> {
        self.serialized.lock().expect("log lock").clone()
    }
}

/// A provider over a fixed item vector, sortable with the same comparator
/// configs the engine emits.
pub struct VecProvider {
    items: Vec<ProviderItem>,
    log: Arc<CallLog>,
    fail_serialize_from: Option<u64>,
}

impl VecProvider {
    pub fn new(items: Vec<ProviderItem>, log: Arc<CallLog>) -> Self {
        Self {
            items,
            log,
            fail_serialize_from: None,
        }
    }

    /// Reject any serialize request starting at or beyond `position`.
    pub fn with_failure_from(mut self, position: u64) -> Self {
        self.fail_serialize_from = Some(position);
        self
    }
}

#[async_trait]
impl ChildrenProvider for VecProvider {
    async fn is_empty(&mut self) -> ProviderResult<bool> {
        *self.log.emptiness_probes.lock().expect("log lock") += 1;
        Ok(self.items.is_empty())
    }

    async fn node_position(&mut self, id: SnapshotObjectId) -> ProviderResult<Option<u64>> {
        Ok(self
            .items
            .iter()
            .position(|item| item_id(item) == Some(id))
            .map(|index| index as u64))
    }

    async fn sort_and_rewind(&mut self, comparator: ComparatorConfig) -> ProviderResult<()> {
        self.log.sorted.lock().expect("log lock").push(comparator);
        sort_items(&mut self.items, comparator);
        Ok(())
    }

    async fn serialize_items_range(&mut self, begin: u64, end: u64) -> ProviderResult<ItemsRange> {
        self.log.serialized.lock().expect("log lock").push((begin, end));
        if self.fail_serialize_from.is_some_and(|from| begin >= from) {
            return Err("backend worker rejected the request".into());
        }
        let total = self.items.len() as u64;
        let begin = begin.min(total);
        let end = end.min(total);
        let items = self.items[begin as usize..end as usize].to_vec();
        Ok(ItemsRange::new(begin, end, total, items))
    }

    fn dispose(&mut self) {
        *self.log.disposed.lock().expect("log lock") += 1;
    }
}

fn item_id(item: &ProviderItem) -> Option<SnapshotObjectId> {
    match item {
        ProviderItem::Edge(edge) => Some(edge.node.id),
        other => other.as_node().map(|node| node.id),
    }
}

fn field_key(item: &ProviderItem, field: SortField) -> FieldKey {
    let node = match item {
        ProviderItem::Edge(edge) => &edge.node,
        ProviderItem::Node(node) => node,
        ProviderItem::Diff(entry) => &entry.node,
    };
    match field {
        SortField::EdgeName => FieldKey::Text(match item {
            ProviderItem::Edge(edge) => edge.name.clone(),
            _ => node.name.clone(),
        }),
        SortField::Name => FieldKey::Text(node.name.clone()),
        SortField::Distance => FieldKey::Signed(i64::from(node.distance)),
        SortField::SelfSize => FieldKey::Unsigned(node.self_size),
        SortField::RetainedSize => FieldKey::Unsigned(node.retained_size),
        SortField::Id => FieldKey::Unsigned(node.id.value()),
    }
}

enum FieldKey {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

fn compare_field(a: &ProviderItem, b: &ProviderItem, field: SortField, ascending: bool) -> Ordering {
    let ordering = match (field_key(a, field), field_key(b, field)) {
        (FieldKey::Text(left), FieldKey::Text(right)) => left.cmp(&right),
        (FieldKey::Signed(left), FieldKey::Signed(right)) => left.cmp(&right),
        (FieldKey::Unsigned(left), FieldKey::Unsigned(right)) => left.cmp(&right),
        _ => Ordering::Equal,
    };
    if ascending { ordering } else { ordering.reverse() }
}

/// Sort items the way a real backend applies a comparator config.
pub fn sort_items(items: &mut [ProviderItem], comparator: ComparatorConfig) {
    items.sort_by(|a, b| {
        compare_field(a, b, comparator.field, comparator.ascending).then_with(|| {
            compare_field(a, b, comparator.secondary, comparator.secondary_ascending)
        })
    });
}

/// A scripted snapshot: fixed edge lists, class instance lists, and
/// allocation caller answers.
#[derive(Default)]
pub struct MockSnapshot {
    pub uid: u32,
    pub total_size: u64,
    pub edges: HashMap<u64, Vec<HeapEdge>>,
    pub retaining_edges: HashMap<u64, Vec<HeapEdge>>,
    pub class_instances: HashMap<String, Vec<HeapNode>>,
    pub added_instances: HashMap<String, Vec<HeapNode>>,
    pub nodes_by_index: HashMap<u64, HeapNode>,
    pub allocation_callers: HashMap<u64, AllocationCallers>,
    /// When set, every provider rejects serialize requests starting at or
    /// beyond this position.
    pub fail_serialize_from: Option<u64>,
    pub log: Arc<CallLog>,
}

impl MockSnapshot {
    fn provider_for(&self, items: Vec<ProviderItem>) -> Box<dyn ChildrenProvider> {
        let provider = VecProvider::new(items, Arc::clone(&self.log));
        Box::new(match self.fail_serialize_from {
            Some(position) => provider.with_failure_from(position),
            None => provider,
        })
    }
}

#[async_trait]
impl SnapshotAccess for MockSnapshot {
    fn uid(&self) -> u32 {
        self.uid
    }

    fn total_size(&self) -> u64 {
        self.total_size
    }

    fn create_edges_provider(&self, node_index: u64) -> Box<dyn ChildrenProvider> {
        let items = self
            .edges
            .get(&node_index)
            .map(|edges| edges.iter().cloned().map(ProviderItem::Edge).collect())
            .unwrap_or_default();
        self.provider_for(items)
    }

    fn create_retaining_edges_provider(&self, node_index: u64) -> Box<dyn ChildrenProvider> {
        let items = self
            .retaining_edges
            .get(&node_index)
            .map(|edges| edges.iter().cloned().map(ProviderItem::Edge).collect())
            .unwrap_or_default();
        self.provider_for(items)
    }

    fn create_nodes_provider_for_class(
        &self,
        class_name: &str,
        _filter: NodeFilter,
    ) -> Box<dyn ChildrenProvider> {
        let items = self
            .class_instances
            .get(class_name)
            .map(|nodes| nodes.iter().cloned().map(ProviderItem::Node).collect())
            .unwrap_or_default();
        self.provider_for(items)
    }

    fn create_added_nodes_provider(&self, _base_uid: u32, class_name: &str) -> Box<dyn ChildrenProvider> {
        let items = self
            .added_instances
            .get(class_name)
            .map(|nodes| nodes.iter().cloned().map(ProviderItem::Node).collect())
            .unwrap_or_default();
        self.provider_for(items)
    }

    fn create_deleted_nodes_provider(&self, node_indexes: &[u64]) -> Box<dyn ChildrenProvider> {
        let items = node_indexes
            .iter()
            .filter_map(|index| self.nodes_by_index.get(index))
            .cloned()
            .map(ProviderItem::Node)
            .collect();
        self.provider_for(items)
    }

    async fn allocation_node_callers(&self, node_id: u64) -> ProviderResult<AllocationCallers> {
        Ok(self
            .allocation_callers
            .get(&node_id)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn heap_node(id: u64, name: &str, distance: i32, self_size: u64, retained_size: u64) -> HeapNode {
    HeapNode {
        id: SnapshotObjectId(id),
        name: name.to_string(),
        node_type: HeapNodeType::Object,
        distance,
        self_size,
        retained_size,
        node_index: id,
        can_be_queried: false,
        detached_dom_tree_node: false,
    }
}

pub fn edge(name: &str, edge_index: u64, node: HeapNode) -> HeapEdge {
    HeapEdge {
        name: name.to_string(),
        edge_type: HeapEdgeType::Property,
        edge_index,
        node,
    }
}

pub fn allocation_frame(id: u64, name: &str, count: u64, size: u64, has_children: bool) -> AllocationFrame {
    AllocationFrame {
        id,
        name: name.to_string(),
        script_name: "app.js".to_string(),
        script_id: 7,
        line: 10,
        column: 1,
        count,
        size,
        live_count: count / 2,
        live_size: size / 2,
        has_children,
    }
}

/// `count` instances named `Widget#<i>`, ids `1..=count`, retained size
/// descending with the id so the default sort leaves them in id order.
pub fn descending_instances(count: u64) -> Vec<HeapNode> {
    (1..=count)
        .map(|i| heap_node(i, &format!("Widget#{i}"), 2, 16, 100_000 - i))
        .collect()
}
