//! Sort configuration handed to snapshot providers.

use serde::{Deserialize, Serialize};

/// A sortable item field understood by the snapshot backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    /// Edge name, with element indexes compared numerically.
    EdgeName,
    /// Target node name.
    Name,
    Distance,
    SelfSize,
    RetainedSize,
    Id,
}

/// The grid column a view sorted by. Each node kind maps a column to its
/// own primary/secondary field pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortColumn {
    Object,
    Distance,
    Count,
    ShallowSize,
    RetainedSize,
    AddedCount,
    RemovedCount,
    CountDelta,
    AddedSize,
    RemovedSize,
    SizeDelta,
    /// Allocation view columns.
    Name,
    Size,
    LiveCount,
    LiveSize,
}

/// A two-level sort specification: primary field and direction, then a
/// secondary field and direction used to break ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparatorConfig {
    pub field: SortField,
    pub ascending: bool,
    pub secondary: SortField,
    pub secondary_ascending: bool,
}

impl ComparatorConfig {
    pub fn new(
        field: SortField,
        ascending: bool,
        secondary: SortField,
        secondary_ascending: bool,
    ) -> Self {
        Self {
            field,
            ascending,
            secondary,
            secondary_ascending,
        }
    }
}
