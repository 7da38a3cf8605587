//! Display column values.
//!
//! Column data is an immutable snapshot of formatted strings computed when
//! a node is constructed, so re-renders never reach back into the snapshot.

use std::fmt;

use heapgrid_model::BASE_SYSTEM_DISTANCE;

/// Identifier of a display column across all grid flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColumnId {
    Object,
    Distance,
    Count,
    ShallowSize,
    RetainedSize,
    ShallowSizePercent,
    RetainedSizePercent,
    AddedCount,
    RemovedCount,
    CountDelta,
    AddedSize,
    RemovedSize,
    SizeDelta,
    Name,
    Size,
    LiveCount,
    LiveSize,
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnId::Object => "object",
            ColumnId::Distance => "distance",
            ColumnId::Count => "count",
            ColumnId::ShallowSize => "shallowSize",
            ColumnId::RetainedSize => "retainedSize",
            ColumnId::ShallowSizePercent => "shallowSize-percent",
            ColumnId::RetainedSizePercent => "retainedSize-percent",
            ColumnId::AddedCount => "addedCount",
            ColumnId::RemovedCount => "removedCount",
            ColumnId::CountDelta => "countDelta",
            ColumnId::AddedSize => "addedSize",
            ColumnId::RemovedSize => "removedSize",
            ColumnId::SizeDelta => "sizeDelta",
            ColumnId::Name => "name",
            ColumnId::Size => "size",
            ColumnId::LiveCount => "liveCount",
            ColumnId::LiveSize => "liveSize",
        };
        f.write_str(name)
    }
}

/// Group digits with thousands separators: `1234567` → `"1,234,567"`.
pub fn with_thousands_separator(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let offset = digits.len() % 3;
    for (i, ch) in digits.chars().enumerate() {
        if i != 0 && i % 3 == offset {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Percentage with a non-breaking space before the sign: `"12 %"`.
pub fn to_percent_string(value: f64) -> String {
    format!("{:.0}\u{a0}%", value)
}

/// Distance from a GC root, or a minus sign for unreachable / synthetic
/// distances.
pub fn to_ui_distance(distance: i32) -> String {
    if distance >= 0 && distance < BASE_SYSTEM_DISTANCE {
        distance.to_string()
    } else {
        "\u{2212}".to_string()
    }
}

/// `+` / math-minus prefix for a signed delta; empty for zero. The math
/// minus has the same width as the plus sign.
pub fn sign_for_delta(delta: i64) -> &'static str {
    if delta == 0 {
        ""
    } else if delta > 0 {
        "+"
    } else {
        "\u{2212}"
    }
}

/// A signed delta with sign prefix and grouped magnitude.
pub fn signed_with_separator(delta: i64) -> String {
    format!(
        "{}{}",
        sign_for_delta(delta),
        with_thousands_separator(delta.unsigned_abs())
    )
}
