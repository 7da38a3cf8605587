//! Grid configuration.

/// Tuning knobs for tree population.
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// Chunk size for provider fetches. A population request is split into
    /// chunks of this many items, issued strictly in increasing-position
    /// order. Also the span fetched by a plain `populate()` and by the
    /// "show more" placeholder action.
    pub default_populate_count: u64,

    /// Maximum number of levels a retainer chain is auto-expanded when a
    /// retaining node is expanded.
    pub retainer_expand_depth: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            default_populate_count: 100,
            retainer_expand_depth: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_interactive_tuning() {
        let config = GridConfig::default();
        assert_eq!(config.default_populate_count, 100);
        assert_eq!(config.retainer_expand_depth, 20);
    }
}
