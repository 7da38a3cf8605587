//! Engine error types.
//!
//! Provider failures abandon the remainder of the current population or
//! sort call; ranges merged before the failure stay valid. Lookups that
//! simply find nothing (`node_position`, saved-children matching) are not
//! errors — they surface as `None` or empty results.

use thiserror::Error;

use crate::provider::ProviderError;

/// Tree population engine error.
#[derive(Debug, Error)]
pub enum GridError {
    /// An asynchronous provider request rejected.
    #[error("children provider request failed")]
    Provider {
        #[source]
        source: ProviderError,
    },

    /// The node id does not refer to a live node of this grid.
    #[error("unknown or disposed grid node")]
    InvalidNode,

    /// The operation is not defined for the node's kind (for example,
    /// range population on an allocation node).
    #[error("operation is not supported for this node kind")]
    UnsupportedNodeKind,

    /// A structural invariant of the range list or child list was
    /// violated. This is a programming error; the range list is left in
    /// its pre-call state.
    #[error("grid invariant violated: {reason}")]
    InvariantViolation { reason: &'static str },
}

impl GridError {
    pub(crate) fn provider(source: ProviderError) -> Self {
        GridError::Provider { source }
    }

    pub(crate) fn invariant(reason: &'static str) -> Self {
        tracing::error!(reason, "grid invariant violated");
        debug_assert!(false, "grid invariant violated: {reason}");
        GridError::InvariantViolation { reason }
    }
}

pub type Result<T> = std::result::Result<T, GridError>;
