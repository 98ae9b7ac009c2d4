// ============================================================================
// weft-signals - Error Types
// Failure taxonomy for graph operations and user computations
// ============================================================================

use std::rc::Rc;

use thiserror::Error;

/// Errors surfaced by reads of the reactive graph.
///
/// `get` accessors panic with the error's message (invalid usage); the
/// `try_get` accessors return these for callers that want to recover.
#[derive(Debug, Clone, Error)]
pub enum SignalError {
    /// A memo's computation re-entered itself. Raised to the reader; the
    /// graph stays consistent and the memo is left recomputable.
    #[error("cycle detected while computing `{tag}`")]
    Cycle {
        /// Debug tag of the memo whose computation re-entered itself
        tag: String,
    },

    /// A signal was read while change notification was propagating.
    /// Reads inside `on_dependency_change` dispatch are not allowed.
    #[error("signal read while change notification is in progress")]
    ReadDuringNotify,

    /// A user-supplied fallible computation returned an error. The memo
    /// caches it and returns it from every read until a dependency change
    /// forces recomputation.
    #[error("memo computation failed: {0}")]
    Computation(Rc<dyn std::error::Error>),
}

impl SignalError {
    /// Wrap an arbitrary error as a cached computation failure
    pub fn computation(err: impl std::error::Error + 'static) -> Self {
        Self::Computation(Rc::new(err))
    }
}

// =============================================================================
// TESTS
// =============================================================================
