// ============================================================================
// weft-signals - Core Module
// The common node record, role traits, ambient context, and error taxonomy
// ============================================================================

pub mod context;
pub mod error;
pub mod types;

// Re-export commonly used items
pub use context::{is_notifying, is_tracking, with_context, ActiveConsumer, ReactiveContext};
pub use error::SignalError;
pub use types::{default_equals, Consumer, Edge, EqualsFn, NodeId, NodeState, Producer, Version};
