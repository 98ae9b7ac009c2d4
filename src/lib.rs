// ============================================================================
// weft-signals - A Fine-Grained Reactive Value Graph for Rust
// ============================================================================
//
// Values whose consumers are recomputed automatically when transitive
// dependencies change. Invalidation is push-based (a write marks everything
// downstream stale and enqueues affected effects before it returns);
// validation is pull-based (a read recomputes only what actually needs it,
// by per-edge version comparison). The combination is glitch-free: no
// consumer ever observes a half-propagated state, and equal recomputations
// are invisible downstream.
//
// Single-threaded by design. Each thread gets its own graph; nodes are not
// Send. Dependency edges hold weak references on both sides, so holding a
// signal never keeps its observers alive.
// ============================================================================

pub mod core;
pub mod primitives;
pub mod reactivity;

// Re-export the core surface at the crate root
pub use crate::core::error::SignalError;
pub use crate::core::types::{Consumer, Edge, EqualsFn, NodeId, NodeState, Producer, Version};

pub use primitives::effect::{
    effect, effect_with, effect_with_cleanup, CleanupFn, Effect, EffectFn, EffectInner,
    EffectOptions,
};
pub use primitives::memo::{fallible_memo, memo, memo_with, Memo, MemoOptions, MemoState};
pub use primitives::promise::{
    promise_from_result, promise_signal, PromiseResolver, PromiseState,
};
pub use primitives::signal::{
    is_signal, signal, signal_with, IsSignal, ReadonlySignal, Signal, SignalOptions,
};

pub use reactivity::equality;
pub use reactivity::scheduling::{flush, reset_scheduler, SchedulerFn};
pub use reactivity::tracking::untracked;

// =============================================================================
// TESTS
// =============================================================================
