// ============================================================================
// weft-signals - Primitives Module
// The node behaviours layered on the graph core: signal, memo, effect
// ============================================================================

pub mod effect;
pub mod memo;
pub mod promise;
pub mod signal;

// Re-export for convenience
pub use effect::{
    effect, effect_with, effect_with_cleanup, CleanupFn, Effect, EffectFn, EffectInner,
    EffectOptions,
};
pub use memo::{fallible_memo, memo, memo_with, Memo, MemoInner, MemoOptions, MemoState};
pub use promise::{
    promise_from_result, promise_signal, PromiseResolver, PromiseState,
};
pub use signal::{
    is_signal, signal, signal_with, IsSignal, ReadonlySignal, Signal, SignalInner, SignalOptions,
};
