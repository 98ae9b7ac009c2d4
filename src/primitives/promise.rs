// ============================================================================
// weft-signals - Promise Adapter
// A once-settling async result surfaced as a readonly signal
// ============================================================================
//
// The adapter is a thin wrapper over a writable signal holding a
// PromiseState. Whoever owns the resolver delivers the completion; the
// resolver consumes itself, so "settles at most once" is enforced by the
// type system rather than a runtime flag.
// ============================================================================

use crate::primitives::signal::{signal, ReadonlySignal, Signal};

// =============================================================================
// PROMISE STATE
// =============================================================================

/// Lifecycle of a once-settling asynchronous value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromiseState<T, E> {
    /// Not yet settled
    Pending,

    /// Settled successfully
    Fulfilled(T),

    /// Settled with an error
    Rejected(E),
}

impl<T, E> PromiseState<T, E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// The fulfilled value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Fulfilled(value) => Some(value),
            _ => None,
        }
    }

    /// The rejection error, if any
    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Rejected(error) => Some(error),
            _ => None,
        }
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Write side of a promise signal. Consuming `self` makes the transition
/// once-only; dropping the resolver unsettled leaves the signal pending
/// forever.
pub struct PromiseResolver<T, E> {
    signal: Signal<PromiseState<T, E>>,
}

impl<T, E> PromiseResolver<T, E>
where
    T: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    /// Settle the signal as fulfilled.
    pub fn resolve(self, value: T) {
        self.signal.set(PromiseState::Fulfilled(value));
    }

    /// Settle the signal as rejected.
    pub fn reject(self, error: E) {
        self.signal.set(PromiseState::Rejected(error));
    }
}

// =============================================================================
// FACTORIES
// =============================================================================

/// Create a pending promise signal and the resolver that settles it.
///
/// # Example
///
/// ```
/// use weft_signals::{promise_signal, PromiseState};
///
/// let (state, resolver) = promise_signal::<&str, String>();
/// assert!(state.get().is_pending());
///
/// resolver.resolve("hi");
/// assert_eq!(state.get(), PromiseState::Fulfilled("hi"));
/// ```
pub fn promise_signal<T, E>() -> (ReadonlySignal<PromiseState<T, E>>, PromiseResolver<T, E>)
where
    T: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    let state = signal(PromiseState::Pending);
    let view = state.readonly();
    (view, PromiseResolver { signal: state })
}

/// A promise signal that is already settled from a `Result`.
pub fn promise_from_result<T, E>(result: Result<T, E>) -> ReadonlySignal<PromiseState<T, E>>
where
    T: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    let state = match result {
        Ok(value) => PromiseState::Fulfilled(value),
        Err(error) => PromiseState::Rejected(error),
    };
    signal(state).readonly()
}

// =============================================================================
// TESTS
// =============================================================================
