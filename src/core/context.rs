// ============================================================================
// weft-signals - Reactive Context
// Thread-local ambient state for the reactive graph
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Weak;

use super::types::Consumer;

// =============================================================================
// ACTIVE CONSUMER
// =============================================================================

/// The consumer whose tracking pass is currently running.
///
/// Producers consult this slot from their read path: if it is occupied, the
/// read records a dependency edge from the producer to this consumer.
#[derive(Clone)]
pub struct ActiveConsumer {
    /// The consumer node (weak: the ambient slot must not keep nodes alive)
    pub node: Weak<dyn Consumer>,

    /// Whether signal writes are permitted while this consumer is running.
    /// False for memo computations; effects opt in via `allow_signal_writes`.
    pub writes_allowed: bool,
}

// =============================================================================
// REACTIVE CONTEXT
// =============================================================================

/// Thread-local ambient state shared by every node on this thread.
///
/// All three fields have the lifecycle "set for the duration of a scoped
/// operation, restored on every exit path" - the guards below enforce that
/// even across panics.
pub struct ReactiveContext {
    /// The consumer currently executing a tracked computation, if any
    active_consumer: RefCell<Option<ActiveConsumer>>,

    /// Whether change notification is currently propagating
    notifying: Cell<bool>,

    /// Monotone id counter for node allocation
    next_id: Cell<u64>,
}

impl ReactiveContext {
    fn new() -> Self {
        Self {
            active_consumer: RefCell::new(None),
            notifying: Cell::new(false),
            next_id: Cell::new(0),
        }
    }

    /// Swap the active consumer, returning the previous occupant
    pub fn set_active_consumer(&self, consumer: Option<ActiveConsumer>) -> Option<ActiveConsumer> {
        self.active_consumer.replace(consumer)
    }

    /// Get the active consumer (cloned out of the slot)
    pub fn active_consumer(&self) -> Option<ActiveConsumer> {
        self.active_consumer.borrow().clone()
    }

    /// Check whether a tracked computation is running
    pub fn has_active_consumer(&self) -> bool {
        self.active_consumer.borrow().is_some()
    }

    /// Set the notifying flag, returning its previous value
    pub fn set_notifying(&self, value: bool) -> bool {
        self.notifying.replace(value)
    }

    /// Whether invalidation is currently propagating
    pub fn is_notifying(&self) -> bool {
        self.notifying.get()
    }

    /// Allocate the next node id
    pub fn allocate_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    static CONTEXT: ReactiveContext = ReactiveContext::new();
}

/// Access the thread-local reactive context.
pub fn with_context<R>(f: impl FnOnce(&ReactiveContext) -> R) -> R {
    CONTEXT.with(f)
}

// =============================================================================
// SCOPED GUARDS
// =============================================================================

/// Guard that restores the previous active consumer on drop.
///
/// Created by swapping a consumer (or `None`, for untracked scopes) into the
/// ambient slot; the swap is undone on every exit path, including unwinds.
pub struct ConsumerGuard {
    prev: Option<ActiveConsumer>,
}

impl ConsumerGuard {
    pub fn swap(consumer: Option<ActiveConsumer>) -> Self {
        let prev = with_context(|ctx| ctx.set_active_consumer(consumer));
        Self { prev }
    }
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        with_context(|ctx| ctx.set_active_consumer(prev));
    }
}

/// Guard that raises the notifying flag for the duration of a notification
/// pass. Nested passes keep the flag raised; the outermost restore clears it.
pub struct NotifyGuard {
    prev: bool,
}

impl NotifyGuard {
    pub fn enter() -> Self {
        let prev = with_context(|ctx| ctx.set_notifying(true));
        Self { prev }
    }
}

impl Drop for NotifyGuard {
    fn drop(&mut self) {
        with_context(|ctx| ctx.set_notifying(self.prev));
    }
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// Check if a tracked computation is currently running
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.has_active_consumer())
}

/// Check if change notification is currently propagating
pub fn is_notifying() -> bool {
    with_context(|ctx| ctx.is_notifying())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_starts_idle() {
        with_context(|ctx| {
            assert!(!ctx.has_active_consumer());
            assert!(!ctx.is_notifying());
        });
        assert!(!is_tracking());
        assert!(!is_notifying());
    }

    #[test]
    fn ids_are_dense_and_monotone() {
        let a = with_context(|ctx| ctx.allocate_id());
        let b = with_context(|ctx| ctx.allocate_id());
        let c = with_context(|ctx| ctx.allocate_id());
        assert_eq!(b, a + 1);
        assert_eq!(c, b + 1);
    }

    #[test]
    fn notify_guard_restores_on_drop() {
        assert!(!is_notifying());
        {
            let _guard = NotifyGuard::enter();
            assert!(is_notifying());

            // Nested guard keeps the flag raised
            {
                let _inner = NotifyGuard::enter();
                assert!(is_notifying());
            }
            assert!(is_notifying());
        }
        assert!(!is_notifying());
    }

    #[test]
    fn notify_guard_restores_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _guard = NotifyGuard::enter();
            panic!("intentional panic");
        });
        assert!(result.is_err());
        assert!(!is_notifying());
    }

    #[test]
    fn consumer_guard_clears_for_untracked_scope() {
        // With no consumer installed, swapping None is a no-op but must
        // still restore cleanly.
        {
            let _guard = ConsumerGuard::swap(None);
            assert!(!is_tracking());
        }
        assert!(!is_tracking());
    }
}
