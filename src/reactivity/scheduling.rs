// ============================================================================
// weft-signals - Effect Scheduling
// Cooperative batching of pending effect runs
// ============================================================================
//
// Effects never run inside the write that invalidated them. A write enqueues
// the effect; the queue drains when the host reaches its deferral point and
// calls flush(). Multiple writes between flushes therefore collapse into at
// most one run per effect, and that run observes the final values.
//
// The scheduler holds only weak references: it must never keep an effect
// alive after its handle is dropped.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{error, trace};

use crate::core::types::NodeId;
use crate::primitives::effect::EffectInner;

/// Scheduling hook type: invoked by an effect's `notify` with the effect to
/// enqueue. The default hook feeds the thread-local queue below; tests and
/// embedders can substitute their own.
pub type SchedulerFn = Rc<dyn Fn(Rc<EffectInner>)>;

/// Rounds of draining allowed in one flush before we assume an effect is
/// endlessly re-triggering itself.
const MAX_FLUSH_ROUNDS: u32 = 1000;

// =============================================================================
// SCHEDULER STATE
// =============================================================================

struct EffectScheduler {
    /// All known (registered, not yet destroyed) effects
    active: RefCell<Vec<Weak<EffectInner>>>,

    /// Effects pending a run, in enqueue order
    queue: RefCell<VecDeque<Weak<EffectInner>>>,

    /// Whether a flush is currently draining (reentrant flushes are no-ops)
    draining: Cell<bool>,
}

impl EffectScheduler {
    fn new() -> Self {
        Self {
            active: RefCell::new(Vec::new()),
            queue: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
        }
    }
}

thread_local! {
    static SCHEDULER: EffectScheduler = EffectScheduler::new();
}

// =============================================================================
// REGISTRATION
// =============================================================================

/// Add a newly created effect to the active set.
pub(crate) fn register(effect: &Rc<EffectInner>) {
    SCHEDULER.with(|s| {
        s.active.borrow_mut().push(Rc::downgrade(effect));
    });
}

/// Remove a destroyed effect from the active set and the pending queue.
/// Dead weak entries found along the way are dropped too.
pub(crate) fn unregister(id: NodeId) {
    SCHEDULER.with(|s| {
        let keep = |weak: &Weak<EffectInner>| match weak.upgrade() {
            Some(effect) => effect.state().id() != id,
            None => false,
        };
        s.active.borrow_mut().retain(keep);
        s.queue.borrow_mut().retain(keep);
    });
}

// =============================================================================
// ENQUEUE
// =============================================================================

/// Enqueue an effect for the next flush. This is the default scheduling
/// hook; idempotence is the caller's concern (an effect's dirty flag keeps
/// it from enqueueing twice).
pub fn enqueue(effect: Rc<EffectInner>) {
    if effect.state().log_enabled() {
        trace!(effect = effect.state().tag(), "effect enqueued");
    }
    SCHEDULER.with(|s| {
        s.queue.borrow_mut().push_back(Rc::downgrade(&effect));
    });
}

/// The default scheduling hook: enqueue into the thread-local queue.
pub fn default_scheduler() -> SchedulerFn {
    Rc::new(enqueue)
}

// =============================================================================
// FLUSH
// =============================================================================

/// Drain the pending queue, running each live, still-dirty effect in
/// enqueue order.
///
/// Effects enqueued during a round (writes from inside a callback) run in a
/// later round of the same flush, never re-entrantly. A callback panic is
/// logged and the drain continues; ambient graph state is restored by the
/// tracking guards before the panic reaches us. Calling flush from inside a
/// running effect is a no-op.
pub fn flush() {
    let already_draining = SCHEDULER.with(|s| s.draining.replace(true));
    if already_draining {
        return;
    }

    struct DrainGuard;
    impl Drop for DrainGuard {
        fn drop(&mut self) {
            SCHEDULER.with(|s| s.draining.set(false));
        }
    }
    let _guard = DrainGuard;

    let mut rounds = 0u32;
    loop {
        let batch: Vec<Weak<EffectInner>> =
            SCHEDULER.with(|s| s.queue.borrow_mut().drain(..).collect());
        if batch.is_empty() {
            break;
        }

        rounds += 1;
        if rounds > MAX_FLUSH_ROUNDS {
            panic!(
                "maximum flush depth exceeded; an effect is repeatedly \
                 re-triggering itself"
            );
        }

        for weak in batch {
            let Some(effect) = weak.upgrade() else {
                continue;
            };
            if effect.is_destroyed() || !effect.is_dirty() {
                continue;
            }

            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| effect.run())) {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(
                    effect = effect.state().tag(),
                    panic = %message,
                    "effect callback panicked; continuing flush"
                );
            }
        }
    }
}

// =============================================================================
// RESET
// =============================================================================

/// Empty the active set and the pending queue. Intended for test teardown;
/// effects themselves are untouched (their handles still own them).
pub fn reset_scheduler() {
    SCHEDULER.with(|s| {
        s.active.borrow_mut().clear();
        s.queue.borrow_mut().clear();
        s.draining.set(false);
    });
}

// =============================================================================
// TESTS
// =============================================================================
