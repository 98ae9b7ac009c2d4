// ============================================================================
// weft-signals - Effect System
// Consumer-only nodes that re-run a side effect when their inputs change
// ============================================================================
//
// An effect never produces a value; it exists for its side effects. A
// dependency change does not run the callback synchronously - it hands the
// effect to its scheduling hook, and the callback runs at the next flush.
// Between enqueue and run the effect is "dirty", which collapses any number
// of further notifications into the single queued run.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::core::types::{Consumer, NodeState};
use crate::reactivity::scheduling::{self, default_scheduler, SchedulerFn};
use crate::reactivity::tracking::{dependencies_changed, disconnect, run_tracked, untracked};

// =============================================================================
// TYPE ALIASES
// =============================================================================

/// Cleanup function returned by a callback; runs before the next run and on
/// destruction
pub type CleanupFn = Box<dyn FnOnce()>;

/// Effect callback signature - optionally returns a cleanup
pub type EffectFn = Box<dyn FnMut() -> Option<CleanupFn>>;

// =============================================================================
// EFFECT INNER
// =============================================================================

/// The node behind an effect. A pure consumer: nothing observes it, so it
/// implements only the `Consumer` role.
pub struct EffectInner {
    state: NodeState,

    /// Set at birth and on every notification; cleared when a run starts
    dirty: Cell<bool>,

    destroyed: Cell<bool>,

    /// The user callback; dropped on destruction
    callback: RefCell<Option<EffectFn>>,

    /// Cleanup from the previous run, if any
    cleanup: RefCell<Option<CleanupFn>>,

    /// Scheduling hook invoked by `notify`
    scheduler: SchedulerFn,

    /// Whether the callback may write signals
    allow_writes: bool,

    /// Weak self-reference so `&self` trait methods can reach `Rc<Self>`
    self_weak: RefCell<Weak<EffectInner>>,
}

impl EffectInner {
    fn new(callback: EffectFn, options: EffectOptions) -> Rc<Self> {
        let effect = Rc::new(Self {
            state: NodeState::new("effect", options.id, options.log),
            dirty: Cell::new(true),
            destroyed: Cell::new(false),
            callback: RefCell::new(Some(callback)),
            cleanup: RefCell::new(None),
            scheduler: options.scheduler.unwrap_or_else(default_scheduler),
            allow_writes: options.allow_signal_writes,
            self_weak: RefCell::new(Weak::new()),
        });
        *effect.self_weak.borrow_mut() = Rc::downgrade(&effect);
        effect
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Request a run. Enqueues through the scheduling hook only when not
    /// already dirty, so reentrant notifications collapse into one queued
    /// run; the dirty flag is set after scheduling for the same reason.
    pub fn notify(&self) {
        if self.destroyed.get() {
            return;
        }
        if !self.dirty.get() {
            if let Some(this) = self.self_weak.borrow().upgrade() {
                (self.scheduler)(this);
            }
        }
        self.dirty.set(true);
    }

    /// Run the callback if some input actually changed.
    ///
    /// The first run is unconditional (the effect has no edges yet). Later
    /// runs revalidate by version comparison first, so an enqueue caused by
    /// an upstream change that coalesced away is a no-op.
    pub fn run(&self) {
        if self.destroyed.get() {
            return;
        }
        self.dirty.set(false);

        if self.state.tracking_version() != 0 && !dependencies_changed(&self.state) {
            if self.state.log_enabled() {
                trace!(effect = self.state.tag(), "run skipped, inputs unchanged");
            }
            return;
        }

        if self.state.log_enabled() {
            trace!(effect = self.state.tag(), "running");
        }

        let Some(this) = self.self_weak.borrow().upgrade() else {
            return;
        };
        let consumer: Rc<dyn Consumer> = this;
        run_tracked(&consumer, self.allow_writes, || {
            // The previous run's cleanup goes first, untracked so its reads
            // never become dependencies of this pass
            if let Some(cleanup) = self.cleanup.borrow_mut().take() {
                untracked(cleanup);
            }

            let next_cleanup = {
                let mut callback = self.callback.borrow_mut();
                match callback.as_mut() {
                    Some(f) => f(),
                    None => None,
                }
            };
            *self.cleanup.borrow_mut() = next_cleanup;
        });
    }

    /// Tear the effect down: run its current cleanup, drop its edges, and
    /// remove it from the scheduler. Idempotent; later notifications are
    /// ignored.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }

        if self.state.log_enabled() {
            trace!(effect = self.state.tag(), "destroyed");
        }

        if let Some(cleanup) = self.cleanup.borrow_mut().take() {
            untracked(cleanup);
        }
        *self.callback.borrow_mut() = None;
        disconnect(&self.state);
        scheduling::unregister(self.state.id());
    }
}

impl Consumer for EffectInner {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn on_dependency_change(&self) {
        self.notify();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        // A dropped-but-never-destroyed effect still owes its cleanup
        if let Some(cleanup) = self.cleanup.borrow_mut().take() {
            cleanup();
        }
    }
}

// =============================================================================
// EFFECT OPTIONS
// =============================================================================

/// Options accepted by [`effect_with`].
pub struct EffectOptions {
    /// Debug tag; auto-generated (`effect:<n>`) when absent
    pub id: Option<String>,

    /// Emit tracing events for runs and destruction
    pub log: bool,

    /// Permit signal writes from inside the callback
    pub allow_signal_writes: bool,

    /// Scheduling hook; defaults to the thread-local queue
    pub scheduler: Option<SchedulerFn>,
}

impl Default for EffectOptions {
    fn default() -> Self {
        Self {
            id: None,
            log: false,
            allow_signal_writes: false,
            scheduler: None,
        }
    }
}

// =============================================================================
// EFFECT - The public handle
// =============================================================================

/// Handle to a running effect.
///
/// The handle owns the effect: dropping the last clone destroys it (running
/// its cleanup), and [`Effect::destroy`] tears it down explicitly.
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    fn from_inner(inner: Rc<EffectInner>) -> Self {
        Self { inner }
    }

    /// Graph-level record of this node.
    pub fn node_state(&self) -> &NodeState {
        self.inner.state()
    }

    /// Whether the effect has been torn down.
    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// Tear the effect down now: runs the current cleanup, drops its
    /// dependency edges, and removes any queued run.
    pub fn destroy(&self) {
        self.inner.destroy();
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        // The scheduler holds only weak references, so a strong count of one
        // means this handle was the last owner.
        if Rc::strong_count(&self.inner) == 1 {
            self.inner.destroy();
        }
    }
}

// =============================================================================
// FACTORIES
// =============================================================================

/// Create an effect. The callback runs at the next flush and again after
/// any tracked input changes.
///
/// # Example
///
/// ```
/// use weft_signals::{effect, flush, signal};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let count = signal(0);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let _e = effect({
///     let count = count.clone();
///     let seen = seen.clone();
///     move || seen.borrow_mut().push(count.get())
/// });
///
/// flush();
/// count.set(1);
/// count.set(2);
/// flush();
///
/// // The two writes coalesced into one run observing the final value
/// assert_eq!(*seen.borrow(), vec![0, 2]);
/// ```
pub fn effect<F>(mut callback: F) -> Effect
where
    F: FnMut() + 'static,
{
    effect_with(
        move || {
            callback();
            None
        },
        EffectOptions::default(),
    )
}

/// Create an effect whose callback returns an optional cleanup. The cleanup
/// runs before the next run and on destruction.
pub fn effect_with_cleanup<F>(callback: F) -> Effect
where
    F: FnMut() -> Option<CleanupFn> + 'static,
{
    effect_with(callback, EffectOptions::default())
}

/// Create an effect with explicit options.
pub fn effect_with<F>(callback: F, options: EffectOptions) -> Effect
where
    F: FnMut() -> Option<CleanupFn> + 'static,
{
    let inner = EffectInner::new(Box::new(callback), options);
    scheduling::register(&inner);

    // Dirty at birth: enqueue immediately so the first run lands in the
    // next flush
    (inner.scheduler)(inner.clone());

    Effect::from_inner(inner)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{flush, signal};
    use std::cell::Cell;

    #[test]
    fn first_run_happens_at_next_flush() {
        let runs = Rc::new(Cell::new(0));

        let runs_clone = runs.clone();
        let _e = effect(move || {
            runs_clone.set(runs_clone.get() + 1);
        });

        assert_eq!(runs.get(), 0);
        flush();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn reruns_when_tracked_input_changes() {
        let count = signal(0);
        let runs = Rc::new(Cell::new(0));

        let runs_clone = runs.clone();
        let count_clone = count.clone();
        let _e = effect(move || {
            let _ = count_clone.get();
            runs_clone.set(runs_clone.get() + 1);
        });

        flush();
        assert_eq!(runs.get(), 1);

        count.set(1);
        flush();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn coalesced_writes_produce_one_run() {
        let count = signal(0);
        let runs = Rc::new(Cell::new(0));

        let runs_clone = runs.clone();
        let count_clone = count.clone();
        let _e = effect(move || {
            let _ = count_clone.get();
            runs_clone.set(runs_clone.get() + 1);
        });

        flush();
        count.set(1);
        count.set(2);
        count.set(3);
        flush();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn enqueued_run_skips_when_memo_coalesced_the_change() {
        use crate::memo;

        let level = signal(0);
        let clamped = memo({
            let level = level.clone();
            move || level.get().clamp(0, 10)
        });

        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let clamped_clone = clamped.clone();
        let _e = effect(move || {
            let _ = clamped_clone.get();
            runs_clone.set(runs_clone.get() + 1);
        });

        flush();
        assert_eq!(runs.get(), 1);

        // The memo recomputes to an equal value, so the effect's run is
        // revalidated away
        level.set(-5);
        flush();
        assert_eq!(runs.get(), 1);

        level.set(3);
        flush();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn cleanup_runs_before_next_run_and_on_destroy() {
        let count = signal(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let log_clone = log.clone();
        let count_clone = count.clone();
        let handle = effect_with_cleanup(move || {
            let n = count_clone.get();
            log_clone.borrow_mut().push(format!("run {n}"));
            let log_inner = log_clone.clone();
            Some(Box::new(move || {
                log_inner.borrow_mut().push(format!("cleanup {n}"));
            }) as CleanupFn)
        });

        flush();
        count.set(1);
        flush();
        handle.destroy();

        assert_eq!(
            *log.borrow(),
            vec!["run 0", "cleanup 0", "run 1", "cleanup 1"]
        );
    }

    #[test]
    fn destroyed_effect_ignores_notifications() {
        let count = signal(0);
        let runs = Rc::new(Cell::new(0));

        let runs_clone = runs.clone();
        let count_clone = count.clone();
        let handle = effect(move || {
            let _ = count_clone.get();
            runs_clone.set(runs_clone.get() + 1);
        });

        flush();
        assert_eq!(runs.get(), 1);

        handle.destroy();
        count.set(1);
        flush();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn dropping_last_handle_destroys() {
        let count = signal(0);
        let runs = Rc::new(Cell::new(0));

        {
            let runs_clone = runs.clone();
            let count_clone = count.clone();
            let _e = effect(move || {
                let _ = count_clone.get();
                runs_clone.set(runs_clone.get() + 1);
            });
            flush();
            assert_eq!(runs.get(), 1);
            // handle drops here
        }

        count.set(1);
        flush();
        assert_eq!(runs.get(), 1, "a dropped effect must not run again");
        assert_eq!(count.node_state().consumer_count(), 0);
    }

    #[test]
    fn writes_require_opt_in() {
        let victim = signal(0);

        // Without allow_signal_writes the write panics; the flush logs the
        // panic and carries on
        let victim_clone = victim.clone();
        let _bad = effect(move || {
            victim_clone.set(1);
        });
        flush();
        assert_eq!(victim.untracked_get(), 0);

        // With the opt-in the write lands
        let victim_clone = victim.clone();
        let _good = effect_with(
            move || {
                victim_clone.set(2);
                None
            },
            EffectOptions {
                allow_signal_writes: true,
                ..EffectOptions::default()
            },
        );
        flush();
        assert_eq!(victim.untracked_get(), 2);
    }

    #[test]
    fn writes_from_effect_land_in_the_same_flush_later_round() {
        let a = signal(0);
        let b = signal(0);
        let b_runs = Rc::new(Cell::new(0));

        // First effect forwards a into b
        let a_clone = a.clone();
        let b_clone = b.clone();
        let _forward = effect_with(
            move || {
                b_clone.set(a_clone.get() * 10);
                None
            },
            EffectOptions {
                allow_signal_writes: true,
                ..EffectOptions::default()
            },
        );

        // Second effect observes b
        let b_clone = b.clone();
        let b_runs_clone = b_runs.clone();
        let _observe = effect(move || {
            let _ = b_clone.get();
            b_runs_clone.set(b_runs_clone.get() + 1);
        });

        flush();
        let after_setup = b_runs.get();

        a.set(4);
        flush();
        assert_eq!(b.untracked_get(), 40);
        assert_eq!(b_runs.get(), after_setup + 1);
    }

    #[test]
    fn custom_scheduler_hook_receives_the_effect() {
        // A private queue standing in for a host runtime's deferral point
        let pending: Rc<RefCell<Vec<Rc<EffectInner>>>> = Rc::new(RefCell::new(Vec::new()));

        let pending_clone = pending.clone();
        let hook: SchedulerFn = Rc::new(move |effect: Rc<EffectInner>| {
            pending_clone.borrow_mut().push(effect);
        });

        let count = signal(0);
        let runs = Rc::new(Cell::new(0));

        let runs_clone = runs.clone();
        let count_clone = count.clone();
        let _e = effect_with(
            move || {
                let _ = count_clone.get();
                runs_clone.set(runs_clone.get() + 1);
                None
            },
            EffectOptions {
                scheduler: Some(hook),
                ..EffectOptions::default()
            },
        );

        // The creation enqueue went through the hook, not the global queue
        assert_eq!(pending.borrow().len(), 1);
        assert_eq!(runs.get(), 0);

        let batch: Vec<_> = pending.borrow_mut().drain(..).collect();
        for effect in batch {
            effect.run();
        }
        assert_eq!(runs.get(), 1);

        count.set(1);
        assert_eq!(pending.borrow().len(), 1);
        let batch: Vec<_> = pending.borrow_mut().drain(..).collect();
        for effect in batch {
            effect.run();
        }
        assert_eq!(runs.get(), 2);
    }
}
