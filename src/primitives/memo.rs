// ============================================================================
// weft-signals - Memoized Signals
// Lazily computed values that cache until their inputs actually change
// ============================================================================
//
// A memo is BOTH a producer (to its readers) and a consumer (of its inputs).
// Invalidation is push-based and cheap: an upstream change only marks the
// memo stale and cascades. Validation is pull-based and precise: a read
// compares per-edge versions, so a stale-but-unchanged chain never
// recomputes and equal recomputations never propagate downstream.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::core::error::SignalError;
use crate::core::types::{default_equals, Consumer, EqualsFn, NodeState, Producer, Version};
use crate::reactivity::tracking::{
    dependencies_changed, ensure_not_notifying, notify_consumers, record_access, run_tracked,
    untracked,
};

// =============================================================================
// CACHE STATE
// =============================================================================

/// The cache of a memoized signal.
pub enum MemoState<T> {
    /// Never computed
    Unset,

    /// A computation is in flight; reading now is a cycle
    Computing,

    /// A successfully computed value
    Value(T),

    /// The computation failed; the error is returned from every read until
    /// a dependency change forces recomputation
    Failed(SignalError),
}

// =============================================================================
// MEMO INNER
// =============================================================================

/// The node behind a memoized signal. Implements both roles: `Producer`
/// toward its readers and `Consumer` toward its inputs.
pub struct MemoInner<T> {
    state: NodeState,

    /// The user computation
    compute: Box<dyn Fn() -> Result<T, SignalError>>,

    cache: RefCell<MemoState<T>>,

    /// Whether the cache may not reflect current inputs
    stale: Cell<bool>,

    /// Equality used to coalesce recomputations
    equals: EqualsFn<T>,

    /// Called after a committed value change
    on_change: Option<Rc<dyn Fn(&T)>>,

    /// Weak self-reference so `&self` trait methods can re-enter tracked
    /// computations that need an `Rc<dyn Consumer>`
    self_ref: RefCell<Weak<MemoInner<T>>>,
}

impl<T: Clone + 'static> MemoInner<T> {
    fn new(
        compute: Box<dyn Fn() -> Result<T, SignalError>>,
        equals: EqualsFn<T>,
        id: Option<String>,
        log: bool,
        on_change: Option<Rc<dyn Fn(&T)>>,
    ) -> Rc<Self> {
        let inner = Rc::new(Self {
            state: NodeState::new("memo", id, log),
            compute,
            cache: RefCell::new(MemoState::Unset),
            stale: Cell::new(true),
            equals,
            on_change,
            self_ref: RefCell::new(Weak::new()),
        });
        *inner.self_ref.borrow_mut() = Rc::downgrade(&inner);
        inner
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// Pull-phase revalidation: make the cache current.
    ///
    /// Cheap exit when not stale; when stale but every input reports
    /// "unchanged" (per-edge version comparison), the cached value is kept
    /// without recomputing.
    fn validate(&self) -> Result<(), SignalError> {
        if !self.stale.get() {
            return Ok(());
        }

        let has_value = matches!(*self.cache.borrow(), MemoState::Value(_));
        if has_value && !dependencies_changed(&self.state) {
            // Inputs were re-examined but none actually advanced
            self.stale.set(false);
            return Ok(());
        }

        self.recompute()
    }

    /// Run the user computation as a fresh tracking pass and commit the
    /// result.
    fn recompute(&self) -> Result<(), SignalError> {
        if matches!(*self.cache.borrow(), MemoState::Computing) {
            return Err(SignalError::Cycle {
                tag: self.state.tag().to_string(),
            });
        }

        // The tracked pass needs this node as an Rc<dyn Consumer>; a failed
        // upgrade means the memo is mid-drop and nothing can observe it.
        let Some(this) = self.self_ref.borrow().upgrade() else {
            return Ok(());
        };

        let prev = self.cache.replace(MemoState::Computing);

        // If the computation unwinds, put the previous cache back and leave
        // the memo stale so a later read retries.
        struct ComputeGuard<'a, T> {
            cache: &'a RefCell<MemoState<T>>,
            stale: &'a Cell<bool>,
            prev: Option<MemoState<T>>,
        }

        impl<T> ComputeGuard<'_, T> {
            fn defuse(mut self) -> MemoState<T> {
                let prev = self.prev.take().expect("guard defused twice");
                std::mem::forget(self);
                prev
            }
        }

        impl<T> Drop for ComputeGuard<'_, T> {
            fn drop(&mut self) {
                if let Some(prev) = self.prev.take() {
                    self.cache.replace(prev);
                    self.stale.set(true);
                }
            }
        }

        let guard = ComputeGuard {
            cache: &self.cache,
            stale: &self.stale,
            prev: Some(prev),
        };

        let consumer: Rc<dyn Consumer> = this;
        let outcome = run_tracked(&consumer, false, || (self.compute)());
        let prev = guard.defuse();

        match outcome {
            Ok(next) => {
                if let MemoState::Value(old) = &prev {
                    if (self.equals)(old, &next) {
                        // Equal recomputation: keep the old value and do NOT
                        // bump the version, so downstream stays quiet
                        if self.state.log_enabled() {
                            trace!(memo = self.state.tag(), "recomputed equal value");
                        }
                        self.cache.replace(prev);
                        self.stale.set(false);
                        return Ok(());
                    }
                }

                self.cache.replace(MemoState::Value(next));
                let version = self.state.bump_value_version();
                self.stale.set(false);

                if self.state.log_enabled() {
                    trace!(memo = self.state.tag(), version, "recomputed");
                }

                if let Some(on_change) = self.on_change.clone() {
                    if let MemoState::Value(value) = &*self.cache.borrow() {
                        on_change(value);
                    }
                }
            }
            Err(err) => {
                // Cache the failure; readers see it until an input changes
                self.cache.replace(MemoState::Failed(err));
                self.state.bump_value_version();
                self.stale.set(false);

                if self.state.log_enabled() {
                    trace!(memo = self.state.tag(), "computation failed");
                }
            }
        }

        Ok(())
    }

    fn read_cache(&self) -> Result<T, SignalError> {
        match &*self.cache.borrow() {
            MemoState::Value(value) => Ok(value.clone()),
            MemoState::Failed(err) => Err(err.clone()),
            MemoState::Unset | MemoState::Computing => {
                unreachable!("memo cache is populated by validate before reads")
            }
        }
    }
}

// =============================================================================
// ROLE IMPLEMENTATIONS
// =============================================================================

impl<T: Clone + 'static> Producer for MemoInner<T> {
    fn state(&self) -> &NodeState {
        &self.state
    }

    /// The downstream freshness gate. A plain version compare answers most
    /// calls; when versions match but this memo is stale, it validates
    /// itself first (possibly recomputing) and compares again, so an
    /// unchanged recomputation reports "unchanged" to the asker.
    fn value_changed_since(&self, seen: Version) -> bool {
        if self.state.value_version() != seen {
            return true;
        }
        if self.validate().is_err() {
            // Let the asker re-run and surface the error on its own read
            return true;
        }
        self.state.value_version() != seen
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T: Clone + 'static> Consumer for MemoInner<T> {
    fn state(&self) -> &NodeState {
        &self.state
    }

    /// Push-phase hook: an input may have changed. Marking stale is
    /// idempotent; the first mark cascades to this memo's own consumers.
    fn on_dependency_change(&self) {
        if self.stale.get() {
            return;
        }
        self.stale.set(true);
        notify_consumers(&self.state);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// MEMO OPTIONS
// =============================================================================

/// Options accepted by [`memo_with`].
pub struct MemoOptions<T> {
    /// Debug tag; auto-generated (`memo:<n>`) when absent
    pub id: Option<String>,

    /// Emit tracing events for recomputations
    pub log: bool,

    /// Equality used to coalesce recomputations; defaults to `PartialEq`
    pub equals: Option<EqualsFn<T>>,

    /// Invoked after a committed value change
    pub on_change: Option<Rc<dyn Fn(&T)>>,
}

impl<T> Default for MemoOptions<T> {
    fn default() -> Self {
        Self {
            id: None,
            log: false,
            equals: None,
            on_change: None,
        }
    }
}

// =============================================================================
// MEMO<T> - The public handle
// =============================================================================

/// A memoized (derived) signal.
///
/// Lazy: nothing computes until the first read. Cached: repeated reads
/// return the stored value. Precise: after upstream writes, a read
/// recomputes only when some input's value actually advanced, and an equal
/// recomputation is invisible downstream.
///
/// # Example
///
/// ```
/// use weft_signals::{memo, signal};
///
/// let count = signal(1);
/// let doubled = memo({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 2);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T> {
    inner: Rc<MemoInner<T>>,
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Memo<T> {
    fn producer(&self) -> Rc<dyn Producer> {
        self.inner.clone()
    }

    /// Graph-level record of this node.
    pub fn node_state(&self) -> &NodeState {
        self.inner.state()
    }

    /// Read the memo, recomputing first if an input actually changed.
    ///
    /// # Panics
    /// Panics on a dependency cycle, on a cached computation failure, or if
    /// called while change notification is propagating. Use
    /// [`Memo::try_get`] to handle those as errors.
    pub fn get(&self) -> T {
        self.try_get().unwrap_or_else(|err| {
            panic!("read of memo `{}` failed: {err}", self.inner.state.tag())
        })
    }

    /// Read the memo, surfacing cycles, cached failures, and
    /// read-during-notify as errors.
    pub fn try_get(&self) -> Result<T, SignalError> {
        ensure_not_notifying()?;
        self.inner.validate()?;
        record_access(&self.producer())?;
        self.inner.read_cache()
    }

    /// Read without recording a dependency.
    pub fn untracked_get(&self) -> T {
        untracked(|| self.get())
    }

    /// Fallible read without recording a dependency.
    pub fn try_untracked_get(&self) -> Result<T, SignalError> {
        untracked(|| self.try_get())
    }
}

impl<T: Clone + 'static> super::signal::IsSignal for Memo<T> {}

impl<T: std::fmt::Debug + Clone + 'static> std::fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = match &*self.inner.cache.borrow() {
            MemoState::Value(v) => format!("{v:?}"),
            MemoState::Failed(e) => format!("<failed: {e}>"),
            MemoState::Unset => "<unset>".to_string(),
            MemoState::Computing => "<computing>".to_string(),
        };
        f.debug_struct("Memo")
            .field("tag", &self.inner.state.tag())
            .field("cached", &cached)
            .field("stale", &self.inner.stale.get())
            .finish()
    }
}

// =============================================================================
// FACTORIES
// =============================================================================

/// Create a memoized signal from an infallible computation.
pub fn memo<T, F>(compute: F) -> Memo<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    memo_with(compute, MemoOptions::default())
}

/// Create a memoized signal with explicit options.
///
/// # Example
///
/// ```
/// use weft_signals::{memo_with, signal, MemoOptions};
///
/// let level = signal(1);
/// // "high water mark": recomputations that do not exceed the cached
/// // value are treated as equal and stay invisible downstream
/// let peak = memo_with(
///     {
///         let level = level.clone();
///         move || level.get()
///     },
///     MemoOptions {
///         equals: Some(|old: &i32, new: &i32| new <= old),
///         ..MemoOptions::default()
///     },
/// );
///
/// assert_eq!(peak.get(), 1);
/// level.set(4);
/// assert_eq!(peak.get(), 4);
/// level.set(2);
/// assert_eq!(peak.get(), 4);
/// ```
pub fn memo_with<T, F>(compute: F, options: MemoOptions<T>) -> Memo<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    Memo {
        inner: MemoInner::new(
            Box::new(move || Ok(compute())),
            options.equals.unwrap_or(default_equals::<T>),
            options.id,
            options.log,
            options.on_change,
        ),
    }
}

/// Create a memoized signal from a fallible computation.
///
/// A returned error is cached exactly like a value: every read yields it
/// until a dependency change forces recomputation. Use
/// [`SignalError::computation`] to wrap arbitrary error types.
pub fn fallible_memo<T, F>(compute: F) -> Memo<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> Result<T, SignalError> + 'static,
{
    Memo {
        inner: MemoInner::new(
            Box::new(compute),
            default_equals::<T>,
            None,
            false,
            None,
        ),
    }
}

// =============================================================================
// TESTS
// =============================================================================
