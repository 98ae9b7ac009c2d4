// ============================================================================
// weft-signals - Signal Primitive
// The writable reactive value and its readonly view
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::core::error::SignalError;
use crate::core::types::{default_equals, EqualsFn, NodeState, Producer};
use crate::reactivity::tracking::{
    assert_writes_allowed, notify_consumers, record_access, untracked,
};

// =============================================================================
// SIGNAL INNER
// =============================================================================

/// The node behind a writable signal. A pure producer: it has no inputs and
/// never reacts to anything, so it implements only the `Producer` role.
pub struct SignalInner<T> {
    state: NodeState,

    /// The current value
    value: RefCell<T>,

    /// Equality used to coalesce writes
    equals: EqualsFn<T>,

    /// Called after a committed change has been propagated
    on_change: Option<Rc<dyn Fn(&T)>>,
}

impl<T> SignalInner<T> {
    pub fn state(&self) -> &NodeState {
        &self.state
    }

    fn read(&self) -> T
    where
        T: Clone,
    {
        self.value.borrow().clone()
    }

    fn fire_on_change(&self) {
        if let Some(on_change) = self.on_change.clone() {
            let value = self.value.borrow();
            on_change(&value);
        }
    }
}

impl<T: 'static> Producer for SignalInner<T> {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

// =============================================================================
// SIGNAL OPTIONS
// =============================================================================

/// Options accepted by [`signal_with`].
pub struct SignalOptions<T> {
    /// Debug tag; auto-generated (`signal:<n>`) when absent
    pub id: Option<String>,

    /// Emit tracing events for writes and dependency recording
    pub log: bool,

    /// Equality used to coalesce `set` calls; defaults to `PartialEq`
    pub equals: Option<EqualsFn<T>>,

    /// Invoked after a committed change, once consumers have been notified
    pub on_change: Option<Rc<dyn Fn(&T)>>,
}

impl<T> Default for SignalOptions<T> {
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
// SIGNAL<T> - The public writable handle
// =============================================================================

/// A writable reactive value.
///
/// Reading inside a memo or effect registers a dependency; writing bumps the
/// node's value version and notifies every live consumer before returning.
///
/// # Example
///
/// ```
/// use weft_signals::signal;
///
/// let count = signal(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Signal<T> {
    /// Create a signal with default options.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(value, SignalOptions::default())
    }

    /// Create a signal with explicit options. Without an `equals` override
    /// the value type must be `PartialEq` (use [`signal_with`] to supply
    /// `never_equals` for types that are not).
    pub fn with_options(value: T, options: SignalOptions<T>) -> Self
    where
        T: PartialEq,
    {
        Self::with_equals(
            value,
            options.equals.unwrap_or(default_equals::<T>),
            options.id,
            options.log,
            options.on_change,
        )
    }

    /// Create a signal with a mandatory equality function; the value type
    /// needs no `PartialEq`.
    pub fn with_equals(
        value: T,
        equals: EqualsFn<T>,
        id: Option<String>,
        log: bool,
        on_change: Option<Rc<dyn Fn(&T)>>,
    ) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                state: NodeState::new("signal", id, log),
                value: RefCell::new(value),
                equals,
                on_change,
            }),
        }
    }

    fn producer(&self) -> Rc<dyn Producer> {
        self.inner.clone()
    }

    /// Graph-level record of this node, shared with any readonly views.
    pub fn node_state(&self) -> &NodeState {
        self.inner.state()
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Read the current value, registering a dependency when a tracked
    /// computation is running.
    ///
    /// # Panics
    /// Panics if called while change notification is propagating; use
    /// [`Signal::try_get`] to handle that case as an error.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.try_get().unwrap_or_else(|err| {
            panic!("read of signal `{}` failed: {err}", self.inner.state.tag())
        })
    }

    /// Read the current value, surfacing graph errors instead of panicking.
    pub fn try_get(&self) -> Result<T, SignalError>
    where
        T: Clone,
    {
        record_access(&self.producer())?;
        Ok(self.inner.read())
    }

    /// Read through a closure without cloning the value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        if let Err(err) = record_access(&self.producer()) {
            panic!("read of signal `{}` failed: {err}", self.inner.state.tag());
        }
        f(&self.inner.value.borrow())
    }

    /// Read without recording a dependency.
    pub fn untracked_get(&self) -> T
    where
        T: Clone,
    {
        untracked(|| self.get())
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Replace the value. Equal writes (per the signal's equality function)
    /// are no-ops; otherwise consumers are notified and `on_change` fires
    /// before `set` returns. Returns whether the value changed.
    pub fn set(&self, value: T) -> bool {
        assert_writes_allowed(self.inner.state.tag());

        let changed = {
            let current = self.inner.value.borrow();
            !(self.inner.equals)(&current, &value)
        };
        if !changed {
            return false;
        }

        *self.inner.value.borrow_mut() = value;
        let version = self.inner.state.bump_value_version();

        if self.inner.state.log_enabled() {
            trace!(
                signal = self.inner.state.tag(),
                version,
                "value changed"
            );
        }

        notify_consumers(&self.inner.state);
        self.inner.fire_on_change();
        true
    }

    /// Replace the value with a function of the current value;
    /// equivalent to `set(f(&current))`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = {
            let current = self.inner.value.borrow();
            f(&current)
        };
        self.set(next)
    }

    /// Mutate the value in place. There is no equality check: the call
    /// itself is the change, so consumers are always notified. Exists so
    /// large structures need not be replaced wholesale.
    pub fn mutate(&self, f: impl FnOnce(&mut T)) {
        assert_writes_allowed(self.inner.state.tag());

        {
            let mut current = self.inner.value.borrow_mut();
            f(&mut current);
        }
        let version = self.inner.state.bump_value_version();

        if self.inner.state.log_enabled() {
            trace!(
                signal = self.inner.state.tag(),
                version,
                "value mutated"
            );
        }

        notify_consumers(&self.inner.state);
        self.inner.fire_on_change();
    }

    // =========================================================================
    // VIEWS
    // =========================================================================

    /// A read-only view over the same node. The view shares the signal's
    /// identity (id, versions, edges), so derived state memoized through it
    /// behaves exactly as if it read the signal directly.
    pub fn readonly(&self) -> ReadonlySignal<T> {
        ReadonlySignal {
            inner: self.inner.clone(),
        }
    }
}

impl<T: std::fmt::Debug + 'static> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("tag", &self.inner.state.tag())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// =============================================================================
// READONLY SIGNAL
// =============================================================================

/// Read-only adapter over a writable signal, sharing the underlying node.
pub struct ReadonlySignal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Clone for ReadonlySignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> ReadonlySignal<T> {
    fn producer(&self) -> Rc<dyn Producer> {
        self.inner.clone()
    }

    /// Graph-level record of the underlying node.
    pub fn node_state(&self) -> &NodeState {
        self.inner.state()
    }

    /// Read the current value; see [`Signal::get`].
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.try_get().unwrap_or_else(|err| {
            panic!("read of signal `{}` failed: {err}", self.inner.state.tag())
        })
    }

    /// Read the current value, surfacing graph errors.
    pub fn try_get(&self) -> Result<T, SignalError>
    where
        T: Clone,
    {
        record_access(&self.producer())?;
        Ok(self.inner.read())
    }

    /// Read through a closure without cloning the value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        if let Err(err) = record_access(&self.producer()) {
            panic!("read of signal `{}` failed: {err}", self.inner.state.tag());
        }
        f(&self.inner.value.borrow())
    }

    /// Read without recording a dependency.
    pub fn untracked_get(&self) -> T
    where
        T: Clone,
    {
        untracked(|| self.get())
    }
}

impl<T: std::fmt::Debug + 'static> std::fmt::Debug for ReadonlySignal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadonlySignal")
            .field("tag", &self.inner.state.tag())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// =============================================================================
// IS-SIGNAL PREDICATE
// =============================================================================

/// Marker for the public signal-like handles.
pub trait IsSignal {}

impl<T> IsSignal for Signal<T> {}
impl<T> IsSignal for ReadonlySignal<T> {}

/// Compile-time predicate: true for any signal-like handle.
pub fn is_signal<T: IsSignal>(_value: &T) -> bool {
    true
}

// =============================================================================
// FACTORIES
// =============================================================================

/// Create a writable signal with default options.
///
/// # Example
///
/// ```
/// use weft_signals::signal;
///
/// let name = signal(String::from("hello"));
/// name.set(String::from("world"));
/// assert_eq!(name.get(), "world");
/// ```
pub fn signal<T>(value: T) -> Signal<T>
where
    T: PartialEq + 'static,
{
    Signal::new(value)
}

/// Create a writable signal with explicit options.
///
/// # Example
///
/// ```
/// use weft_signals::{signal_with, SignalOptions};
///
/// let tagged = signal_with(
///     0,
///     SignalOptions {
///         id: Some("cursor".into()),
///         ..SignalOptions::default()
///     },
/// );
/// assert_eq!(tagged.get(), 0);
/// ```
pub fn signal_with<T>(value: T, options: SignalOptions<T>) -> Signal<T>
where
    T: PartialEq + 'static,
{
    Signal::with_options(value, options)
}

// =============================================================================
// TESTS
// =============================================================================
