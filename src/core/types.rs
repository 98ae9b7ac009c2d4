// ============================================================================
// weft-signals - Type Definitions
// The common node record, dependency edges, and the type-erased role traits
// ============================================================================
//
// Every reactive node is a common record (NodeState) plus a role:
// - Writable signals are producers only
// - Memos are both producers and consumers
// - Effects are consumers only
//
// Graph operations (edge recording, invalidation, revalidation) work purely
// through the role traits and never need to know the value type T. The
// concrete inners hold the values and implement the traits.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::context::with_context;

// =============================================================================
// IDS AND VERSIONS
// =============================================================================

/// Dense unique node identifier, monotonically assigned per thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

/// Version counter type used for both producer-side (`value_version`) and
/// consumer-side (`tracking_version`) epochs. Versions never decrease.
pub type Version = u64;

// =============================================================================
// EDGE
// =============================================================================

/// A dependency record between one producer and one consumer.
///
/// A single `Rc<Edge>` is stored in both endpoint maps, so both sides always
/// observe the same version bookkeeping. The edge owns neither endpoint:
/// both back-references are weak, and traversals prune edges whose endpoint
/// has been dropped.
pub struct Edge {
    /// The producer end (weak)
    pub producer: Weak<dyn Producer>,

    /// The consumer end (weak)
    pub consumer: Weak<dyn Consumer>,

    /// Producer id, for map keys and pruning without upgrading
    pub producer_id: NodeId,

    /// Consumer id, for map keys and pruning without upgrading
    pub consumer_id: NodeId,

    /// The producer's `value_version` at last observation
    pub producer_version_seen: Cell<Version>,

    /// The consumer's `tracking_version` when this edge was last refreshed.
    /// The edge is live iff this equals the consumer's current
    /// `tracking_version`.
    pub consumer_version_seen: Cell<Version>,
}

impl Edge {
    /// Whether this edge was refreshed during the consumer's current pass
    pub fn is_live(&self, consumer_tracking_version: Version) -> bool {
        self.consumer_version_seen.get() == consumer_tracking_version
    }
}

// =============================================================================
// NODE STATE
// =============================================================================

/// The record shared by every node variant.
///
/// Edge maps are keyed by the id of the far endpoint and iterate in
/// insertion order, which keeps notification and revalidation deterministic.
pub struct NodeState {
    id: NodeId,

    /// Debug tag ("signal:3" by default), surfaced in traces and errors
    tag: String,

    /// Whether this node emits tracing events
    log: bool,

    /// Bumped whenever this node's output value has potentially changed
    value_version: Cell<Version>,

    /// Bumped whenever this node begins a new tracking pass as a consumer
    tracking_version: Cell<Version>,

    /// Inputs this node currently depends on (consumer side)
    producers: RefCell<IndexMap<NodeId, Rc<Edge>>>,

    /// Downstream nodes currently observing this node (producer side)
    consumers: RefCell<IndexMap<NodeId, Rc<Edge>>>,
}

impl NodeState {
    /// Allocate a fresh node record. `kind` seeds the auto-generated tag
    /// ("signal", "memo", "effect"); an explicit tag wins over it.
    pub fn new(kind: &str, tag: Option<String>, log: bool) -> Self {
        let id = NodeId(with_context(|ctx| ctx.allocate_id()));
        let tag = tag.unwrap_or_else(|| format!("{}:{}", kind, id.0));
        Self {
            id,
            tag,
            log,
            value_version: Cell::new(0),
            tracking_version: Cell::new(0),
            producers: RefCell::new(IndexMap::new()),
            consumers: RefCell::new(IndexMap::new()),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn log_enabled(&self) -> bool {
        self.log
    }

    pub fn value_version(&self) -> Version {
        self.value_version.get()
    }

    /// Bump the producer-side epoch, returning the new version
    pub fn bump_value_version(&self) -> Version {
        let v = self.value_version.get() + 1;
        self.value_version.set(v);
        v
    }

    pub fn tracking_version(&self) -> Version {
        self.tracking_version.get()
    }

    /// Bump the consumer-side epoch at the start of a tracking pass
    pub fn bump_tracking_version(&self) -> Version {
        let v = self.tracking_version.get() + 1;
        self.tracking_version.set(v);
        v
    }

    // =========================================================================
    // EDGE MAP ACCESS
    //
    // Mutations happen only from this thread, but borrows must not be held
    // across user code - callers snapshot before dispatching (see tracking).
    // =========================================================================

    pub fn producer_edge(&self, id: NodeId) -> Option<Rc<Edge>> {
        self.producers.borrow().get(&id).cloned()
    }

    pub fn insert_producer_edge(&self, edge: Rc<Edge>) {
        self.producers.borrow_mut().insert(edge.producer_id, edge);
    }

    pub fn remove_producer_edge(&self, id: NodeId) {
        self.producers.borrow_mut().shift_remove(&id);
    }

    pub fn insert_consumer_edge(&self, edge: Rc<Edge>) {
        self.consumers.borrow_mut().insert(edge.consumer_id, edge);
    }

    pub fn remove_consumer_edge(&self, id: NodeId) {
        self.consumers.borrow_mut().shift_remove(&id);
    }

    /// Snapshot the consumer edges for iteration outside the borrow
    pub fn consumer_edges(&self) -> Vec<Rc<Edge>> {
        self.consumers.borrow().values().cloned().collect()
    }

    /// Snapshot the producer edges for iteration outside the borrow
    pub fn producer_edges(&self) -> Vec<Rc<Edge>> {
        self.producers.borrow().values().cloned().collect()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.borrow().len()
    }

    pub fn producer_count(&self) -> usize {
        self.producers.borrow().len()
    }
}

// =============================================================================
// ROLE TRAITS
// =============================================================================

/// Type-erased producer interface.
///
/// Implemented by `SignalInner<T>` and `MemoInner<T>`. Enables storing the
/// producer end of an edge without knowing the value type.
pub trait Producer: Any {
    /// The node's common record
    fn state(&self) -> &NodeState;

    /// Ask the producer whether its value has changed relative to a version
    /// a consumer previously observed. The producer validates itself first
    /// if it is lazily computed (memos recompute here when stale).
    fn value_changed_since(&self, seen: Version) -> bool {
        self.state().value_version() != seen
    }

    /// Upcast for downcasting in diagnostics and tests
    fn as_any(&self) -> &dyn Any;
}

/// Type-erased consumer interface.
///
/// Implemented by `MemoInner<T>` and `EffectInner`. A consumer is anything
/// that can be told "an input of yours may have changed".
pub trait Consumer: Any {
    /// The node's common record
    fn state(&self) -> &NodeState;

    /// Push-phase hook: a live input's value may have changed.
    /// Memos mark themselves stale and cascade; effects schedule a run.
    /// It is an error to read any signal from inside this dispatch.
    fn on_dependency_change(&self);

    /// Upcast for downcasting in diagnostics and tests
    fn as_any(&self) -> &dyn Any;
}

// =============================================================================
// EQUALITY
// =============================================================================

/// Equality function type for coalescing writes and recomputations
pub type EqualsFn<T> = fn(&T, &T) -> bool;

/// Default equality using PartialEq
pub fn default_equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

// =============================================================================
// TESTS
// =============================================================================
