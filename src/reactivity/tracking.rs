// ============================================================================
// weft-signals - Dependency Tracking
// The kernel operations every node variant is built on
// ============================================================================
//
// Reads flow downward: a producer's read path calls record_access, which
// registers an edge to the ambient active consumer. Invalidation flows
// upward: a producer whose value_version bumped calls notify_consumers,
// which walks its live edges and dispatches on_dependency_change.
//
// Borrow discipline: edge maps live in RefCells, and notification dispatch
// runs arbitrary node code, so every traversal snapshots the map first and
// mutates after the borrow is released (collect-then-mutate).
// ============================================================================

use std::cell::Cell;
use std::rc::Rc;

use tracing::trace;

use crate::core::context::{with_context, ActiveConsumer, ConsumerGuard, NotifyGuard};
use crate::core::error::SignalError;
use crate::core::types::{Consumer, Edge, NodeState, Producer};

// =============================================================================
// RECORD ACCESS - Register a dependency when a producer is read
// =============================================================================

/// Fail fast when a read is attempted while notification is propagating.
///
/// Lazily computed producers call this before validating, so a forbidden
/// read never gets far enough to run (and cache) a computation.
pub fn ensure_not_notifying() -> Result<(), SignalError> {
    with_context(|ctx| {
        if ctx.is_notifying() {
            Err(SignalError::ReadDuringNotify)
        } else {
            Ok(())
        }
    })
}

/// Record a read of a producer, registering an edge to the active consumer.
///
/// Called by every producer's read path after any internal validation.
/// Reads during notification are rejected; reads with no active consumer
/// are untracked and record nothing.
pub fn record_access(producer: &Rc<dyn Producer>) -> Result<(), SignalError> {
    let active = with_context(|ctx| {
        if ctx.is_notifying() {
            return Err(SignalError::ReadDuringNotify);
        }
        Ok(ctx.active_consumer())
    })?;

    let Some(active) = active else {
        return Ok(());
    };
    let Some(consumer) = active.node.upgrade() else {
        return Ok(());
    };

    let producer_state = producer.state();
    let consumer_state = consumer.state();
    let producer_id = producer_state.id();

    match consumer_state.producer_edge(producer_id) {
        Some(edge) => {
            // Refresh the existing edge for the current tracking pass
            edge.producer_version_seen.set(producer_state.value_version());
            edge.consumer_version_seen.set(consumer_state.tracking_version());
            // The producer side may have pruned this edge while it was
            // stale; re-mirror so both endpoints agree.
            producer_state.insert_consumer_edge(edge);
        }
        None => {
            let edge = Rc::new(Edge {
                producer: Rc::downgrade(producer),
                consumer: active.node.clone(),
                producer_id,
                consumer_id: consumer_state.id(),
                producer_version_seen: Cell::new(producer_state.value_version()),
                consumer_version_seen: Cell::new(consumer_state.tracking_version()),
            });
            consumer_state.insert_producer_edge(edge.clone());
            producer_state.insert_consumer_edge(edge);
        }
    }

    if producer_state.log_enabled() {
        trace!(
            producer = producer_state.tag(),
            consumer = consumer_state.tag(),
            "dependency recorded"
        );
    }

    Ok(())
}

// =============================================================================
// NOTIFY CONSUMERS - Push invalidation downstream
// =============================================================================

/// Tell every live consumer of a producer that its value may have changed.
///
/// Dead and stale edges encountered along the way are pruned from both
/// endpoints. The notifying flag is raised for the whole pass, so any read
/// attempted from inside a dispatch fails with `ReadDuringNotify`.
pub fn notify_consumers(state: &NodeState) {
    let _guard = NotifyGuard::enter();

    if state.log_enabled() {
        trace!(
            producer = state.tag(),
            consumers = state.consumer_count(),
            "notifying consumers"
        );
    }

    for edge in state.consumer_edges() {
        match edge.consumer.upgrade() {
            None => {
                state.remove_consumer_edge(edge.consumer_id);
            }
            Some(consumer) => {
                let consumer_state = consumer.state();
                if !edge.is_live(consumer_state.tracking_version()) {
                    state.remove_consumer_edge(edge.consumer_id);
                    consumer_state.remove_producer_edge(edge.producer_id);
                } else {
                    consumer.on_dependency_change();
                }
            }
        }
    }
}

// =============================================================================
// DEPENDENCIES CHANGED - Pull validation upstream
// =============================================================================

/// Ask whether any input of a consumer has actually advanced since its
/// last tracking pass.
///
/// Each producer validates itself before answering (lazily computed
/// producers recompute here), so a stale-but-unchanged chain reports false
/// and the consumer can skip its own re-run. Returns at the first change.
pub fn dependencies_changed(state: &NodeState) -> bool {
    for edge in state.producer_edges() {
        if !edge.is_live(state.tracking_version()) {
            state.remove_producer_edge(edge.producer_id);
            if let Some(producer) = edge.producer.upgrade() {
                producer.state().remove_consumer_edge(edge.consumer_id);
            }
            continue;
        }

        match edge.producer.upgrade() {
            None => {
                state.remove_producer_edge(edge.producer_id);
            }
            Some(producer) => {
                if producer.value_changed_since(edge.producer_version_seen.get()) {
                    if state.log_enabled() {
                        trace!(
                            consumer = state.tag(),
                            producer = producer.state().tag(),
                            "dependency changed"
                        );
                    }
                    return true;
                }
            }
        }
    }
    false
}

// =============================================================================
// TRACKED AND UNTRACKED SCOPES
// =============================================================================

/// Run a consumer's computation as a new tracking pass.
///
/// Bumps the consumer's `tracking_version` (invalidating every edge from the
/// previous pass) and installs it as the ambient active consumer for the
/// duration; producers touched by `f` refresh or create their edges, and
/// producers not touched are left stale for lazy pruning.
pub fn run_tracked<R>(
    consumer: &Rc<dyn Consumer>,
    writes_allowed: bool,
    f: impl FnOnce() -> R,
) -> R {
    consumer.state().bump_tracking_version();
    let _guard = ConsumerGuard::swap(Some(ActiveConsumer {
        node: Rc::downgrade(consumer),
        writes_allowed,
    }));
    f()
}

/// Run `f` with no active consumer: reads inside record no dependencies.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = ConsumerGuard::swap(None);
    f()
}

// =============================================================================
// DISCONNECT - Remove a consumer from all of its inputs
// =============================================================================

/// Drop every producer edge of a consumer, on both sides.
/// Used when an effect is destroyed.
pub fn disconnect(state: &NodeState) {
    for edge in state.producer_edges() {
        if let Some(producer) = edge.producer.upgrade() {
            producer.state().remove_consumer_edge(edge.consumer_id);
        }
        state.remove_producer_edge(edge.producer_id);
    }
}

// =============================================================================
// WRITE PERMISSION
// =============================================================================

/// Reject writes from computations that must stay pure.
///
/// Memo computations never write; effect callbacks write only when created
/// with `allow_signal_writes`. Untracked scopes clear the active consumer,
/// so writes inside `untracked` are always permitted.
pub fn assert_writes_allowed(tag: &str) {
    let forbidden = with_context(|ctx| {
        matches!(ctx.active_consumer(), Some(active) if !active.writes_allowed)
    });
    if forbidden {
        panic!(
            "cannot write to signal `{tag}` from inside a tracked computation; \
             memo computations are pure, and effects must opt in with \
             `allow_signal_writes`"
        );
    }
}

// =============================================================================
// TESTS
// =============================================================================
