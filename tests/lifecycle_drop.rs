// Drop semantics: nodes disappear from the graph when their handles do.

use std::cell::Cell;
use std::rc::Rc;

use weft_signals::{effect, effect_with_cleanup, flush, memo, signal, CleanupFn};

#[test]
fn effect_drop_runs_cleanup() {
    let cleaned = Rc::new(Cell::new(false));
    let cleaned_clone = cleaned.clone();

    {
        let _e = effect_with_cleanup(move || {
            let cleaned_inner = cleaned_clone.clone();
            Some(Box::new(move || cleaned_inner.set(true)) as CleanupFn)
        });
        flush();
        // _e drops here: the last handle destroys the effect
    }

    assert!(cleaned.get(), "dropping the handle must run the cleanup");
}

#[test]
fn dropped_effect_stops_reacting() {
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
    }

    count.set(1);
    flush();
    assert_eq!(runs.get(), 1);
}

#[test]
fn dropped_memo_leaves_no_trace_upstream() {
    let base = signal(0);

    {
        let doubled = memo({
            let base = base.clone();
            move || base.get() * 2
        });
        assert_eq!(doubled.get(), 0);
        assert_eq!(base.node_state().consumer_count(), 1);
    }

    // The edge's consumer is dead; the next traversal prunes it
    base.set(1);
    assert_eq!(base.node_state().consumer_count(), 0);
}

#[test]
fn dropped_signal_does_not_break_downstream_readers() {
    let doubled;
    {
        let base = signal(21);
        doubled = memo({
            let base = base.clone();
            move || base.get() * 2
        });
        assert_eq!(doubled.get(), 42);
        // base's handle drops, but the memo's closure still owns the node
    }

    // The captured clone keeps the producer alive; the cached value stands
    assert_eq!(doubled.get(), 42);
}

#[test]
fn signal_clones_share_one_node_until_the_last_drop() {
    let a = signal(1);
    let b = a.clone();
    drop(a);

    b.set(2);
    assert_eq!(b.get(), 2);
}

#[test]
fn memo_chain_survives_intermediate_handle_drop() {
    let base = signal(1);
    let tail;
    {
        let mid = memo({
            let base = base.clone();
            move || base.get() + 1
        });
        tail = memo({
            let mid = mid.clone();
            move || mid.get() * 10
        });
        assert_eq!(tail.get(), 20);
        // mid's handle drops; tail's closure keeps the node alive
    }

    base.set(4);
    assert_eq!(tail.get(), 50);
}
