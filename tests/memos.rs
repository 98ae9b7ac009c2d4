// Memoized signal behaviour: caching, coalescing, error caching, cycles.

use std::cell::Cell;
use std::rc::Rc;

use weft_signals::{
    effect, fallible_memo, flush, memo, memo_with, signal, MemoOptions, SignalError,
};

#[test]
fn doubles_and_follows() {
    let c = signal(0);
    let d = memo({
        let c = c.clone();
        move || c.get() * 2
    });

    assert_eq!(d.get(), 0);
    c.set(1);
    assert_eq!(d.get(), 2);
}

#[test]
fn equal_result_does_not_version_bump() {
    let c = signal(10);
    let c2 = signal(10);
    let d = memo({
        let c = c.clone();
        let c2 = c2.clone();
        move || c.get() + c2.get()
    });

    assert_eq!(d.get(), 20);
    let version = d.node_state().value_version();

    c.set(7);
    c2.set(13);
    assert_eq!(d.get(), 20);
    assert_eq!(
        d.node_state().value_version(),
        version,
        "an equal recomputation must not advance the value version"
    );
}

#[test]
fn equality_override_ratchets() {
    let c = signal(0);
    let d = memo_with(
        {
            let c = c.clone();
            move || c.get() * 2
        },
        MemoOptions {
            equals: Some(|old: &i32, new: &i32| *old >= *new),
            ..MemoOptions::default()
        },
    );

    c.set(1);
    assert_eq!(d.get(), 2);
    c.set(4);
    assert_eq!(d.get(), 8);
    c.set(2);
    assert_eq!(d.get(), 8);
    c.set(1);
    assert_eq!(d.get(), 8);
}

#[test]
fn no_change_propagation_keeps_effects_quiet() {
    let level = signal(5i32);
    let sign = memo({
        let level = level.clone();
        move || level.get().signum()
    });

    let runs = Rc::new(Cell::new(0));
    let runs_clone = runs.clone();
    let sign_clone = sign.clone();
    let _e = effect(move || {
        let _ = sign_clone.get();
        runs_clone.set(runs_clone.get() + 1);
    });

    flush();
    assert_eq!(runs.get(), 1);

    // The sign stays +1 through all of these
    level.set(9);
    flush();
    level.set(1);
    flush();
    assert_eq!(runs.get(), 1);

    level.set(-3);
    flush();
    assert_eq!(runs.get(), 2);
}

#[test]
fn mutual_reads_are_a_cycle_not_a_hang() {
    use std::cell::RefCell;
    use weft_signals::Memo;

    let other: Rc<RefCell<Option<Memo<i32>>>> = Rc::new(RefCell::new(None));

    let a = fallible_memo({
        let other = other.clone();
        move || match &*other.borrow() {
            Some(m) => m.try_get().map(|v| v + 1),
            None => Ok(0),
        }
    });

    let b = fallible_memo({
        let a = a.clone();
        move || a.try_get().map(|v| v + 1)
    });
    *other.borrow_mut() = Some(b.clone());

    assert!(matches!(a.try_get(), Err(SignalError::Cycle { .. })));
    assert!(matches!(b.try_get(), Err(SignalError::Cycle { .. })));
}

#[test]
fn error_cache_rethrows_until_dependency_change() {
    #[derive(Debug, thiserror::Error)]
    #[error("value out of range")]
    struct OutOfRange;

    let input = signal(99);
    let computes = Rc::new(Cell::new(0));

    let checked = fallible_memo({
        let input = input.clone();
        let computes = computes.clone();
        move || {
            computes.set(computes.get() + 1);
            let v = input.get();
            if v > 10 {
                Err(SignalError::computation(OutOfRange))
            } else {
                Ok(v)
            }
        }
    });

    // First read computes and fails
    assert!(checked.try_get().is_err());
    assert_eq!(computes.get(), 1);

    // Repeated reads rethrow the cached failure without recomputing
    assert!(checked.try_get().is_err());
    assert!(checked.try_get().is_err());
    assert_eq!(computes.get(), 1);

    // A dependency change that leads to success clears the error
    input.set(3);
    assert_eq!(checked.try_get().unwrap(), 3);
    assert_eq!(computes.get(), 2);
}

#[test]
fn failed_memo_invalidates_downstream() {
    #[derive(Debug, thiserror::Error)]
    #[error("odd input")]
    struct OddInput;

    let input = signal(1);
    let even = fallible_memo({
        let input = input.clone();
        move || {
            let v = input.get();
            if v % 2 == 0 {
                Ok(v)
            } else {
                Err(SignalError::computation(OddInput))
            }
        }
    });
    let half = fallible_memo({
        let even = even.clone();
        move || even.try_get().map(|v| v / 2)
    });

    assert!(half.try_get().is_err());

    input.set(8);
    assert_eq!(half.try_get().unwrap(), 4);
}

#[test]
fn get_panics_on_cached_failure() {
    #[derive(Debug, thiserror::Error)]
    #[error("broken")]
    struct Broken;

    let broken = fallible_memo(move || -> Result<i32, SignalError> {
        Err(SignalError::computation(Broken))
    });

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| broken.get()));
    assert!(result.is_err());
}

#[test]
fn diamond_observes_consistent_state() {
    // d reads a both directly and through m; no read may ever observe one
    // updated and the other not
    let a = signal(1);
    let m = memo({
        let a = a.clone();
        move || a.get() * 10
    });
    let d = memo({
        let a = a.clone();
        let m = m.clone();
        move || {
            let direct = a.get();
            let derived = m.get();
            assert_eq!(derived, direct * 10, "glitch observed");
            direct + derived
        }
    });

    assert_eq!(d.get(), 11);
    a.set(2);
    assert_eq!(d.get(), 22);
    a.set(7);
    assert_eq!(d.get(), 77);
}

#[test]
fn on_change_fires_only_on_committed_changes() {
    let changes = Rc::new(Cell::new(0));

    let c = signal(0);
    let changes_clone = changes.clone();
    let clamped = memo_with(
        {
            let c = c.clone();
            move || c.get().clamp(0, 10)
        },
        MemoOptions {
            on_change: Some(Rc::new(move |_: &i32| {
                changes_clone.set(changes_clone.get() + 1);
            })),
            ..MemoOptions::default()
        },
    );

    assert_eq!(clamped.get(), 0);
    assert_eq!(changes.get(), 1);

    // Clamped result unchanged: recomputes, but no commit
    c.set(-5);
    assert_eq!(clamped.get(), 0);
    assert_eq!(changes.get(), 1);

    c.set(7);
    assert_eq!(clamped.get(), 7);
    assert_eq!(changes.get(), 2);
}
