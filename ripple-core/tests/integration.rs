//! Integration Tests for the Reactive Engine
//!
//! These tests verify that cells, derived cells, effects, transactions, and
//! the guard rail work together correctly.

use std::cell::{Cell as Counter, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use ripple_core::config::{Config, GuardPolicy, WritePolicy};
use ripple_core::guard::{
    set_diagnostic_sink, tracked_read, Diagnostic, GuardedOperation, Mode, Outcome, RecordingSink,
};
use ripple_core::prelude::*;

#[derive(Debug)]
struct Tally {
    count: i32,
}

fn by_count() -> Compare<Tally> {
    Compare::by(|a: &Tally, b: &Tally| a.count == b.count)
}

/// Collects every value an effect or listener observed.
fn spy<T: Clone + 'static>() -> Rc<RefCell<Vec<T>>> {
    Rc::new(RefCell::new(Vec::new()))
}

fn recording_sink() -> Arc<RecordingSink> {
    let sink = Arc::new(RecordingSink::new());
    set_diagnostic_sink(sink.clone());
    sink
}

/// Test that an effective write stores the new reference and an equal one
/// keeps the previous reference.
#[test]
fn write_keeps_reference_stability() {
    let cell = Cell::with_compare(Tally { count: 0 }, by_count());

    let written = Rc::new(Tally { count: 1 });
    cell.write(written.clone());
    assert!(Rc::ptr_eq(&cell.read_untracked(), &written));

    cell.write(Tally { count: 1 });
    assert!(Rc::ptr_eq(&cell.read_untracked(), &written));
}

/// Test that a compare-equal write notifies nobody and compares once.
#[test]
fn compare_gates_notification() {
    let calls = Rc::new(Counter::new(0));
    let cell = Cell::with_compare(
        Tally { count: 1 },
        Compare::by({
            let calls = calls.clone();
            move |a: &Tally, b: &Tally| {
                calls.set(calls.get() + 1);
                a.count == b.count
            }
        }),
    );
    assert_eq!(calls.get(), 0);

    let seen = spy::<i32>();
    let handle = cell.subscribe({
        let seen = seen.clone();
        move |value: Rc<Tally>| seen.borrow_mut().push(value.count)
    });

    cell.write(Tally { count: 1 });
    assert_eq!(calls.get(), 1);
    assert!(seen.borrow().is_empty());

    cell.write(Tally { count: 2 });
    assert_eq!(calls.get(), 2);
    assert_eq!(*seen.borrow(), vec![2]);

    handle.unsubscribe();
}

/// Test that a batch delivers one notification with the final values.
#[test]
fn batch_coalesces_writes() {
    let a = Cell::new(0);
    let b = Cell::new(0);
    let sums = spy::<i32>();

    let handle = subscribe({
        let (a, b) = (a.clone(), b.clone());
        let sums = sums.clone();
        move |scope| sums.borrow_mut().push(*a.read(scope) + *b.read(scope))
    });
    sums.borrow_mut().clear();

    batch(|| {
        a.write(2);
        b.write(3);
        assert!(sums.borrow().is_empty());
    });

    assert_eq!(*sums.borrow(), vec![5]);
    handle.unsubscribe();
}

/// Test that a dependency read only in one branch is subscribed only while
/// that branch runs.
#[test]
fn dependencies_follow_the_branch_taken() {
    let a = Cell::new(0);
    let b = Cell::new(0);
    let seen = spy::<i32>();

    let handle = subscribe({
        let (a, b) = (a.clone(), b.clone());
        let seen = seen.clone();
        move |scope| {
            if *a.read(scope) > 1 {
                seen.borrow_mut().push(*a.read(scope) + *b.read(scope));
            }
        }
    });

    b.write(1);
    b.write(2);
    assert!(seen.borrow().is_empty());
    assert_eq!(b.dependent_count(), 0);

    a.write(5);
    assert_eq!(*seen.borrow(), vec![7]);
    assert_eq!(b.dependent_count(), 1);

    b.write(10);
    assert_eq!(*seen.borrow(), vec![7, 15]);

    // Leaving the branch prunes `b` again
    a.write(0);
    b.write(11);
    assert_eq!(*seen.borrow(), vec![7, 15]);
    assert_eq!(b.dependent_count(), 0);

    handle.unsubscribe();
}

/// Test that an unobserved derived cell compares once per read after the
/// first, and never before it.
#[test]
fn derived_compares_once_per_read_after_the_first() {
    let calls = Rc::new(Counter::new(0));
    let derived = DerivedCell::builder(|_| Tally { count: 3 })
        .compare(Compare::by({
            let calls = calls.clone();
            move |a: &Tally, b: &Tally| {
                calls.set(calls.get() + 1);
                a.count == b.count
            }
        }))
        .build();
    assert_eq!(calls.get(), 0);

    for _ in 0..5 {
        derived.read_untracked();
    }
    assert_eq!(calls.get(), 4);
}

/// Test a full subscribe, write, unsubscribe cycle.
#[test]
fn subscribe_write_unsubscribe() {
    let c = Cell::new(1);
    let seen = spy::<i32>();

    let u = subscribe({
        let c = c.clone();
        let seen = seen.clone();
        move |scope| seen.borrow_mut().push(*c.read(scope))
    });
    assert_eq!(*seen.borrow(), vec![1]);

    c.write(2);
    assert_eq!(*seen.borrow(), vec![1, 2]);

    u.unsubscribe();
    c.write(3);
    assert_eq!(*seen.borrow(), vec![1, 2]);
    assert_eq!(c.dependent_count(), 0);
}

struct Nested {
    count: Cell<i32>,
}

/// Test that a plain fork shares nested cells and a transforming fork can
/// make them independent.
#[test]
fn forks_share_or_split_nested_cells() {
    let outer = Cell::new(Nested {
        count: Cell::new(1),
    });

    let shared = outer.fork();
    shared.read_untracked().count.write(2);
    assert_eq!(*outer.read_untracked().count.read_untracked(), 2);

    let independent = outer.fork_with(
        |value| Nested {
            count: value.count.fork(),
        },
        CompareOverride::Inherit,
    );
    independent.read_untracked().count.write(9);
    assert_eq!(*outer.read_untracked().count.read_untracked(), 2);

    outer.read_untracked().count.write(4);
    assert_eq!(*independent.read_untracked().count.read_untracked(), 9);
}

/// Test that a listener fires with each new value but not on subscription.
#[test]
fn listener_receives_new_values() {
    let cell = Cell::new(String::from("a"));
    let seen = spy::<String>();

    let handle = cell.subscribe({
        let seen = seen.clone();
        move |value: Rc<String>| seen.borrow_mut().push(value.to_string())
    });
    assert!(seen.borrow().is_empty());

    cell.write(String::from("b"));
    cell.update(|s| format!("{s}c"));
    assert_eq!(*seen.borrow(), vec!["b", "bc"]);

    handle.unsubscribe();
    cell.write(String::from("d"));
    assert_eq!(seen.borrow().len(), 2);
}

/// Test that subscribing inside an effect yields a dead handle.
#[test]
fn subscribe_inside_effect_is_replaced() {
    let sink = recording_sink();
    let source = Cell::new(0);
    let inner_runs = Rc::new(Counter::new(0));
    let inner: Rc<RefCell<Option<Unsubscribe>>> = Rc::new(RefCell::new(None));

    let handle = subscribe({
        let source = source.clone();
        let inner_runs = inner_runs.clone();
        let inner = inner.clone();
        move |scope| {
            source.read(scope);
            let inner_runs = inner_runs.clone();
            let nested = source.subscribe(move |_| inner_runs.set(inner_runs.get() + 1));
            *inner.borrow_mut() = Some(nested);
        }
    });

    source.write(1);
    assert_eq!(inner_runs.get(), 0);
    assert!(inner.borrow().as_ref().is_some_and(|h| !h.is_active()));
    assert_eq!(source.dependent_count(), 1);

    let records = sink.take();
    assert!(records.iter().all(|d| d.operation == GuardedOperation::Subscribe
        && d.mode == Mode::Effect
        && d.outcome == Outcome::Replaced));
    assert_eq!(records.len(), 2);

    handle.unsubscribe();
}

/// Test that writes inside a getter are discarded by default and reported.
#[test]
fn write_inside_getter_is_discarded() {
    let sink = recording_sink();
    let target = Cell::new(0);

    let derived = DerivedCell::new({
        let target = target.clone();
        move |_| {
            target.write(99);
            1
        }
    });
    derived.read_untracked();

    assert_eq!(*target.read_untracked(), 0);
    assert_eq!(
        sink.take(),
        vec![Diagnostic {
            operation: GuardedOperation::Write,
            mode: Mode::MemoizedRead,
            outcome: Outcome::Discarded,
        }]
    );
}

/// Test that writes inside an effect proceed with a warning.
#[test]
fn write_inside_effect_proceeds() {
    let sink = recording_sink();
    let source = Cell::new(1);
    let mirror = Cell::new(0);

    let handle = subscribe({
        let (source, mirror) = (source.clone(), mirror.clone());
        move |scope| mirror.write(*source.read(scope))
    });
    source.write(2);

    assert_eq!(*mirror.read_untracked(), 2);
    assert_eq!(sink.len(), 2);
    assert!(sink
        .take()
        .iter()
        .all(|d| d.outcome == Outcome::Proceeded && d.mode == Mode::Effect));

    handle.unsubscribe();
}

/// Test that creating or forking cells inside a tracked read proceeds and
/// is reported.
#[test]
fn create_and_fork_inside_tracked_read_proceed() {
    let sink = recording_sink();
    let source = Cell::new(1);

    let (created, forked) = tracked_read(|| (Cell::new(2), source.fork()));

    assert_eq!(*created.read_untracked(), 2);
    assert_eq!(*forked.read_untracked(), 1);
    let operations: Vec<_> = sink.take().into_iter().map(|d| d.operation).collect();
    assert_eq!(
        operations,
        vec![GuardedOperation::Create, GuardedOperation::Clone]
    );
}

/// Test that the write policy is configurable per mode.
#[test]
fn write_policy_is_configurable() {
    Config {
        guard: GuardPolicy {
            write_in_tracked_read: WritePolicy::Discard,
            ..GuardPolicy::default()
        },
        ..Config::default()
    }
    .install();

    let cell = Cell::new(0);
    tracked_read(|| cell.write(1));
    assert_eq!(*cell.read_untracked(), 0);

    untracked(|| cell.write(2));
    assert_eq!(*cell.read_untracked(), 2);
}

/// Test that a setter touching several sources notifies dependents once.
#[test]
fn derived_setter_notifies_once() {
    let first = Cell::new(String::from("Ada"));
    let last = Cell::new(String::from("Lovelace"));

    let full = DerivedCell::builder({
        let (first, last) = (first.clone(), last.clone());
        move |scope| format!("{} {}", first.read(scope), last.read(scope))
    })
    .setter({
        let (first, last) = (first.clone(), last.clone());
        move |candidate: Rc<String>, _| {
            let mut parts = candidate.splitn(2, ' ');
            first.write(parts.next().unwrap_or_default().to_string());
            last.write(parts.next().unwrap_or_default().to_string());
        }
    })
    .compare(Compare::structural())
    .build();

    let seen = spy::<String>();
    let handle = full.subscribe({
        let seen = seen.clone();
        move |value: Rc<String>| seen.borrow_mut().push(value.to_string())
    });

    full.write(String::from("Grace Hopper")).unwrap();

    assert_eq!(*seen.borrow(), vec!["Grace Hopper"]);
    assert_eq!(*first.read_untracked(), "Grace");
    assert_eq!(*last.read_untracked(), "Hopper");

    handle.unsubscribe();
}

/// Test that a derived cell without a setter rejects writes.
#[test]
fn read_only_derived_cell_errors() {
    let derived = DerivedCell::new(|_| 1);
    assert!(matches!(
        derived.write(2),
        Err(CellError::ReadOnly { cell }) if cell == derived.id()
    ));
}

/// Test that a derived cell subscribes to its sources only while observed.
#[test]
fn derived_subscriptions_follow_observation() {
    let source = Cell::new(1);
    let derived = DerivedCell::new({
        let source = source.clone();
        move |scope| *source.read(scope) * 10
    });

    derived.read_untracked();
    assert_eq!(source.dependent_count(), 0);

    let handle = derived.subscribe(|_: Rc<i32>| {});
    assert_eq!(source.dependent_count(), 1);
    assert_eq!(derived.dependent_count(), 1);

    handle.unsubscribe();
    assert_eq!(source.dependent_count(), 0);
    assert_eq!(derived.dependent_count(), 0);
}

/// Test that an effect behind a derived cell is skipped when the derived
/// value turns out equal.
#[test]
fn equal_derived_result_skips_downstream_effects() {
    let count = Cell::new(1);
    let is_positive = DerivedCell::builder({
        let count = count.clone();
        move |scope| *count.read(scope) > 0
    })
    .compare(Compare::structural())
    .build();

    let runs = Rc::new(Counter::new(0));
    let handle = subscribe({
        let is_positive = is_positive.clone();
        let runs = runs.clone();
        move |scope| {
            is_positive.read(scope);
            runs.set(runs.get() + 1);
        }
    });

    count.write(2);
    count.write(3);
    assert_eq!(runs.get(), 1);

    count.write(-1);
    assert_eq!(runs.get(), 2);

    handle.unsubscribe();
}

/// Test a diamond: an effect reading a source directly and through two
/// derived cells runs once per write and sees consistent values.
#[test]
fn diamond_runs_once_with_consistent_values() {
    let source = Cell::new(1);
    let double = DerivedCell::new({
        let source = source.clone();
        move |scope| *source.read(scope) * 2
    });
    let triple = DerivedCell::new({
        let source = source.clone();
        move |scope| *source.read(scope) * 3
    });

    let seen = spy::<(i32, i32, i32)>();
    let handle = subscribe({
        let (source, double, triple) = (source.clone(), double.clone(), triple.clone());
        let seen = seen.clone();
        move |scope| {
            seen.borrow_mut()
                .push((*source.read(scope), *double.read(scope), *triple.read(scope)))
        }
    });

    source.write(2);
    assert_eq!(*seen.borrow(), vec![(1, 2, 3), (2, 4, 6)]);

    handle.unsubscribe();
}

/// Test that an effect writing to a cell it reads settles after the writes
/// stop changing the value.
#[test]
fn effect_writing_its_own_dependency_settles() {
    let cell = Cell::with_compare(0, Compare::structural());

    let handle = subscribe({
        let cell = cell.clone();
        move |scope| {
            let value = *cell.read(scope);
            if value < 3 {
                cell.write(value + 1);
            }
        }
    });

    assert_eq!(*cell.read_untracked(), 3);
    handle.unsubscribe();
}

/// Test that an effect that keeps re-triggering itself panics and leaves
/// the engine usable.
#[test]
fn runaway_effect_panics() {
    let cell = Cell::new(0);
    let slot: Rc<RefCell<Option<Unsubscribe>>> = Rc::new(RefCell::new(None));

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        batch(|| {
            let handle = subscribe({
                let cell = cell.clone();
                move |scope| {
                    let value = *cell.read(scope);
                    cell.write(value + 1);
                }
            });
            *slot.borrow_mut() = Some(handle);
        });
    }));

    assert!(result.is_err());
    assert!(!ripple_core::reactive::is_batching());
    assert_eq!(ripple_core::guard::current_mode(), Mode::Untracked);

    let handle = slot.borrow_mut().take().expect("effect was created");
    handle.unsubscribe();
    assert!(!handle.is_active());
    assert_eq!(cell.dependent_count(), 0);

    // The engine still delivers notifications
    let seen = spy::<i32>();
    let listener = cell.subscribe({
        let seen = seen.clone();
        move |value: Rc<i32>| seen.borrow_mut().push(*value)
    });
    cell.write(-1);
    assert_eq!(*seen.borrow(), vec![-1]);
    listener.unsubscribe();
}

/// Test that a panicking effect does not cost its siblings the change: they
/// run on the next flush.
#[test]
fn panicking_effect_leaves_siblings_queued() {
    let a = Cell::new(0);
    let unrelated = Cell::new(0);

    let failing = subscribe({
        let a = a.clone();
        move |scope| {
            if *a.read(scope) == 1 {
                panic!("effect failed");
            }
        }
    });

    let seen = spy::<i32>();
    let sibling = subscribe({
        let a = a.clone();
        let seen = seen.clone();
        move |scope| seen.borrow_mut().push(*a.read(scope))
    });

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| a.write(1)));
    assert!(result.is_err());
    assert_eq!(*seen.borrow(), vec![0]);
    assert!(!ripple_core::reactive::is_batching());

    unrelated.write(1);
    assert_eq!(*seen.borrow(), vec![0, 1]);

    failing.unsubscribe();
    sibling.unsubscribe();
}
