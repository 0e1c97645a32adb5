//! End-to-end continuation tests
//!
//! Each test assembles continuable classes, loads them through the
//! instrumenting class loader and drives them with the basic runner:
//! - pause and resume sequences
//! - clone isolation and in-place reuse
//! - expiry and tree teardown
//! - step-back
//!
//! # Running Tests
//! ```bash
//! cargo test --test continuation_tests
//! ```

mod common;

use rewind_engine::{ContinuationError, RuntimeSettings};
use std::time::Duration;

fn ticks(outcome: &rewind_engine::RunOutcome) -> i32 {
    outcome
        .continuable
        .as_ref()
        .unwrap()
        .get_field("ticks")
        .unwrap()
        .as_int()
        .unwrap()
}

// ===== Pause and Resume =====

#[test]
fn test_pause_loop_counts_down() {
    let runner = common::runner(&[common::countdown()], RuntimeSettings::default());

    let mut outcome = runner.start("app/Countdown").unwrap();
    let mut seen = Vec::new();
    while let Some(id) = outcome.id.clone() {
        let context = runner.manager().get_context(&id).unwrap();
        assert!(context.is_paused());
        seen.push(context.local_vars().get_int(1));
        outcome = runner.resume(&id).unwrap();
    }

    assert_eq!(seen, vec![5, 4, 3, 2, 1, -1]);
    assert_eq!(ticks(&outcome), 5);

    // The finished context is registered but cannot be resumed.
    let last = outcome.last_context.unwrap();
    assert!(!last.is_paused());
    assert_eq!(last.local_vars().get_int(1), -1);
    let again = runner.resume(&last.id()).unwrap();
    assert!(again.id.is_none());
}

#[test]
fn test_run_returns_none_for_unknown_id() {
    let runner = common::runner(&[common::countdown()], RuntimeSettings::default());
    let outcome = runner.run("not-a-continuation").unwrap();
    assert!(outcome.id.is_none());
    assert!(outcome.continuable.is_none());
}

// ===== Cloning =====

#[test]
fn test_resume_clones_are_isolated() {
    let runner = common::runner(&[common::countdown()], RuntimeSettings::default());

    let first = runner.start("app/Countdown").unwrap();
    let id = first.id.clone().unwrap();
    assert_eq!(ticks(&first), 1);

    let a = runner.resume(&id).unwrap();
    let b = runner.resume(&id).unwrap();
    let a_id = a.id.clone().unwrap();
    let b_id = b.id.clone().unwrap();
    assert_ne!(a_id, b_id);
    assert_ne!(a_id, id);

    // Both branches advanced from the same snapshot.
    assert_eq!(ticks(&a), 2);
    assert_eq!(ticks(&b), 2);
    assert_eq!(ticks(&first), 1);
    assert!(!rewind_engine::ObjectRef::ptr_eq(
        a.continuable.as_ref().unwrap(),
        b.continuable.as_ref().unwrap()
    ));

    let manager = runner.manager();
    assert_eq!(manager.get_context(&id).unwrap().local_vars().get_int(1), 5);
    assert_eq!(manager.get_context(&a_id).unwrap().local_vars().get_int(1), 4);
    assert_eq!(manager.get_context(&b_id).unwrap().local_vars().get_int(1), 4);
    assert!(manager.get_context(&id).unwrap().is_paused());
}

fn resume_to(runner: &rewind_engine::BasicContinuableRunner, id: &str, expected: i32) -> String {
    let next = runner.resume(id).unwrap().id.unwrap();
    assert_eq!(runner.manager().get_context(&next).unwrap().local_vars().get_int(1), expected);
    next
}

#[test]
fn test_interleaved_branches_stay_independent() {
    let runner = common::runner(&[common::countdown()], RuntimeSettings::default());

    let root = runner.start("app/Countdown").unwrap().id.unwrap();
    let a = resume_to(&runner, &root, 4);
    let aa3 = resume_to(&runner, &a, 3);
    let aa2 = resume_to(&runner, &aa3, 2);
    let b = resume_to(&runner, &root, 4);
    let ab3 = resume_to(&runner, &a, 3);
    let aa1 = resume_to(&runner, &aa2, 1);
    let b3 = resume_to(&runner, &b, 3);
    let ab2 = resume_to(&runner, &ab3, 2);
    let b2 = resume_to(&runner, &b3, 2);

    let aa_last = resume_to(&runner, &aa1, -1);
    assert!(runner.resume(&aa_last).unwrap().id.is_none());

    let b1 = resume_to(&runner, &b2, 1);
    let ab1 = resume_to(&runner, &ab2, 1);
    let ab_last = resume_to(&runner, &ab1, -1);
    assert!(runner.resume(&ab_last).unwrap().id.is_none());
    let b_last = resume_to(&runner, &b1, -1);
    assert!(runner.resume(&b_last).unwrap().id.is_none());

    let ids = [&a, &aa3, &aa2, &b, &ab3, &aa1, &b3, &ab2, &b2, &b1, &ab1];
    for (i, x) in ids.iter().enumerate() {
        for y in &ids[i + 1..] {
            assert_ne!(x, y);
        }
    }

    // Finished branches leave their ancestors resumable.
    assert_eq!(runner.manager().get_context(&root).unwrap().local_vars().get_int(1), 5);
    assert_eq!(runner.manager().get_context(&a).unwrap().local_vars().get_int(1), 4);
    assert!(runner.manager().get_context(&b2).unwrap().is_paused());
}

#[test]
fn test_reuse_invalidates_old_id() {
    let runner = common::runner(&[common::countdown()], RuntimeSettings::default());
    runner.clone_continuations(false);

    let first = runner.start("app/Countdown").unwrap();
    let id = first.id.unwrap();
    let object = first.continuable.unwrap();

    let second = runner.resume(&id).unwrap();
    let next_id = second.id.unwrap();
    assert_ne!(next_id, id);
    assert!(rewind_engine::ObjectRef::ptr_eq(&object, second.continuable.as_ref().unwrap()));

    let stale = runner.resume(&id).unwrap();
    assert!(stale.id.is_none());
    assert!(stale.continuable.is_none());

    assert_eq!(runner.manager().get_context(&next_id).unwrap().local_vars().get_int(1), 4);
}

// ===== Lifetime =====

#[test]
fn test_expired_context_is_not_resumed() {
    let settings = RuntimeSettings {
        duration_ms: 0,
        purge_scale: 0,
        ..RuntimeSettings::default()
    };
    let runner = common::runner(&[common::countdown()], settings);

    let id = runner.start("app/Countdown").unwrap().id.unwrap();
    std::thread::sleep(Duration::from_millis(5));

    let outcome = runner.resume(&id).unwrap();
    assert!(outcome.id.is_none());
    assert!(!runner.manager().contains(&id));
}

#[test]
fn test_remove_context_tree() {
    let runner = common::runner(&[common::countdown()], RuntimeSettings::default());

    let root = runner.start("app/Countdown").unwrap().id.unwrap();
    let child = runner.resume(&root).unwrap().id.unwrap();
    let sibling = runner.resume(&root).unwrap().id.unwrap();
    let grandchild = runner.resume(&child).unwrap().id.unwrap();
    assert_eq!(runner.manager().len(), 4);

    runner.manager().remove_context_tree(&grandchild);

    for id in [&root, &child, &sibling, &grandchild] {
        assert!(runner.manager().get_context(id).is_none());
    }
    assert!(runner.manager().is_empty());
}

// ===== Step Back =====

#[test]
fn test_step_back_returns_to_previous_pause() {
    let runner = common::runner(&[common::stepper()], RuntimeSettings::default());

    let first = runner.start("app/Stepper").unwrap().id.unwrap();
    assert_eq!(runner.manager().get_context(&first).unwrap().local_vars().get_int(1), 1);

    let second = runner.resume(&first).unwrap().id.unwrap();
    assert_eq!(runner.manager().get_context(&second).unwrap().local_vars().get_int(1), 2);

    // Reaching 3 steps back to the continuation taken at the first pause,
    // which runs on to the pause at 2 again under a new id.
    let replay = runner.resume(&second).unwrap().id.unwrap();
    assert_ne!(replay, second);
    let context = runner.manager().get_context(&replay).unwrap();
    assert_eq!(context.local_vars().get_int(1), 2);
    assert_eq!(context.parent_id().as_deref(), Some(first.as_str()));
}

// ===== Errors =====

#[test]
fn test_uncaught_exception_is_reported() {
    let runner = common::runner(&[common::faulty()], RuntimeSettings::default());
    match runner.start("app/Faulty") {
        Err(ContinuationError::UncaughtException { class, message }) => {
            assert_eq!(class, "rt/ArithmeticException");
            assert_eq!(message, "/ by zero");
        }
        other => panic!("expected an uncaught exception, got {:?}", other),
    }
}
