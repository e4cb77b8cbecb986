use stagepool::{Executor, Parallel, Sequence};
use core::time::Duration;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

fn add_one(x: i32) -> i32 {
    x + 1
}

fn multiply_by_two(x: i32) -> i32 {
    x * 2
}

fn small_pool() -> Executor {
    Executor::builder()
        .thread_count(2)
        .build()
        .expect("executor should start")
}

#[test]
fn single_stage_sequence_applies_the_stage() {
    let executor = small_pool();
    let pipeline = Sequence::new((add_one,));
    let mut task = executor.apply(&pipeline, 5);
    task.execute();
    assert_eq!(task.result(), 6);
}

#[test]
fn two_stage_sequence_composes_left_to_right() {
    let executor = small_pool();
    let pipeline = Sequence::new((add_one, multiply_by_two));
    let mut task = executor.apply(&pipeline, 5);
    task.execute();
    assert_eq!(task.result(), 12);
}

#[test]
fn longer_chains_keep_composing() {
    let executor = small_pool();
    let pipeline = Sequence::new((
        add_one,
        multiply_by_two,
        |x: i32| x - 3,
        |x: i32| x.to_string(),
    ));
    let mut task = executor.apply(&pipeline, 5);
    task.execute();
    assert_eq!(task.result(), "9");
}

#[test]
fn value_types_may_change_at_every_boundary() {
    let executor = small_pool();
    let pipeline = Sequence::new((
        |x: i32| x.to_string(),
        |s: String| s.len(),
        |n: usize| n * 10,
    ));
    let mut task = executor.apply(&pipeline, 1234);
    task.execute();
    assert_eq!(task.result(), 40);
}

#[test]
fn parallel_branches_transform_their_own_components() {
    let executor = small_pool();
    let pipeline = Parallel::new((add_one, multiply_by_two));
    let mut task = executor.apply(&pipeline, (1, 2));
    task.execute();
    assert_eq!(task.result(), (2, 4));
}

#[test]
fn parallel_results_stay_positional_regardless_of_finish_order() {
    let executor = small_pool();
    // The first branch finishes last; positions must not swap.
    let pipeline = Parallel::new((
        |x: i32| {
            thread::sleep(Duration::from_millis(30));
            x + 1
        },
        |x: i32| x * 2,
    ));
    let mut task = executor.apply(&pipeline, (1, 2));
    task.execute();
    assert_eq!(task.result(), (2, 4));
}

#[test]
fn parallel_branches_may_differ_in_types() {
    let executor = small_pool();
    let pipeline = Parallel::new((
        |x: i32| x.to_string(),
        |b: bool| u8::from(b),
        |v: Vec<i32>| v.into_iter().sum::<i32>(),
    ));
    let mut task = executor.apply(&pipeline, (7, true, vec![1, 2, 3]));
    task.execute();
    assert_eq!(task.result(), ("7".to_string(), 1u8, 6));
}

#[test]
fn sequenced_parallels_nest_transparently() {
    let executor = small_pool();
    let pipeline = Sequence::new((
        Parallel::new((add_one, multiply_by_two)),
        Parallel::new((|x: i32| x.to_string(), |x: i32| x.to_string())),
    ));
    let mut task = executor.apply(&pipeline, (1, 2));
    task.execute();
    assert_eq!(task.result(), ("2".to_string(), "4".to_string()));
}

#[test]
fn deeply_nested_pipeline_reproduces_the_flat_computation() {
    let executor = small_pool();
    let branch_a = Sequence::new((|x: i32| x * 3, |x: i32| x - 10));
    let branch_b = Sequence::new((add_one,));
    let pipeline = Sequence::new((
        |x: i32| (x, x),
        Parallel::new((branch_a, branch_b)),
        |(a, b): (i32, i32)| a + b,
    ));
    let mut task = executor.apply(&pipeline, 47);
    task.execute();
    // (47 * 3 - 10) + (47 + 1)
    assert_eq!(task.result(), 179);
}

#[test]
fn cloned_sequences_share_stages_and_stay_independently_usable() {
    let executor = small_pool();
    let inner = Sequence::new((add_one, multiply_by_two));
    let outer = Sequence::new((inner.clone(), inner.clone()));

    let mut task = executor.apply(&outer, 5);
    task.execute();
    // Twice through (x + 1) * 2.
    assert_eq!(task.result(), 26);

    let mut direct = executor.apply(&inner, 5);
    direct.execute();
    assert_eq!(direct.result(), 12);
}

#[test]
fn arc_shared_composition_is_a_stage() {
    let executor = small_pool();
    let shared = Arc::new(Sequence::new((add_one, multiply_by_two)));
    let outer = Sequence::new((Arc::clone(&shared), shared));
    let mut task = executor.apply(&outer, 5);
    task.execute();
    assert_eq!(task.result(), 26);
}

#[test]
fn one_composition_instantiates_many_independent_tasks() {
    let executor = small_pool();
    let pipeline = Sequence::new((add_one, multiply_by_two));
    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let mut task = executor.apply(&pipeline, i);
            task.schedule();
            task
        })
        .collect();
    for (i, mut task) in tasks.into_iter().enumerate() {
        task.wait();
        assert_eq!(task.result(), (i as i32 + 1) * 2);
    }
}

#[test]
fn deferred_getter_threads_one_task_into_another() {
    let executor = small_pool();
    let first = Sequence::new((add_one,));
    let second = Sequence::new((multiply_by_two,));

    let mut upstream = executor.apply(&first, 5);
    let mut downstream = executor.apply_deferred(&second, move || {
        upstream.execute();
        upstream.result()
    });
    downstream.execute();
    assert_eq!(downstream.result(), 12);
}

#[test]
fn deferred_getter_runs_exactly_once_at_schedule_time() {
    let executor = small_pool();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let pipeline = Sequence::new((add_one,));
    let mut task = executor.apply_deferred(&pipeline, move || {
        seen.fetch_add(1, Ordering::SeqCst);
        41
    });
    assert_eq!(
        calls.load(Ordering::SeqCst),
        0,
        "getter must not run before schedule"
    );
    task.schedule();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    task.wait();
    assert_eq!(task.result(), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn deferred_getter_feeds_a_parallel() {
    let executor = small_pool();
    let first = Sequence::new((add_one,));
    let branches = Parallel::new((add_one, multiply_by_two));

    let mut upstream = executor.apply(&first, 1);
    let mut downstream = executor.apply_deferred(&branches, move || {
        upstream.execute();
        let fed = upstream.result();
        (fed, fed)
    });
    downstream.execute();
    assert_eq!(downstream.result(), (3, 4));
}

#[test]
fn completion_callback_fires_exactly_once_for_sequences() {
    let executor = small_pool();
    let fired = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&fired);
    let pipeline = Sequence::new((add_one, multiply_by_two));
    let mut task = executor.apply(&pipeline, 5);
    task.on_complete(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    task.execute();
    assert_eq!(task.result(), 12);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn completion_callback_fires_exactly_once_for_parallels() {
    let executor = small_pool();
    let fired = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&fired);
    let pipeline = Parallel::new((add_one, multiply_by_two));
    let mut task = executor.apply(&pipeline, (1, 2));
    task.on_complete(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    task.execute();
    assert_eq!(task.result(), (2, 4));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn schedule_wait_chain_in_one_expression() {
    let executor = small_pool();
    let pipeline = Sequence::new((add_one,));
    let mut task = executor.apply(&pipeline, 9);
    task.schedule().wait();
    assert_eq!(task.result(), 10);
}

#[test]
fn waiting_twice_is_idempotent() {
    let executor = small_pool();
    let pipeline = Sequence::new((add_one,));
    let mut task = executor.apply(&pipeline, 9);
    task.execute();
    task.wait();
    assert_eq!(task.result(), 10);
}

#[test]
fn waiting_twice_on_a_parallel_is_idempotent() {
    let executor = small_pool();
    let pipeline = Parallel::new((add_one, multiply_by_two));
    let mut task = executor.apply(&pipeline, (3, 4));
    task.execute();
    // A second wait must stop at the facade; another barrier arrival would
    // overrun the barrier's sizing.
    task.wait();
    assert_eq!(task.result(), (4, 8));
}

#[test]
#[should_panic(expected = "already been scheduled")]
fn scheduling_twice_panics() {
    let executor = small_pool();
    let pipeline = Sequence::new((add_one,));
    let mut task = executor.apply(&pipeline, 1);
    task.schedule();
    task.schedule();
}

#[test]
#[should_panic(expected = "must be scheduled before wait")]
fn waiting_before_scheduling_panics() {
    let executor = small_pool();
    let pipeline = Sequence::new((add_one,));
    let mut task = executor.apply(&pipeline, 1);
    task.wait();
}

#[test]
#[should_panic(expected = "result requested before completion")]
fn extracting_result_before_completion_panics() {
    let executor = small_pool();
    let pipeline = Sequence::new((add_one,));
    let task = executor.apply(&pipeline, 1);
    let _ = task.result();
}

#[test]
#[should_panic(expected = "registered before scheduling")]
fn registering_callback_after_schedule_panics() {
    let executor = small_pool();
    let pipeline = Sequence::new((add_one,));
    let mut task = executor.apply(&pipeline, 1);
    task.schedule();
    task.on_complete(|| {});
}
