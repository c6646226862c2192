#![cfg(not(feature = "loom"))]

use parmemo::{Error, Memo, MemoMap, Provider};
use std::sync::atomic::{AtomicUsize, Ordering};

fn fibonacci(i: &u64, prereqs: &Provider<u64, u64, MemoMap<u64, u64>>) -> u64 {
    match *i {
        0 => 0,
        1 | 2 => 1,
        _ => prereqs.get(&(i - 1)) + prereqs.get(&(i - 2)),
    }
}

fn fib_table(n: u64) -> Vec<u64> {
    let mut table = vec![0, 1, 1];
    for i in 3..=n as usize {
        table.push(table[i - 1] + table[i - 2]);
    }
    table
}

#[test]
fn dry_run_discovery_computes_fibonacci() {
    let memo: Memo<u64, u64> = Memo::new(1, 0, false).unwrap();
    let result = memo
        .get_or_compute(&30, |&i, prereqs| match i {
            0 => 0,
            1 | 2 => 1,
            _ => prereqs.get(&(i - 1)) + prereqs.get(&(i - 2)),
        })
        .unwrap();
    assert_eq!(result, 832_040);

    // Every key reachable from the root is populated post-call and
    // readable without a compute function.
    let table = fib_table(30);
    for key in 1..=30 {
        assert_eq!(memo.get(&key).unwrap(), table[key as usize]);
    }
}

#[test]
fn repeated_calls_return_the_memoized_value() {
    let memo: Memo<u64, u64> = Memo::new(1, 0, false).unwrap();
    let first = memo.get_or_compute(&25, fibonacci).unwrap();
    let second = memo.get_or_compute(&25, fibonacci).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, 75_025);
}

#[test]
fn racing_workers_agree() {
    for workers in [2, 4, 8] {
        let memo: Memo<u64, u64> = Memo::new(workers, 0, false).unwrap();
        let result = memo
            .get_or_compute(&30, |&i, prereqs| match i {
                0 => 0,
                1 | 2 => 1,
                _ => prereqs.get(&(i - 1)) + prereqs.get(&(i - 2)),
            })
            .unwrap();
        assert_eq!(result, 832_040, "workers = {workers}");
    }
}

#[test]
fn declared_mode_computes_each_key_exactly_once() {
    let memo: Memo<u64, u64> = Memo::new(1, 0, false).unwrap();
    let calls = AtomicUsize::new(0);
    let result = memo
        .get_or_compute_declared(
            &30,
            |&i, prereqs| {
                calls.fetch_add(1, Ordering::Relaxed);
                match i {
                    0 => 0,
                    1 | 2 => 1,
                    _ => prereqs.get(&(i - 1)) + prereqs.get(&(i - 2)),
                }
            },
            |&i, gatherer| {
                if i > 2 {
                    gatherer.declare(&(i - 1));
                    gatherer.declare(&(i - 2));
                }
            },
        )
        .unwrap();
    assert_eq!(result, 832_040);
    // Keys 1..=30 are reachable from the root; a single worker computes
    // each exactly once.
    assert_eq!(calls.load(Ordering::Relaxed), 30);
}

#[test]
fn leaf_dry_run_is_accepted_as_the_real_computation() {
    let memo: Memo<u64, u64> = Memo::new(1, 0, false).unwrap();
    let calls = AtomicUsize::new(0);
    let result = memo
        .get_or_compute(&2, |_, _| {
            calls.fetch_add(1, Ordering::Relaxed);
            1
        })
        .unwrap();
    assert_eq!(result, 1);
    // A key with no missing prerequisites commits its dry-run value
    // directly instead of computing twice.
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn read_only_get_of_absent_key_fails() {
    let memo: Memo<u64, u64> = Memo::new(1, 0, false).unwrap();
    assert_eq!(memo.get(&7), Err(Error::NotMemoized));
}

#[test]
fn worker_counts_are_validated() {
    assert_eq!(
        Memo::<u64, u64>::new(0, 0, false).unwrap_err(),
        Error::InvalidWorkerCount
    );

    let mut memo: Memo<u64, u64> = Memo::new(2, 0, false).unwrap();
    assert_eq!(memo.default_workers(), 2);
    assert_eq!(memo.set_default_workers(0), Err(Error::InvalidWorkerCount));
    memo.set_default_workers(4).unwrap();
    assert_eq!(memo.default_workers(), 4);

    assert_eq!(
        memo.get_or_compute_with(&1, |_, _| 0, 0),
        Err(Error::InvalidWorkerCount)
    );
}

#[test]
fn cycle_detection_flag_round_trips() {
    let mut memo: Memo<u64, u64> = Memo::new(1, 0, false).unwrap();
    assert!(!memo.cycle_detection_enabled());
    memo.set_cycle_detection(true);
    assert!(memo.cycle_detection_enabled());
}
