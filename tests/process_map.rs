use ntest::timeout;
use parmap::pool::ProcessPool;
use parmap::tasks::{ShiftedSquare, ShiftedSquareArgs};
use parmap::utils::discard_logger;
use parmap::{pmap, MapOptions, ParmapError, Progress, Task};

const WORKER: &str = env!("CARGO_BIN_EXE_parmap");

fn options() -> MapOptions {
    MapOptions::new().worker_program(WORKER).no_progress(true)
}

fn offset(offset: i64) -> ShiftedSquareArgs {
    ShiftedSquareArgs {
        offset,
        ..Default::default()
    }
}

#[test]
#[timeout(30000)]
fn pmap_forwards_args() {
    let result = pmap::<ShiftedSquare, _>(vec![1, 2, 3], &offset(-1), &options()).unwrap();
    assert_eq!(result, vec![0, 3, 8]);
}

#[test]
#[timeout(30000)]
fn pmap_keeps_input_order() {
    let items: Vec<i64> = (-50..50).collect();
    let expected: Vec<i64> = items.iter().map(|x| x * x + 7).collect();
    let result = pmap::<ShiftedSquare, _>(items, &offset(7), &options().workers(4)).unwrap();
    assert_eq!(result, expected);
}

#[test]
#[timeout(30000)]
fn pmap_ignores_progress_flags() {
    let items: Vec<i64> = (0..20).collect();
    let expected: Vec<i64> = items.iter().map(|x| x * x).collect();
    for opts in vec![
        options().no_progress(false),
        options().no_progress(false).leave(false).desc("squares").unit("sq"),
        options().no_progress(false).force_terminal(true),
    ] {
        let result = pmap::<ShiftedSquare, _>(items.clone(), &offset(0), &opts.workers(2)).unwrap();
        assert_eq!(result, expected);
    }
}

#[test]
#[timeout(30000)]
fn pmap_empty_input() {
    let result = pmap::<ShiftedSquare, _>(Vec::new(), &offset(0), &options()).unwrap();
    assert!(result.is_empty());
}

#[test]
#[timeout(30000)]
fn pmap_reports_task_failure() {
    let err = pmap::<ShiftedSquare, _>(vec![1, i64::MAX], &offset(0), &options().workers(1))
        .unwrap_err();
    match err {
        ParmapError::Task { index, message } => {
            assert_eq!(index, 1);
            assert!(message.contains("overflow"), "{}", message);
        }
        other => panic!("unexpected {:?}", other),
    }
}

struct Unregistered;

impl Task for Unregistered {
    const NAME: &'static str = "unregistered";
    type Input = u8;
    type Output = u8;
    type Args = ();

    fn call(input: u8, _: &()) -> anyhow::Result<u8> {
        Ok(input)
    }
}

#[test]
#[timeout(30000)]
fn pmap_unknown_task_is_rejected() {
    let err = pmap::<Unregistered, _>(vec![1, 2], &(), &options()).unwrap_err();
    assert!(matches!(err, ParmapError::WorkerRejected { .. }), "{:?}", err);
}

#[test]
#[timeout(30000)]
fn pmap_missing_worker_program() {
    let opts = options().worker_program("/nonexistent/parmap-worker");
    let err = pmap::<ShiftedSquare, _>(vec![1], &offset(0), &opts).unwrap_err();
    assert!(matches!(err, ParmapError::WorkerSpawn { .. }), "{:?}", err);
}

#[test]
#[timeout(30000)]
fn process_pool_is_reusable() {
    let mut pool = ProcessPool::new(WORKER.into(), Vec::new(), 3, discard_logger()).unwrap();
    assert_eq!(pool.size(), 3);
    let progress = Progress::hidden();
    let first = pool
        .map::<ShiftedSquare>(vec![1, 2, 3, 4], &offset(1), &progress)
        .unwrap();
    assert_eq!(first, vec![2, 5, 10, 17]);
    let second = pool
        .map::<ShiftedSquare>(vec![5, 6], &offset(-5), &progress)
        .unwrap();
    assert_eq!(second, vec![20, 31]);
    pool.join().unwrap();
}

#[test]
#[timeout(30000)]
fn process_pool_counts_progress() {
    let mut pool = ProcessPool::new(WORKER.into(), Vec::new(), 2, discard_logger()).unwrap();
    let progress = Progress::new(10, &MapOptions::new(), true).unwrap();
    pool.map::<ShiftedSquare>((0..10).collect(), &offset(0), &progress)
        .unwrap();
    assert_eq!(progress.position(), 10);
    progress.finish();
}

#[test]
#[timeout(30000)]
fn process_pool_survives_task_failure() {
    let mut pool = ProcessPool::new(WORKER.into(), Vec::new(), 1, discard_logger()).unwrap();
    let progress = Progress::hidden();
    let err = pool
        .map::<ShiftedSquare>(vec![2, i64::MIN, 3], &offset(0), &progress)
        .unwrap_err();
    assert!(matches!(err, ParmapError::Task { index: 1, .. }), "{:?}", err);
    let result = pool
        .map::<ShiftedSquare>(vec![2, 3], &offset(0), &progress)
        .unwrap();
    assert_eq!(result, vec![4, 9]);
    pool.join().unwrap();
}

#[test]
#[timeout(30000)]
fn pmap_skips_task_stdout() {
    let args = ShiftedSquareArgs {
        offset: 1,
        echo: true,
        ..Default::default()
    };
    for workers in vec![1, 2] {
        let result = pmap::<ShiftedSquare, _>(1..=5, &args, &options().workers(workers)).unwrap();
        assert_eq!(result, vec![2, 5, 10, 17, 26]);
    }
}

#[test]
#[timeout(30000)]
#[cfg(target_os = "linux")]
fn process_pool_drop_reaps_workers() {
    use std::path::Path;
    let mut pool = ProcessPool::new(WORKER.into(), Vec::new(), 2, discard_logger()).unwrap();
    let pids = pool.pids();
    assert_eq!(pids.len(), 2);
    for pid in &pids {
        assert!(Path::new(&format!("/proc/{}", pid)).exists());
    }
    // leave the map early, then drop without join
    let err = pool
        .map::<ShiftedSquare>(vec![i64::MAX, 1, 2], &offset(0), &Progress::hidden())
        .unwrap_err();
    assert!(matches!(err, ParmapError::Task { index: 0, .. }), "{:?}", err);
    drop(pool);
    for pid in &pids {
        assert!(!Path::new(&format!("/proc/{}", pid)).exists(), "worker {} still alive", pid);
    }
}
