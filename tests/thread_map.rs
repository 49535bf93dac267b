use std::collections::HashSet;
use std::sync::Mutex;
use std::thread::sleep;
use std::time::Duration;

use parmap::{tmap, tmap_with, try_tmap, MapOptions, ParmapError};

#[test]
fn tmap_applies_function_in_order() {
    let items: Vec<u64> = (0..100).collect();
    let result = tmap(|x| x * x, items.clone(), &MapOptions::new().workers(8)).unwrap();
    assert_eq!(result, items.iter().map(|x| x * x).collect::<Vec<_>>());
}

#[test]
fn tmap_with_forwards_args() {
    let result = tmap_with(
        |x: i64, b: &i64| x * x + b,
        vec![1, 2, 3],
        -1,
        &MapOptions::new(),
    )
    .unwrap();
    assert_eq!(result, vec![0, 3, 8]);
}

#[test]
fn tmap_borrows_from_caller() {
    let words = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
    let lengths = tmap(|w: &String| w.len(), &words, &MapOptions::new()).unwrap();
    assert_eq!(lengths, vec![5, 4, 5]);
}

#[test]
fn tmap_respects_worker_count() {
    let seen = Mutex::new(HashSet::new());
    tmap(
        |_: u32| {
            sleep(Duration::from_millis(5));
            seen.lock()
                .unwrap()
                .insert(std::thread::current().id());
        },
        0..40,
        &MapOptions::new().workers(2),
    )
    .unwrap();
    assert!(seen.lock().unwrap().len() <= 2);
}

#[test]
fn tmap_ignores_progress_flags() {
    let expected: Vec<i32> = (0..30).map(|x| x + 1).collect();
    for opts in vec![
        MapOptions::new().no_progress(true),
        MapOptions::new().desc("adding").unit("n").leave(true),
        MapOptions::new().force_terminal(true).leave(false),
    ] {
        assert_eq!(tmap(|x: i32| x + 1, 0..30, &opts).unwrap(), expected);
    }
}

#[test]
#[should_panic(expected = "boom")]
fn tmap_resumes_panics() {
    let _ = tmap(
        |x: i32| {
            if x == 3 {
                panic!("boom");
            }
            x
        },
        0..8,
        &MapOptions::new().no_progress(true),
    );
}

#[test]
fn try_tmap_collects_successes() {
    let parsed = try_tmap(
        |s: &str| s.parse::<i32>(),
        vec!["1", "20", "-3"],
        &MapOptions::new(),
    )
    .unwrap();
    assert_eq!(parsed, vec![1, 20, -3]);
}

#[test]
fn try_tmap_reports_failure() {
    let err = try_tmap(
        |s: &str| s.parse::<i32>(),
        vec!["1", "two", "3"],
        &MapOptions::new().no_progress(true),
    )
    .unwrap_err();
    match err {
        ParmapError::Task { index, message } => {
            assert_eq!(index, 1);
            assert_eq!(message, "invalid digit found in string");
        }
        other => panic!("unexpected {:?}", other),
    }
}
