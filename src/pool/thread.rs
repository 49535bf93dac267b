use rayon::prelude::*;
use slog::Logger;

use crate::error::Result;
use crate::progress::Progress;

/// Fixed-size pool of threads backed by rayon.
pub struct ThreadPool {
    pool: rayon::ThreadPool,
    logger: Logger,
}

impl ThreadPool {
    pub fn new(threads: usize, logger: Logger) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("parmap-{}", i))
            .build()?;
        debug!(logger, "thread pool ready"; "threads" => threads);
        Ok(Self { pool, logger })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Applies `func` to every item, keeping input order. A panic in `func`
    /// resumes on the calling thread.
    pub fn map<T, R, F>(&self, items: Vec<T>, func: F, progress: &Progress) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        trace!(self.logger, "map"; "items" => items.len());
        self.pool.install(|| {
            items
                .into_par_iter()
                .map(|item| {
                    let result = func(item);
                    progress.inc();
                    result
                })
                .collect()
        })
    }

    /// Like `map`, but stops at the first `Err`. The failing item's index is
    /// returned with the error.
    pub fn try_map<T, R, E, F>(
        &self,
        items: Vec<T>,
        func: F,
        progress: &Progress,
    ) -> std::result::Result<Vec<R>, (usize, E)>
    where
        T: Send,
        R: Send,
        E: Send,
        F: Fn(T) -> std::result::Result<R, E> + Send + Sync,
    {
        trace!(self.logger, "try_map"; "items" => items.len());
        self.pool.install(|| {
            items
                .into_par_iter()
                .enumerate()
                .map(|(index, item)| {
                    let result = func(item).map_err(|err| (index, err));
                    progress.inc();
                    result
                })
                .collect()
        })
    }
}

#[test]
fn test_map_keeps_order() {
    use std::thread::sleep;
    use std::time::Duration;
    let pool = ThreadPool::new(4, crate::utils::discard_logger()).unwrap();
    assert_eq!(pool.threads(), 4);
    let items: Vec<u64> = (0..32).collect();
    let result = pool.map(
        items,
        |i| {
            // later items finish first
            sleep(Duration::from_millis(32 - i));
            i * 10
        },
        &Progress::hidden(),
    );
    assert_eq!(result, (0..32).map(|i| i * 10).collect::<Vec<_>>());
}

#[test]
fn test_map_runs_on_pool_threads() {
    let pool = ThreadPool::new(3, crate::utils::discard_logger()).unwrap();
    let names = pool.map(
        vec![(); 12],
        |_| std::thread::current().name().map(str::to_string),
        &Progress::hidden(),
    );
    for name in names {
        assert!(name.unwrap().starts_with("parmap-"));
    }
}

#[test]
fn test_try_map_reports_index() {
    let pool = ThreadPool::new(2, crate::utils::discard_logger()).unwrap();
    let result = pool.try_map(
        vec![1, 2, 0, 4],
        |x: i32| 12i32.checked_div(x).ok_or("division by zero"),
        &Progress::hidden(),
    );
    assert_eq!(result, Err((2, "division by zero")));

    let result = pool.try_map(
        vec![1, 2, 3],
        |x: i32| 12i32.checked_div(x).ok_or("division by zero"),
        &Progress::hidden(),
    );
    assert_eq!(result, Ok(vec![12, 6, 4]));
}
