use std::fmt;
use std::time::Instant;

use crate::error::{ParmapError, Result};
use crate::options::MapOptions;
use crate::pool::{ProcessPool, ThreadPool};
use crate::progress::Progress;
use crate::task::Task;
use crate::worker::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Processes,
    Threads,
}

impl Backend {
    /// Whether the bar stays on screen when `MapOptions::leave` is unset.
    pub fn default_leave(self) -> bool {
        match self {
            Backend::Processes => true,
            Backend::Threads => false,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Processes => f.write_str("processes"),
            Backend::Threads => f.write_str("threads"),
        }
    }
}

/// Applies `T` to every item in a pool of worker processes and returns the
/// outputs in input order.
///
/// The worker program (the current executable unless configured otherwise)
/// must register `T` and call [`Registry::serve_if_worker`] at the start of
/// `main`.
pub fn pmap<T, I>(items: I, args: &T::Args, opts: &MapOptions) -> Result<Vec<T::Output>>
where
    T: Task,
    I: IntoIterator<Item = T::Input>,
{
    if Registry::is_worker() {
        return Err(ParmapError::NestedWorker);
    }
    let items: Vec<T::Input> = items.into_iter().collect();
    run_map(Backend::Processes, items.len(), opts, |progress| {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let (program, program_args) = opts.worker_command()?;
        let size = opts.worker_count().min(items.len());
        let mut pool = ProcessPool::new(program, program_args, size, opts.logger.clone())?;
        let outputs = pool.map::<T>(items, args, progress)?;
        pool.join()?;
        Ok(outputs)
    })
}

/// Applies `func` to every item on a pool of threads and returns the results
/// in input order. A panic in `func` is resumed on the calling thread.
pub fn tmap<T, R, F, I>(func: F, items: I, opts: &MapOptions) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Send + Sync,
    I: IntoIterator<Item = T>,
{
    let items: Vec<T> = items.into_iter().collect();
    run_map(Backend::Threads, items.len(), opts, |progress| {
        let pool = ThreadPool::new(opts.worker_count(), opts.logger.clone())?;
        Ok(pool.map(items, func, progress))
    })
}

/// `tmap` with extra arguments passed by reference to every call.
pub fn tmap_with<T, A, R, F, I>(func: F, items: I, args: A, opts: &MapOptions) -> Result<Vec<R>>
where
    T: Send,
    A: Sync,
    R: Send,
    F: Fn(T, &A) -> R + Send + Sync,
    I: IntoIterator<Item = T>,
{
    tmap(|item| func(item, &args), items, opts)
}

/// `tmap` for fallible functions. A failure is reported as
/// [`ParmapError::Task`] with the index of the failing item.
pub fn try_tmap<T, R, E, F, I>(func: F, items: I, opts: &MapOptions) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    E: Into<anyhow::Error> + Send,
    F: Fn(T) -> std::result::Result<R, E> + Send + Sync,
    I: IntoIterator<Item = T>,
{
    let items: Vec<T> = items.into_iter().collect();
    run_map(Backend::Threads, items.len(), opts, |progress| {
        let pool = ThreadPool::new(opts.worker_count(), opts.logger.clone())?;
        pool.try_map(items, func, progress)
            .map_err(|(index, err)| {
                let err: anyhow::Error = err.into();
                ParmapError::Task {
                    index,
                    message: format!("{:#}", err),
                }
            })
    })
}

fn run_map<R, F>(backend: Backend, len: usize, opts: &MapOptions, body: F) -> Result<Vec<R>>
where
    F: FnOnce(&Progress) -> Result<Vec<R>>,
{
    let logger = opts.logger.new(o!("backend" => backend.to_string()));
    let leave = opts.leave.unwrap_or_else(|| backend.default_leave());
    let progress = Progress::new(len, opts, leave)?;
    debug!(logger, "map started"; "items" => len, "workers" => opts.worker_count());
    let started = Instant::now();
    match body(&progress) {
        Ok(results) => {
            progress.finish();
            info!(logger, "map finished"; "items" => results.len(), "elapsed_ms" => started.elapsed().as_millis() as u64);
            Ok(results)
        }
        Err(e) => {
            progress.abandon();
            error!(logger, "map failed"; "err" => format!("{}", e));
            Err(e)
        }
    }
}

#[test]
fn test_default_leave() {
    assert!(Backend::Processes.default_leave());
    assert!(!Backend::Threads.default_leave());
    assert_eq!(Backend::Threads.to_string(), "threads");
}

#[test]
fn test_tmap_empty() {
    let result: Vec<i32> = tmap(|x: i32| x, Vec::new(), &MapOptions::new()).unwrap();
    assert!(result.is_empty());
}

#[test]
fn test_try_tmap_failure_index() {
    let err = try_tmap(
        |x: u32| {
            if x == 5 {
                Err(anyhow::anyhow!("five"))
            } else {
                Ok(x)
            }
        },
        0..8,
        &MapOptions::new().no_progress(true).workers(3),
    )
    .unwrap_err();
    match err {
        ParmapError::Task { index, message } => {
            assert_eq!(index, 5);
            assert_eq!(message, "five");
        }
        other => panic!("unexpected {:?}", other),
    }
}
