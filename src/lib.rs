//! Parallel map over a pool of threads (`tmap`) or a pool of worker
//! processes (`pmap`), with an optional progress bar.
#[macro_use]
extern crate slog;
extern crate slog_async;
extern crate slog_term;

extern crate anyhow;

mod error;
mod map;
mod options;
pub mod pool;
mod progress;
pub mod protocol;
mod task;
pub mod tasks;
pub mod utils;
mod worker;

pub use error::*;
pub use map::*;
pub use options::*;
pub use progress::Progress;
pub use task::Task;
pub use worker::{Registry, WORKER_ENV};
