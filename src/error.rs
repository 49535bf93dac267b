use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result wrapper for ParmapError
pub type Result<T> = std::result::Result<T, ParmapError>;

/// Error type for parallel maps
#[derive(Error, Debug)]
pub enum ParmapError {
    /// IO error while talking to a worker process
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// Serde error on the worker wire format
    #[error("json serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// The rayon pool could not be built
    #[error("thread pool build error: {0}")]
    ThreadPoolBuild(#[from] rayon::ThreadPoolBuildError),
    /// The progress bar template is invalid
    #[error("progress template error: {0}")]
    Template(#[from] indicatif::style::TemplateError),
    /// A worker process could not be started
    #[error("failed to spawn worker {program:?}: {source}")]
    WorkerSpawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A worker process closed its stdout before answering
    #[error("worker {worker} exited unexpectedly")]
    WorkerExited { worker: usize },
    /// A worker refused the task it was handed
    #[error("worker {worker} rejected task: {message}")]
    WorkerRejected { worker: usize, message: String },
    /// The mapped function failed on one item
    #[error("task failed on item {index}: {message}")]
    Task { index: usize, message: String },
    /// A worker was asked for a task it has no handler for
    #[error("unknown task: {0}")]
    UnknownTask(String),
    /// A message arrived out of order
    #[error("protocol error: {0}")]
    Protocol(String),
    /// pmap was called from inside a worker process
    #[error("pmap called inside a worker process; call Registry::serve_if_worker at the start of main")]
    NestedWorker,
    #[error(transparent)]
    Other(#[from] anyhow::Error), // source and Display delegate to anyhow::Error
}
