use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use slog::Logger;

use crate::error::Result;
use crate::utils::{default_workers, discard_logger};

/// Settings shared by `pmap` and `tmap`.
///
/// ```rust
/// # use parmap::MapOptions;
/// let opts = MapOptions::new().desc("squares").unit("n").workers(4);
/// ```
#[derive(Clone)]
pub struct MapOptions {
    pub no_progress: bool,
    pub desc: Option<String>,
    pub unit: String,
    /// Draw the bar even when stderr is not a terminal.
    pub force_terminal: bool,
    /// Keep the bar on screen after completion. `None` picks the backend's
    /// default: kept for processes, cleared for threads.
    pub leave: Option<bool>,
    pub workers: Option<usize>,
    /// Program spawned for process workers, the current executable if unset.
    pub worker_program: Option<PathBuf>,
    pub worker_args: Vec<OsString>,
    pub logger: Logger,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            no_progress: false,
            desc: None,
            unit: "it".to_string(),
            force_terminal: false,
            leave: None,
            workers: None,
            worker_program: None,
            worker_args: Vec::new(),
            logger: discard_logger(),
        }
    }
}

impl MapOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_progress(mut self, no_progress: bool) -> Self {
        self.no_progress = no_progress;
        self
    }

    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn force_terminal(mut self, force_terminal: bool) -> Self {
        self.force_terminal = force_terminal;
        self
    }

    pub fn leave(mut self, leave: bool) -> Self {
        self.leave = Some(leave);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(program.into());
        self
    }

    pub fn worker_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.worker_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(default_workers).max(1)
    }

    pub fn worker_command(&self) -> Result<(PathBuf, Vec<OsString>)> {
        let program = match &self.worker_program {
            Some(program) => program.clone(),
            None => env::current_exe()?,
        };
        Ok((program, self.worker_args.clone()))
    }
}

#[test]
fn test_defaults() {
    let opts = MapOptions::default();
    assert!(!opts.no_progress);
    assert_eq!(opts.unit, "it");
    assert_eq!(opts.desc, None);
    assert_eq!(opts.leave, None);
    assert!(opts.worker_count() >= 1);
}

#[test]
fn test_builder() {
    let opts = MapOptions::new()
        .desc("squares")
        .unit("sq")
        .leave(false)
        .force_terminal(true)
        .workers(0)
        .worker_program("/bin/worker")
        .worker_args(["--quiet"]);
    assert_eq!(opts.desc.as_deref(), Some("squares"));
    assert_eq!(opts.unit, "sq");
    assert_eq!(opts.leave, Some(false));
    assert!(opts.force_terminal);
    // zero workers still makes a usable pool
    assert_eq!(opts.worker_count(), 1);
    let (program, args) = opts.worker_command().unwrap();
    assert_eq!(program, PathBuf::from("/bin/worker"));
    assert_eq!(args, vec![OsString::from("--quiet")]);
}
