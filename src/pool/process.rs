use std::ffi::OsString;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::anyhow;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde_json::Value;
use slog::Logger;

use crate::error::{ParmapError, Result};
use crate::progress::Progress;
use crate::protocol::{write_message, Request, Response};
use crate::task::Task;
use crate::worker::WORKER_ENV;

enum Event {
    Done { index: usize, output: Value },
    Failed(ParmapError),
}

struct Worker {
    id: usize,
    child: Child,
    /// dropped to close the worker's stdin
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    logger: Logger,
}

/// Pool of worker processes.
///
/// Every worker is a copy of `program` started with `PARMAP_WORKER` set, so
/// the program must hand control to [`Registry::serve_if_worker`] before doing
/// anything else. Workers are killed when the pool is dropped.
///
/// [`Registry::serve_if_worker`]: crate::Registry::serve_if_worker
pub struct ProcessPool {
    workers: Vec<Worker>,
    logger: Logger,
}

impl ProcessPool {
    pub fn new(program: PathBuf, args: Vec<OsString>, size: usize, logger: Logger) -> Result<Self> {
        let mut workers = Vec::with_capacity(size);
        for id in 0..size.max(1) {
            let mut child = Command::new(&program)
                .args(&args)
                .env(WORKER_ENV, "1")
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .spawn()
                .map_err(|source| ParmapError::WorkerSpawn {
                    program: program.clone(),
                    source,
                })?;
            let stdin = child.stdin.take();
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| anyhow!("worker stdout was not captured"))?;
            let logger = logger.new(o!("worker" => id, "pid" => child.id()));
            debug!(logger, "worker started");
            workers.push(Worker {
                id,
                child,
                stdin,
                stdout: BufReader::new(stdout),
                logger,
            });
        }
        info!(logger, "process pool ready"; "workers" => workers.len(), "program" => format!("{:?}", program));
        Ok(Self { workers, logger })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Process ids of the workers, in spawn order.
    pub fn pids(&self) -> Vec<u32> {
        self.workers.iter().map(|worker| worker.child.id()).collect()
    }

    /// Runs `T` on every item across the workers and returns the outputs in
    /// input order. The first failure stops dispatching new items and is
    /// returned once in-flight items are done.
    pub fn map<T: Task>(
        &mut self,
        items: Vec<T::Input>,
        args: &T::Args,
        progress: &Progress,
    ) -> Result<Vec<T::Output>> {
        let len = items.len();
        let args = serde_json::to_value(args)?;
        let (job_tx, job_rx) = unbounded::<(usize, Value)>();
        for (index, item) in items.into_iter().enumerate() {
            job_tx
                .send((index, serde_json::to_value(item)?))
                .map_err(|_| anyhow!("job queue closed"))?;
        }
        drop(job_tx);

        let (event_tx, event_rx) = unbounded::<Event>();
        let abort = AtomicBool::new(false);
        let mut slots: Vec<Option<Value>> = vec![None; len];
        let mut failure: Option<ParmapError> = None;

        thread::scope(|s| {
            for worker in self.workers.iter_mut() {
                let jobs = job_rx.clone();
                let events = event_tx.clone();
                let abort = &abort;
                let args = &args;
                s.spawn(move || {
                    if let Err(e) = worker.run(T::NAME, args, &jobs, &events, abort) {
                        abort.store(true, Ordering::SeqCst);
                        let _ = events.send(Event::Failed(e));
                    }
                });
            }
            drop(event_tx);

            for event in event_rx.iter() {
                match event {
                    Event::Done { index, output } => {
                        slots[index] = Some(output);
                        progress.inc();
                    }
                    Event::Failed(e) => {
                        error!(self.logger, "worker failed"; "task" => T::NAME, "err" => format!("{}", e));
                        if failure.is_none() {
                            failure = Some(e);
                        }
                    }
                }
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                let output = slot
                    .ok_or_else(|| ParmapError::Protocol(format!("no result for item {}", index)))?;
                Ok(serde_json::from_value(output)?)
            })
            .collect()
    }

    /// Closes every worker's stdin and waits for it to exit.
    pub fn join(mut self) -> Result<()> {
        for worker in self.workers.iter_mut() {
            worker.stdin.take();
            let status = worker.child.wait()?;
            debug!(worker.logger, "worker exited"; "status" => format!("{}", status));
        }
        self.workers.clear();
        Ok(())
    }
}

impl Drop for ProcessPool {
    fn drop(&mut self) {
        for worker in self.workers.iter_mut() {
            worker.stdin.take();
            if let Ok(None) = worker.child.try_wait() {
                let _ = worker.child.kill();
            }
            let _ = worker.child.wait();
        }
    }
}

impl Worker {
    fn run(
        &mut self,
        task: &str,
        args: &Value,
        jobs: &Receiver<(usize, Value)>,
        events: &Sender<Event>,
        abort: &AtomicBool,
    ) -> Result<()> {
        self.send(&Request::Init {
            task: task.to_string(),
            args: args.clone(),
        })?;
        match self.recv()? {
            Response::Ready => {}
            Response::Fatal(message) => {
                return Err(ParmapError::WorkerRejected {
                    worker: self.id,
                    message,
                })
            }
            other => return Err(self.unexpected(other)),
        }

        let mut done = 0usize;
        while !abort.load(Ordering::SeqCst) {
            let (index, input) = match jobs.recv() {
                Ok(job) => job,
                Err(_) => break,
            };
            self.send(&Request::Job { index, input })?;
            match self.recv()? {
                Response::Success { index: answered, output } if answered == index => {
                    done += 1;
                    let _ = events.send(Event::Done { index, output });
                }
                Response::Error { index: answered, message } if answered == index => {
                    // back to waiting for Init, so the pool stays usable
                    self.send(&Request::Finish)?;
                    return Err(ParmapError::Task { index, message });
                }
                other => return Err(self.unexpected(other)),
            }
        }
        self.send(&Request::Finish)?;
        debug!(self.logger, "worker idle"; "task" => task, "jobs" => done);
        Ok(())
    }

    fn send(&mut self, request: &Request) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or(ParmapError::WorkerExited { worker: self.id })?;
        write_message(stdin, request)
    }

    /// Next protocol message from the worker. Lines that are not protocol
    /// messages were printed by the task itself and are skipped.
    fn recv(&mut self) -> Result<Response> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.stdout.read_line(&mut line)? == 0 {
                return Err(ParmapError::WorkerExited { worker: self.id });
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Response>(trimmed) {
                Ok(response) => return Ok(response),
                Err(_) => {
                    warn!(self.logger, "ignoring worker output"; "line" => trimmed.to_string());
                }
            }
        }
    }

    fn unexpected(&self, response: Response) -> ParmapError {
        ParmapError::Protocol(format!(
            "worker {} sent unexpected {:?}",
            self.id, response
        ))
    }
}
