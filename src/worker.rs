use std::any::Any;
use std::collections::HashMap;
use std::env;
use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::process;

use serde_json::Value;
use slog::Logger;

use crate::error::{ParmapError, Result};
use crate::protocol::{read_message, write_message, Request, Response};
use crate::task::Task;
use crate::utils::get_root_logger;

/// Set in the environment of every spawned worker process.
pub const WORKER_ENV: &str = "PARMAP_WORKER";

type Handler = fn(Value, &mut dyn BufRead, &mut dyn Write, &Logger) -> Result<()>;

/// The tasks a worker process can run.
///
/// ```rust,no_run
/// # use parmap::{Registry, tasks::ShiftedSquare};
/// fn main() {
///     Registry::new().register::<ShiftedSquare>().serve_if_worker();
///     // regular program from here on
/// }
/// ```
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<&'static str, Handler>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Task>(mut self) -> Self {
        self.handlers.insert(T::NAME, serve_task::<T>);
        self
    }

    pub fn is_worker() -> bool {
        env::var_os(WORKER_ENV).is_some()
    }

    /// Serves stdin/stdout and exits if this process was spawned as a worker.
    /// Returns immediately otherwise.
    pub fn serve_if_worker(&self) {
        if !Self::is_worker() {
            return;
        }
        let code = {
            let logger = get_root_logger(format!("parmap-worker-{}", process::id()), slog::Level::Warning);
            let stdin = io::stdin();
            // stdout is not held locked, tasks may print from any thread
            match self.serve(stdin.lock(), io::stdout(), &logger) {
                Ok(()) => 0,
                Err(e) => {
                    error!(logger, "worker stopped"; "err" => format!("{}", e));
                    1
                }
            }
            // logger dropped here so the async drain flushes before exit
        };
        process::exit(code);
    }

    /// Runs the worker side of the protocol until `reader` is exhausted.
    pub fn serve<R: BufRead, W: Write>(
        &self,
        mut reader: R,
        mut writer: W,
        logger: &Logger,
    ) -> Result<()> {
        while let Some(request) = read_message::<_, Request>(&mut reader)? {
            match request {
                Request::Init { task, args } => match self.handlers.get(task.as_str()) {
                    Some(handler) => {
                        debug!(logger, "serving task"; "task" => &task);
                        handler(args, &mut reader, &mut writer, logger)?;
                    }
                    None => {
                        let message = format!("unknown task: {}", task);
                        write_message(&mut writer, &Response::Fatal(message))?;
                        return Err(ParmapError::UnknownTask(task));
                    }
                },
                other => {
                    return Err(ParmapError::Protocol(format!(
                        "expected Init, got {:?}",
                        other
                    )))
                }
            }
        }
        Ok(())
    }
}

fn serve_task<T: Task>(
    args: Value,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
    logger: &Logger,
) -> Result<()> {
    let args: T::Args = match serde_json::from_value(args) {
        Ok(args) => args,
        Err(e) => {
            let message = format!("invalid arguments for {}: {}", T::NAME, e);
            write_message(&mut *writer, &Response::Fatal(message))?;
            return Err(e.into());
        }
    };
    write_message(&mut *writer, &Response::Ready)?;

    let mut done = 0usize;
    loop {
        match read_message::<_, Request>(&mut *reader)? {
            Some(Request::Job { index, input }) => {
                let response = match run_job::<T>(input, &args) {
                    Ok(output) => Response::Success { index, output },
                    Err(message) => {
                        warn!(logger, "job failed"; "task" => T::NAME, "index" => index, "err" => &message);
                        Response::Error { index, message }
                    }
                };
                write_message(&mut *writer, &response)?;
                done += 1;
            }
            Some(Request::Finish) | None => break,
            Some(other) => {
                return Err(ParmapError::Protocol(format!(
                    "unexpected {:?} while serving {}",
                    other,
                    T::NAME
                )))
            }
        }
    }
    debug!(logger, "task done"; "task" => T::NAME, "jobs" => done);
    Ok(())
}

fn run_job<T: Task>(input: Value, args: &T::Args) -> std::result::Result<Value, String> {
    let input: T::Input =
        serde_json::from_value(input).map_err(|e| format!("invalid input: {}", e))?;
    let output = panic::catch_unwind(AssertUnwindSafe(|| T::call(input, args)))
        .map_err(|payload| format!("task panicked: {}", panic_message(&*payload)))?
        .map_err(|e| format!("{:#}", e))?;
    serde_json::to_value(output).map_err(|e| format!("invalid output: {}", e))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
struct Halve;

#[cfg(test)]
impl Task for Halve {
    const NAME: &'static str = "halve";
    type Input = i64;
    type Output = i64;
    type Args = bool;

    fn call(input: i64, strict: &bool) -> anyhow::Result<i64> {
        if input == 13 {
            panic!("unlucky");
        }
        if *strict && input % 2 != 0 {
            anyhow::bail!("{} is odd", input);
        }
        Ok(input / 2)
    }
}

#[cfg(test)]
fn converse(registry: &Registry, requests: &[Request]) -> (Result<()>, Vec<Response>) {
    use std::io::Cursor;
    let mut input = Vec::new();
    for request in requests {
        write_message(&mut input, request).unwrap();
    }
    let mut output = Vec::new();
    let result = registry.serve(
        Cursor::new(input),
        &mut output,
        &crate::utils::discard_logger(),
    );
    let responses = output
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).unwrap())
        .collect();
    (result, responses)
}

#[test]
fn test_serves_jobs() {
    let registry = Registry::new().register::<Halve>();
    let (result, responses) = converse(
        &registry,
        &[
            Request::Init { task: "halve".into(), args: Value::Bool(false) },
            Request::Job { index: 0, input: Value::from(10) },
            Request::Job { index: 1, input: Value::from(7) },
            Request::Finish,
        ],
    );
    assert!(result.is_ok());
    assert_eq!(
        responses,
        vec![
            Response::Ready,
            Response::Success { index: 0, output: Value::from(5) },
            Response::Success { index: 1, output: Value::from(3) },
        ]
    );
}

#[test]
fn test_task_errors_keep_worker_alive() {
    let registry = Registry::new().register::<Halve>();
    let (result, responses) = converse(
        &registry,
        &[
            Request::Init { task: "halve".into(), args: Value::Bool(true) },
            Request::Job { index: 0, input: Value::from(3) },
            Request::Job { index: 1, input: Value::from(13) },
            Request::Job { index: 2, input: Value::from("four") },
            Request::Job { index: 3, input: Value::from(4) },
        ],
    );
    assert!(result.is_ok());
    assert_eq!(responses.len(), 5);
    assert_eq!(
        responses[1],
        Response::Error { index: 0, message: "3 is odd".into() }
    );
    match &responses[2] {
        Response::Error { index: 1, message } => assert!(message.contains("unlucky"), "{}", message),
        other => panic!("unexpected {:?}", other),
    }
    match &responses[3] {
        Response::Error { index: 2, message } => assert!(message.starts_with("invalid input")),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(responses[4], Response::Success { index: 3, output: Value::from(2) });
}

#[test]
fn test_serves_several_inits() {
    let registry = Registry::new().register::<Halve>();
    let (result, responses) = converse(
        &registry,
        &[
            Request::Init { task: "halve".into(), args: Value::Bool(false) },
            Request::Finish,
            Request::Init { task: "halve".into(), args: Value::Bool(false) },
            Request::Job { index: 0, input: Value::from(8) },
        ],
    );
    assert!(result.is_ok());
    assert_eq!(
        responses,
        vec![
            Response::Ready,
            Response::Ready,
            Response::Success { index: 0, output: Value::from(4) },
        ]
    );
}

#[test]
fn test_rejects_unknown_task() {
    let registry = Registry::new().register::<Halve>();
    let (result, responses) = converse(
        &registry,
        &[Request::Init { task: "double".into(), args: Value::Null }],
    );
    assert!(matches!(result, Err(ParmapError::UnknownTask(name)) if name == "double"));
    assert_eq!(responses, vec![Response::Fatal("unknown task: double".into())]);
}

#[test]
fn test_rejects_bad_args() {
    let registry = Registry::new().register::<Halve>();
    let (result, responses) = converse(
        &registry,
        &[Request::Init { task: "halve".into(), args: Value::from("yes") }],
    );
    assert!(matches!(result, Err(ParmapError::Serde(_))));
    assert!(matches!(&responses[0], Response::Fatal(message) if message.starts_with("invalid arguments for halve")));
}

#[test]
fn test_job_before_init() {
    let registry = Registry::new().register::<Halve>();
    let (result, responses) = converse(
        &registry,
        &[Request::Job { index: 0, input: Value::from(1) }],
    );
    assert!(matches!(result, Err(ParmapError::Protocol(_))));
    assert!(responses.is_empty());
}
