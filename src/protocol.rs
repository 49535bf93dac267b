// parent and workers exchange json, one message per line
use std::io::{BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum Request {
    /// Start serving `task`; every following job is called with `args`.
    Init { task: String, args: Value },
    Job { index: usize, input: Value },
    /// No more jobs for the current task.
    Finish,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum Response {
    Ready,
    /// The worker cannot serve the requested task.
    Fatal(String),
    Success { index: usize, output: Value },
    Error { index: usize, message: String },
}

pub fn write_message<W, M>(writer: &mut W, message: &M) -> Result<()>
where
    W: Write + ?Sized,
    M: Serialize,
{
    // a message always starts on a fresh line, whatever a task printed before it
    let mut line = vec![b'\n'];
    serde_json::to_writer(&mut line, message)?;
    line.push(b'\n');
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
}

/// Reads one message. `Ok(None)` means the other side closed the stream.
pub fn read_message<R, M>(reader: &mut R) -> Result<Option<M>>
where
    R: BufRead + ?Sized,
    M: DeserializeOwned,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            return Ok(Some(serde_json::from_str(&line)?));
        }
    }
}

#[test]
fn test_message_lines() {
    use std::io::Cursor;
    let mut buf = Vec::new();
    write_message(&mut buf, &Request::Job { index: 3, input: Value::from(7) }).unwrap();
    write_message(&mut buf, &Request::Finish).unwrap();
    assert_eq!(buf.iter().filter(|b| **b == b'\n').count(), 4);
    assert_eq!(buf[0], b'\n');

    let mut reader = Cursor::new(buf);
    let first: Option<Request> = read_message(&mut reader).unwrap();
    assert_eq!(first, Some(Request::Job { index: 3, input: Value::from(7) }));
    let second: Option<Request> = read_message(&mut reader).unwrap();
    assert_eq!(second, Some(Request::Finish));
    let eof: Option<Request> = read_message(&mut reader).unwrap();
    assert_eq!(eof, None);
}

#[test]
fn test_message_after_partial_line() {
    use std::io::Cursor;
    let mut buf = b"progress 1 ".to_vec();
    write_message(&mut buf, &Response::Ready).unwrap();
    let mut lines = Cursor::new(buf).lines();
    assert_eq!(lines.next().unwrap().unwrap(), "progress 1 ");
    let line = lines.next().unwrap().unwrap();
    assert_eq!(serde_json::from_str::<Response>(&line).unwrap(), Response::Ready);
}

#[test]
fn test_read_rejects_garbage() {
    use std::io::Cursor;
    let mut reader = Cursor::new(b"\nhello\n".to_vec());
    let result: Result<Option<Response>> = read_message(&mut reader);
    assert!(result.is_err());
}
