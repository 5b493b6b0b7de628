//! Stage process execution with streamed output.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Number of trailing stderr lines kept as the failure diagnostic.
pub const STDERR_TAIL_LINES: usize = 200;

/// A program and its argument vector. Never interpreted by a shell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invocation {
    /// Executable to run (looked up on PATH when it has no separator).
    pub program: String,

    /// Arguments passed verbatim.
    pub args: Vec<String>,

    /// Working directory; inherits the current one when unset.
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Result of running one invocation.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Exit code, `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,

    /// Last lines written to stderr (at most [`STDERR_TAIL_LINES`]).
    pub stderr_tail: Vec<String>,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the process exited with status zero.
    pub success: bool,
}

impl RunReport {
    /// Human-readable failure description: exit status then stderr tail.
    pub fn diagnostic(&self) -> String {
        let status = match self.exit_code {
            Some(code) => format!("exited with code {code}"),
            None => "terminated by signal".to_string(),
        };
        if self.stderr_tail.is_empty() {
            status
        } else {
            format!("{status}\n{}", self.stderr_tail.join("\n"))
        }
    }
}

/// Executes one external operation per call.
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Run `invocation` to completion.
    ///
    /// `Err` is reserved for failures to start or supervise the process;
    /// a process exiting non-zero is `Ok` with `success == false`.
    async fn run(&self, invocation: &Invocation) -> anyhow::Result<RunReport>;
}

/// [`StageRunner`] backed by `tokio::process`.
///
/// Stdout is logged line by line while the process runs. Stderr is read
/// concurrently into a bounded tail and logged only when the process fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl StageRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> anyhow::Result<RunReport> {
        let start = Instant::now();
        let program = invocation.program.as_str();

        let mut command = Command::new(program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn `{invocation}`"))?;
        let stdout = child.stdout.take().context("child stdout was not captured")?;
        let stderr = child.stderr.take().context("child stderr was not captured")?;

        let (status, streamed, tail) = tokio::join!(
            child.wait(),
            stream_lines(stdout, |line| info!(program, "{line}")),
            collect_tail(stderr, STDERR_TAIL_LINES),
        );
        let status = status.with_context(|| format!("failed to wait for `{program}`"))?;
        let stdout_lines =
            streamed.with_context(|| format!("failed to read stdout of `{program}`"))?;
        let stderr_tail = tail.with_context(|| format!("failed to read stderr of `{program}`"))?;

        let success = status.success();
        debug!(program, stdout_lines, exit_code = ?status.code(), "process finished");
        if !success {
            for line in &stderr_tail {
                warn!(program, "{line}");
            }
        }

        Ok(RunReport {
            exit_code: status.code(),
            stderr_tail,
            duration_ms: start.elapsed().as_millis() as u64,
            success,
        })
    }
}

/// Hand each line to `on_line` as soon as it is read; returns the line count.
async fn stream_lines<R, F>(reader: R, mut on_line: F) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut count = 0;
    while let Some(line) = next_line(&mut reader, &mut buf).await? {
        on_line(&line);
        count += 1;
    }
    Ok(count)
}

async fn collect_tail<R: AsyncRead + Unpin>(reader: R, limit: usize) -> io::Result<Vec<String>> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut tail = VecDeque::with_capacity(limit);
    while let Some(line) = next_line(&mut reader, &mut buf).await? {
        tail.push_back(line);
        if tail.len() > limit {
            tail.pop_front();
        }
    }
    Ok(tail.into())
}

/// Read one line, decoding invalid UTF-8 lossily.
async fn next_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}
