//! Subprocess execution.
//!
//! This module runs external programs and captures their output. A
//! non-zero exit code is a normal [`ProcessOutput`]; only a failure to
//! launch the program at all is an error.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Exit code reported when the platform gives neither a code nor a signal.
const UNKNOWN_EXIT_CODE: i32 = -1;

/// A program invocation: executable, arguments and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl Invocation {
    /// Create an invocation of `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the program from `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Program name or path.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments, in order.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if set.
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Render as a shell-like string for logs.
    pub fn display(&self) -> String {
        let mut s = self.program.clone();
        for arg in &self.args {
            s.push(' ');
            if arg.contains(char::is_whitespace) {
                s.push_str(&format!("{:?}", arg));
            } else {
                s.push_str(arg);
            }
        }
        s
    }

    fn std_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn tokio_command(&self) -> tokio::process::Command {
        tokio::process::Command::from(self.std_command())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessOutput {
    /// Everything written to stdout.
    pub stdout: String,
    /// Everything written to stderr.
    pub stderr: String,
    /// Exit code; `128 + signal` when the process was killed by a signal.
    pub exit_code: i32,
}

impl ProcessOutput {
    /// Whether the process exited with code zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    fn from_std(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: exit_code(output.status),
        }
    }
}

/// One line of intermediate output from a streaming run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// Line written to stdout, without its terminator.
    Stdout(String),
    /// Line written to stderr, without its terminator.
    Stderr(String),
}

/// Receiver side for intermediate output of long-running operations.
pub type OutputSink = mpsc::UnboundedSender<OutputLine>;

/// Runs external programs.
///
/// The seam between the orchestration logic and the operating system;
/// tests substitute a scripted implementation.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture all output.
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput>;

    /// Run to completion, forwarding every line to `sink` as it arrives.
    ///
    /// The returned output still holds the complete stdout and stderr.
    async fn run_streaming(
        &self,
        invocation: &Invocation,
        sink: OutputSink,
    ) -> Result<ProcessOutput>;
}

/// [`CommandRunner`] backed by real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self
    }

    /// Run and wait on the calling thread.
    pub fn run_blocking(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        tracing::debug!(command = %invocation.display(), "running (blocking)");
        let output = invocation
            .std_command()
            .output()
            .map_err(|e| Error::execution(invocation.program(), e))?;
        Ok(ProcessOutput::from_std(output))
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        tracing::debug!(command = %invocation.display(), "running");
        let output = invocation
            .tokio_command()
            .output()
            .await
            .map_err(|e| Error::execution(invocation.program(), e))?;
        let output = ProcessOutput::from_std(output);
        tracing::debug!(
            command = %invocation.display(),
            exit_code = output.exit_code,
            "process exited"
        );
        Ok(output)
    }

    async fn run_streaming(
        &self,
        invocation: &Invocation,
        sink: OutputSink,
    ) -> Result<ProcessOutput> {
        tracing::debug!(command = %invocation.display(), "running (streaming)");
        let mut child = invocation
            .tokio_command()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::execution(invocation.program(), e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("stderr not captured")))?;

        let (stdout, stderr, status) = tokio::join!(
            pump(stdout, sink.clone(), OutputLine::Stdout),
            pump(stderr, sink, OutputLine::Stderr),
            child.wait(),
        );

        let output = ProcessOutput {
            stdout: stdout?,
            stderr: stderr?,
            exit_code: exit_code(status?),
        };
        tracing::debug!(
            command = %invocation.display(),
            exit_code = output.exit_code,
            "process exited"
        );
        Ok(output)
    }
}

/// Read `reader` to EOF, collecting it and forwarding each line.
async fn pump<R>(reader: R, sink: OutputSink, wrap: fn(String) -> OutputLine) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let chunk = String::from_utf8_lossy(&buf);
        captured.push_str(&chunk);
        // Receiver may have gone away; output is still collected.
        let _ = sink.send(wrap(chunk.trim_end_matches(&['\r', '\n'][..]).to_string()));
    }

    Ok(captured)
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => UNKNOWN_EXIT_CODE,
    }
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(UNKNOWN_EXIT_CODE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn test_invocation_display_quotes_whitespace() {
        let inv = Invocation::new("vagrant")
            .args(["ssh", "-c"])
            .arg("cat /etc/os-release");
        assert_eq!(inv.display(), "vagrant ssh -c \"cat /etc/os-release\"");
    }

    #[test]
    fn test_run_blocking_captures_both_streams() {
        let out = SystemRunner::new()
            .run_blocking(&sh("echo out; echo err >&2; exit 3"))
            .unwrap();
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[test]
    fn test_run_blocking_missing_program_is_execution_failure() {
        let err = SystemRunner::new()
            .run_blocking(&Invocation::new("/nonexistent/devhost-test-binary"))
            .unwrap_err();
        assert!(matches!(err, Error::ExecutionFailure { .. }));
    }

    #[tokio::test]
    async fn test_run_respects_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "here").unwrap();
        let out = SystemRunner::new()
            .run(&sh("cat marker").current_dir(dir.path()))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "here");
    }

    #[tokio::test]
    async fn test_run_captures_large_output() {
        let out = SystemRunner::new()
            .run(&sh("i=0; while [ $i -lt 20000 ]; do echo line-$i; i=$((i+1)); done"))
            .await
            .unwrap();
        assert_eq!(out.stdout.lines().count(), 20000);
        assert!(out.stdout.ends_with("line-19999\n"));
    }

    #[tokio::test]
    async fn test_run_missing_program_is_execution_failure() {
        let err = SystemRunner::new()
            .run(&Invocation::new("/nonexistent/devhost-test-binary"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExecutionFailure { ref program, .. } if program.contains("devhost-test-binary")));
    }

    #[tokio::test]
    async fn test_run_streaming_forwards_lines_and_collects_output() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let out = SystemRunner::new()
            .run_streaming(&sh("echo one; echo two >&2; echo three; exit 1"), tx)
            .await
            .unwrap();

        assert_eq!(out.stdout, "one\nthree\n");
        assert_eq!(out.stderr, "two\n");
        assert_eq!(out.exit_code, 1);

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        assert_eq!(lines.len(), 3);
        assert!(lines.contains(&OutputLine::Stdout("one".into())));
        assert!(lines.contains(&OutputLine::Stderr("two".into())));
        assert!(lines.contains(&OutputLine::Stdout("three".into())));
    }

    #[tokio::test]
    async fn test_run_streaming_survives_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let out = SystemRunner::new()
            .run_streaming(&sh("echo still-captured"), tx)
            .await
            .unwrap();
        assert_eq!(out.stdout, "still-captured\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_exit_code() {
        let out = SystemRunner::new().run(&sh("kill -9 $$")).await.unwrap();
        assert_eq!(out.exit_code, 128 + 9);
    }
}
