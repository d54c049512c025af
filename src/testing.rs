//! Test doubles shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::process::{CommandRunner, Invocation, OutputLine, OutputSink, ProcessOutput};

enum Reply {
    Output {
        output: ProcessOutput,
        delay: Duration,
    },
    LaunchFailure,
}

/// Runner that answers from a script keyed by the first argument
/// (the Vagrant sub-command) and records every invocation.
#[derive(Default)]
pub struct ScriptedRunner {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next `subcommand` invocation.
    pub fn reply(self, subcommand: &str, exit_code: i32, stdout: &str) -> Self {
        self.reply_after(subcommand, exit_code, stdout, Duration::ZERO)
    }

    /// Queue a reply that is delivered after `delay`.
    pub fn reply_after(
        self,
        subcommand: &str,
        exit_code: i32,
        stdout: &str,
        delay: Duration,
    ) -> Self {
        let output = ProcessOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code,
        };
        self.push(subcommand, Reply::Output { output, delay })
    }

    /// Make the next `subcommand` invocation fail to launch.
    pub fn launch_failure(self, subcommand: &str) -> Self {
        self.push(subcommand, Reply::LaunchFailure)
    }

    /// Every invocation seen so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of invocations of `subcommand`.
    pub fn count(&self, subcommand: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.get_args().first().map(String::as_str) == Some(subcommand))
            .count()
    }

    /// Sub-commands invoked, in order.
    pub fn subcommands(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|c| c.get_args().first().cloned())
            .collect()
    }

    fn push(self, subcommand: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(subcommand.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    fn next_reply(&self, invocation: &Invocation) -> Reply {
        self.calls.lock().unwrap().push(invocation.clone());
        let subcommand = invocation.get_args().first().cloned().unwrap_or_default();
        self.replies
            .lock()
            .unwrap()
            .get_mut(&subcommand)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| panic!("unscripted invocation: {}", invocation.display()))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        match self.next_reply(invocation) {
            Reply::Output { output, delay } => {
                tokio::time::sleep(delay).await;
                Ok(output)
            }
            Reply::LaunchFailure => Err(Error::execution(
                invocation.program(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            )),
        }
    }

    async fn run_streaming(
        &self,
        invocation: &Invocation,
        sink: OutputSink,
    ) -> Result<ProcessOutput> {
        let output = self.run(invocation).await?;
        for line in output.stdout.lines() {
            let _ = sink.send(OutputLine::Stdout(line.to_string()));
        }
        Ok(output)
    }
}
