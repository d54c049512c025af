//! Vagrant command layer.
//!
//! [`Vagrant`] builds every sub-command devhost issues against one
//! environment directory and hands it to a [`CommandRunner`]. Nothing else
//! in the crate spawns processes.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::process::{CommandRunner, Invocation, OutputSink, ProcessOutput};
use crate::status::{self, RunState};

/// Default name of the Vagrant executable.
pub const DEFAULT_BINARY: &str = "vagrant";

/// Command run inside the guest to identify its operating system.
pub const OS_RELEASE_COMMAND: &str = "cat /etc/os-release";

/// Result of one fresh status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Run state reported by the tool.
    pub state: RunState,
    /// Provider in effect, when reported.
    pub provider: Option<String>,
}

/// Vagrant CLI bound to one environment directory.
#[derive(Debug, Clone)]
pub struct Vagrant<R> {
    runner: R,
    binary: String,
    env_path: PathBuf,
    verbose: bool,
}

impl<R: CommandRunner> Vagrant<R> {
    /// Create a client for the environment at `env_path`.
    pub fn new(runner: R, env_path: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            binary: DEFAULT_BINARY.to_string(),
            env_path: env_path.into(),
            verbose: false,
        }
    }

    /// Use a different executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Report invocations and failed command output at info level.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Environment directory commands run in.
    pub fn env_path(&self) -> &Path {
        &self.env_path
    }

    /// Underlying runner.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Query the run state and provider. Always spawns a new status process.
    pub async fn status(&self) -> Result<StatusSnapshot> {
        let output = self
            .execute(self.invocation(["status", "--machine-readable"]), None)
            .await?;
        let snapshot = StatusSnapshot {
            state: status::parse_state(&output.stdout),
            provider: status::parse_provider(&output.stdout),
        };
        tracing::debug!(
            env = %self.env_path.display(),
            state = %snapshot.state,
            provider = ?snapshot.provider,
            "status queried"
        );
        Ok(snapshot)
    }

    /// Gracefully shut the machine down.
    pub async fn halt(&self, sink: Option<OutputSink>) -> Result<ProcessOutput> {
        self.execute(self.invocation(["halt"]), sink).await
    }

    /// Bring the machine up, pinning `provider` when given.
    pub async fn up(
        &self,
        provider: Option<&str>,
        provision: bool,
        sink: Option<OutputSink>,
    ) -> Result<ProcessOutput> {
        let mut invocation = self.invocation(["up"]);
        if let Some(provider) = provider {
            invocation = invocation.arg(format!("--provider={}", provider));
        }
        if provision {
            invocation = invocation.arg("--provision");
        }
        self.execute(invocation, sink).await
    }

    /// Run a shell command inside the guest.
    pub async fn ssh(&self, command: &str) -> Result<ProcessOutput> {
        let invocation = self.invocation(["ssh", "-c"]).arg(command);
        self.execute(invocation, None).await
    }

    /// Check whether the configured box is current; reports box name and version.
    pub async fn box_outdated(&self) -> Result<ProcessOutput> {
        self.execute(self.invocation(["box", "outdated"]), None)
            .await
    }

    fn invocation<const N: usize>(&self, args: [&str; N]) -> Invocation {
        Invocation::new(&self.binary)
            .args(args)
            .current_dir(&self.env_path)
    }

    async fn execute(
        &self,
        invocation: Invocation,
        sink: Option<OutputSink>,
    ) -> Result<ProcessOutput> {
        if self.verbose {
            tracing::info!(command = %invocation.display(), "running");
        }

        let output = match sink {
            Some(sink) => self.runner.run_streaming(&invocation, sink).await?,
            None => self.runner.run(&invocation).await?,
        };

        if self.verbose && !output.success() {
            tracing::info!(
                command = %invocation.display(),
                exit_code = output.exit_code,
                stderr = %output.stderr.trim_end(),
                "command failed"
            );
        }
        Ok(output)
    }
}
