//! Halt-then-start restart sequencing.
//!
//! The provider in effect is read once, before `halt`, and passed to `up`
//! explicitly so the machine never comes back on a different default
//! provider. The sequence stops at the first failing step and never
//! retries.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::process::{CommandRunner, OutputSink};
use crate::vagrant::Vagrant;

/// Restart progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPhase {
    Idle,
    Halting,
    Starting,
    Succeeded,
    Failed,
}

impl RestartPhase {
    /// Whether the sequence has finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, RestartPhase::Succeeded | RestartPhase::Failed)
    }

    /// Next phase after the current step exited with `exit_code`.
    fn advance(self, exit_code: i32) -> Self {
        match (self, exit_code) {
            (RestartPhase::Idle, _) => RestartPhase::Halting,
            (RestartPhase::Halting, 0) => RestartPhase::Starting,
            (RestartPhase::Starting, 0) => RestartPhase::Succeeded,
            (RestartPhase::Halting | RestartPhase::Starting, _) => RestartPhase::Failed,
            (terminal, _) => terminal,
        }
    }
}

impl std::fmt::Display for RestartPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestartPhase::Idle => write!(f, "idle"),
            RestartPhase::Halting => write!(f, "halting"),
            RestartPhase::Starting => write!(f, "starting"),
            RestartPhase::Succeeded => write!(f, "succeeded"),
            RestartPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Restart settings.
#[derive(Debug, Clone, Default)]
pub struct RestartOptions {
    /// Re-run provisioners on start (`up --provision`).
    pub provision: bool,
    /// Receives halt and start output as it is produced.
    pub sink: Option<OutputSink>,
}

/// Outcome of one restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartResult {
    /// Exit code of `halt`.
    pub halt_exit_code: i32,
    /// Exit code of `up`; absent when halt failed.
    pub start_exit_code: Option<i32>,
    /// Time from the first status query to the terminal phase.
    pub elapsed: Duration,
    /// Time spent in `halt`.
    pub halt_duration: Duration,
    /// Time spent in `up`.
    pub start_duration: Duration,
    /// Provider passed to `up`, when one was resolved.
    pub provider: Option<String>,
    /// Terminal phase.
    pub phase: RestartPhase,
    /// Both steps exited zero.
    pub success: bool,
}

impl RestartResult {
    /// Turn a failed restart into [`Error::StepFailed`] naming the step.
    pub fn check(&self) -> Result<()> {
        if self.success {
            return Ok(());
        }
        let (step, exit_code) = match self.start_exit_code {
            None => ("halt", self.halt_exit_code),
            Some(code) => ("start", code),
        };
        Err(Error::StepFailed {
            step: step.to_string(),
            exit_code,
        })
    }
}

/// Sequences `halt` and `up` for one environment.
pub struct RestartOrchestrator<'a, R> {
    vagrant: &'a Vagrant<R>,
    options: RestartOptions,
}

impl<'a, R: CommandRunner> RestartOrchestrator<'a, R> {
    /// Create an orchestrator over `vagrant`.
    pub fn new(vagrant: &'a Vagrant<R>, options: RestartOptions) -> Self {
        Self { vagrant, options }
    }

    /// Run the restart to a terminal phase.
    ///
    /// A non-zero exit from either step is reported in the result; only a
    /// failure to launch the tool is an error.
    pub async fn restart(&self) -> Result<RestartResult> {
        let started = Instant::now();
        let env = self.vagrant.env_path().display().to_string();

        let provider = self.vagrant.status().await?.provider;

        let mut phase = RestartPhase::Idle.advance(0);
        tracing::info!(env = %env, provider = ?provider, %phase, "restarting environment");

        let halt_started = Instant::now();
        let halt = self.vagrant.halt(self.options.sink.clone()).await?;
        let halt_duration = halt_started.elapsed();
        phase = phase.advance(halt.exit_code);

        if phase.is_terminal() {
            tracing::warn!(env = %env, exit_code = halt.exit_code, "halt failed, not starting");
            return Ok(RestartResult {
                halt_exit_code: halt.exit_code,
                start_exit_code: None,
                elapsed: started.elapsed(),
                halt_duration,
                start_duration: Duration::ZERO,
                provider,
                phase,
                success: false,
            });
        }

        tracing::debug!(env = %env, %phase, "halted");

        let start_started = Instant::now();
        let start = self
            .vagrant
            .up(
                provider.as_deref(),
                self.options.provision,
                self.options.sink.clone(),
            )
            .await?;
        let start_duration = start_started.elapsed();
        phase = phase.advance(start.exit_code);

        let elapsed = started.elapsed();
        if phase == RestartPhase::Succeeded {
            tracing::info!(env = %env, elapsed = ?elapsed, "environment restarted");
        } else {
            tracing::warn!(env = %env, exit_code = start.exit_code, "start failed");
        }

        Ok(RestartResult {
            halt_exit_code: halt.exit_code,
            start_exit_code: Some(start.exit_code),
            elapsed,
            halt_duration,
            start_duration,
            provider,
            phase,
            success: phase == RestartPhase::Succeeded,
        })
    }
}
