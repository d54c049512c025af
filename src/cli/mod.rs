//! CLI command implementations.

pub mod config;
pub mod extension;
pub mod info;
pub mod restart;
pub mod status;

use devhost::config::DevhostConfig;
use devhost::process::SystemRunner;
use devhost::vagrant::Vagrant;
use std::path::PathBuf;

/// State shared by every command.
pub struct Context {
    /// Loaded settings.
    pub config: DevhostConfig,
    /// Environment directory given on the command line.
    pub env: Option<PathBuf>,
    /// Report every Vagrant invocation.
    pub verbose: bool,
}

impl Context {
    /// Environment directory this invocation operates on.
    pub fn env_dir(&self) -> devhost::Result<PathBuf> {
        self.config.environment_dir(self.env.as_deref())
    }

    /// Vagrant client for the environment.
    pub fn vagrant(&self) -> devhost::Result<Vagrant<SystemRunner>> {
        Ok(Vagrant::new(SystemRunner::new(), self.env_dir()?)
            .with_binary(&self.config.vagrant_binary)
            .verbose(self.verbose))
    }
}

/// Run `fut` to completion on a fresh runtime.
pub fn block_on<F: std::future::Future>(fut: F) -> devhost::Result<F::Output> {
    let runtime = tokio::runtime::Runtime::new().map_err(devhost::Error::Io)?;
    Ok(runtime.block_on(fut))
}

/// Print `value` as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> devhost::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| devhost::Error::config(format!("failed to encode JSON: {}", e)))?;
    println!("{}", json);
    Ok(())
}
