//! devhost CLI entry point.

use clap::{Parser, Subcommand};
use devhost::config::DevhostConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cli;

/// devhost - Vagrant development environment orchestrator
#[derive(Parser, Debug)]
#[command(name = "devhost")]
#[command(about = "Vagrant development environment orchestrator")]
#[command(version)]
struct Cli {
    /// Environment directory (defaults to the configured one, then the current directory).
    #[arg(long, global = true)]
    env: Option<PathBuf>,

    /// Report every Vagrant invocation.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the machine state.
    Status(cli::status::StatusCmd),

    /// Show box, guest OS and end-of-life information.
    Info(cli::info::InfoCmd),

    /// Halt the machine and bring it back up on the same provider.
    Restart(cli::restart::RestartCmd),

    /// List, enable or disable extension provisioners.
    #[command(subcommand)]
    #[command(alias = "ext")]
    Extension(cli::extension::ExtensionCmd),

    /// Show or change devhost settings.
    #[command(subcommand)]
    Config(cli::config::ConfigCmd),
}

fn main() {
    let cli = Cli::parse();

    // Load configuration first so its verbosity applies to logging
    let loaded = DevhostConfig::load();
    let verbose = cli.verbose || loaded.as_ref().is_ok_and(|c| c.verbose);

    // Initialize logging based on RUST_LOG or default to warn
    init_logging(verbose);

    tracing::debug!(version = devhost::VERSION, "starting devhost");

    let config = match loaded {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            DevhostConfig::default()
        }
    };

    let ctx = cli::Context {
        verbose,
        config,
        env: cli.env,
    };

    // Execute command
    let result = match cli.command {
        Commands::Status(cmd) => cmd.run(&ctx),
        Commands::Info(cmd) => cmd.run(&ctx),
        Commands::Restart(cmd) => cmd.run(&ctx),
        Commands::Extension(cmd) => cmd.run(&ctx),
        Commands::Config(cmd) => cmd.run(ctx.config),
    };

    // Handle errors
    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        if !e.is_user_actionable() && !verbose {
            eprintln!("Run again with --verbose for details.");
        }
        std::process::exit(1);
    }
}

/// Filter used when `RUST_LOG` is not set.
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "devhost=debug"
    } else {
        "devhost=warn"
    }
}

/// Initialize the tracing subscriber.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false), "devhost=warn");
        assert_eq!(default_filter(true), "devhost=debug");
    }

    #[test]
    fn test_global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["devhost", "restart", "--verbose", "--env", "/srv/env"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.env, Some(PathBuf::from("/srv/env")));
        assert!(matches!(cli.command, Commands::Restart(_)));
    }
}
