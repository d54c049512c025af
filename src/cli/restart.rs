//! Restart command implementation.

use clap::Args;
use devhost::process::OutputLine;
use devhost::restart::{RestartOptions, RestartOrchestrator};
use devhost::util::format_elapsed;
use tokio::sync::mpsc;

use super::Context;

/// Halt the machine and bring it back up on the same provider.
#[derive(Args, Debug)]
pub struct RestartCmd {
    /// Re-run provisioners while starting.
    #[arg(long)]
    pub provision: bool,

    /// Do not echo Vagrant output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Output the result as JSON (implies --quiet).
    #[arg(long)]
    pub json: bool,
}

impl RestartCmd {
    /// Execute the restart command.
    pub fn run(&self, ctx: &Context) -> devhost::Result<()> {
        let vagrant = ctx.vagrant()?;
        let provision = self.provision || ctx.config.provision_on_restart;
        let echo = !self.quiet && !self.json;

        let result = super::block_on(async {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let printer = tokio::spawn(async move {
                while let Some(line) = rx.recv().await {
                    match line {
                        OutputLine::Stdout(l) if echo => println!("{}", l),
                        OutputLine::Stderr(l) if echo => eprintln!("{}", l),
                        _ => {}
                    }
                }
            });

            let options = RestartOptions {
                provision,
                sink: Some(tx),
            };
            let orchestrator = RestartOrchestrator::new(&vagrant, options);
            let result = orchestrator.restart().await;

            // Close the channel so the printer drains and exits.
            drop(orchestrator);
            let _ = printer.await;
            result
        })??;

        if self.json {
            super::print_json(&result)?;
        } else if result.success {
            println!("Restarted in {}", format_elapsed(result.elapsed));
        } else if result.start_exit_code.is_none() {
            eprintln!(
                "Machine was not started ({} elapsed)",
                format_elapsed(result.elapsed)
            );
        }

        result.check()
    }
}
