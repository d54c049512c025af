//! Status command implementation.

use clap::Args;
use devhost::util::display_path;

use super::Context;

/// Show the machine state.
#[derive(Args, Debug)]
pub struct StatusCmd {
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusCmd {
    /// Execute the status command.
    pub fn run(&self, ctx: &Context) -> devhost::Result<()> {
        let vagrant = ctx.vagrant()?;
        let status = super::block_on(vagrant.status())??;

        if self.json {
            return super::print_json(&status);
        }

        let env = display_path(vagrant.env_path());
        match &status.provider {
            Some(provider) => println!("{}: {} ({})", env, status.state, provider),
            None => println!("{}: {}", env, status.state),
        }
        Ok(())
    }
}
