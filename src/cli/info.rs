//! Info command implementation.

use clap::Args;
use devhost::box_info::BoxInfoResolver;
use devhost::eol;
use devhost::util::display_path;

use super::Context;

/// Show box, guest OS and end-of-life information.
#[derive(Args, Debug)]
pub struct InfoCmd {
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

impl InfoCmd {
    /// Execute the info command.
    pub fn run(&self, ctx: &Context) -> devhost::Result<()> {
        let vagrant = ctx.vagrant()?;
        let info =
            super::block_on(BoxInfoResolver::new(&vagrant).resolve_environment(eol::today()))??;

        if self.json {
            return super::print_json(&info);
        }

        println!("Environment: {}", display_path(vagrant.env_path()));
        println!("State:       {}", info.state);
        if let Some(provider) = &info.provider {
            println!("Provider:    {}", provider);
        }

        match &info.box_info {
            Some(b) => println!("Box:         {} ({})", b.name, b.version),
            None => println!("Box:         unknown"),
        }

        match &info.guest_os {
            Some(os) if os.codename.is_empty() => {
                println!("Guest OS:    {} {}", os.name, os.version)
            }
            Some(os) => println!("Guest OS:    {} {} ({})", os.name, os.version, os.codename),
            None if info.state.is_running() => println!("Guest OS:    unreachable"),
            None => println!("Guest OS:    unavailable (machine is {})", info.state),
        }

        if info.eol == Some(true) {
            if let Some(os) = &info.guest_os {
                println!();
                println!(
                    "Warning: {} {} no longer receives security updates. Consider upgrading the box.",
                    os.name, os.version
                );
            }
        }
        Ok(())
    }
}
