//! Extension command implementation.

use clap::{Args, Subcommand};
use devhost::extensions::ExtensionConfigMutator;
use devhost::util::display_path;
use std::path::PathBuf;

use super::Context;

/// List, enable or disable extension provisioners.
#[derive(Subcommand, Debug)]
pub enum ExtensionCmd {
    /// List extension provisioners and whether they are enabled.
    #[command(alias = "ls")]
    List(ListCmd),

    /// Enable a provisioner.
    Enable(ToggleCmd),

    /// Disable a provisioner.
    Disable(ToggleCmd),
}

/// Document selection shared by extension commands.
#[derive(Args, Debug)]
pub struct DocumentArgs {
    /// Configuration document (defaults to the environment's).
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl DocumentArgs {
    fn mutator(&self, ctx: &Context) -> devhost::Result<ExtensionConfigMutator> {
        let path = match &self.file {
            Some(file) => file.clone(),
            None => ctx.config.extensions_path(&ctx.env_dir()?),
        };
        Ok(ExtensionConfigMutator::new(path))
    }
}

/// List extension provisioners.
#[derive(Args, Debug)]
pub struct ListCmd {
    #[command(flatten)]
    pub document: DocumentArgs,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Enable or disable one provisioner.
#[derive(Args, Debug)]
pub struct ToggleCmd {
    /// Extension name.
    pub extension: String,

    /// Provisioner name within the extension.
    pub provisioner: String,

    #[command(flatten)]
    pub document: DocumentArgs,
}

impl ExtensionCmd {
    pub fn run(self, ctx: &Context) -> devhost::Result<()> {
        match self {
            ExtensionCmd::List(cmd) => cmd.run(ctx),
            ExtensionCmd::Enable(cmd) => cmd.run(ctx, true),
            ExtensionCmd::Disable(cmd) => cmd.run(ctx, false),
        }
    }
}

impl ListCmd {
    fn run(&self, ctx: &Context) -> devhost::Result<()> {
        let mutator = self.document.mutator(ctx)?;
        let entries = mutator.list_entries()?;

        if self.json {
            return super::print_json(&entries);
        }

        if entries.is_empty() {
            println!("No extensions in {}", display_path(mutator.path()));
            return Ok(());
        }

        println!("{:<20} {:<24} {:<8}", "EXTENSION", "PROVISIONER", "ENABLED");
        println!("{}", "-".repeat(54));
        for entry in entries {
            println!(
                "{:<20} {:<24} {:<8}",
                entry.extension,
                entry.provisioner,
                if entry.enabled { "yes" } else { "no" }
            );
        }
        Ok(())
    }
}

impl ToggleCmd {
    fn run(&self, ctx: &Context, enabled: bool) -> devhost::Result<()> {
        let mutator = self.document.mutator(ctx)?;
        let changed = mutator.set_enabled(&self.extension, &self.provisioner, enabled)?;
        let verb = if enabled { "enabled" } else { "disabled" };

        if changed {
            println!("{}/{} {}", self.extension, self.provisioner, verb);
            println!("Run `devhost restart --provision` to apply.");
        } else {
            println!("{}/{} already {}", self.extension, self.provisioner, verb);
        }
        Ok(())
    }
}
