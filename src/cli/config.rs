//! Config command implementation.

use clap::{Args, Subcommand};
use devhost::config::DevhostConfig;
use devhost::util::display_path;

/// Show or change devhost settings.
#[derive(Subcommand, Debug)]
pub enum ConfigCmd {
    /// Print the effective settings.
    Show,

    /// Change one setting and save it.
    Set(SetCmd),
}

/// Change one setting.
#[derive(Args, Debug)]
pub struct SetCmd {
    /// Setting name (vagrant_binary, environment, extensions_file, verbose, provision_on_restart).
    pub key: String,

    /// New value; an empty environment clears it.
    pub value: String,
}

impl ConfigCmd {
    /// Execute the config command; `config` is the effective configuration.
    pub fn run(self, config: DevhostConfig) -> devhost::Result<()> {
        match self {
            ConfigCmd::Show => {
                let text = toml::to_string_pretty(&config)
                    .map_err(|e| devhost::Error::config(e.to_string()))?;
                if let Ok(path) = DevhostConfig::default_path() {
                    println!("# {}", display_path(&path));
                }
                print!("{}", text);
                Ok(())
            }
            ConfigCmd::Set(cmd) => {
                // Environment overrides must not end up in the stored file.
                let mut stored = DevhostConfig::load_stored()?;
                stored.set(&cmd.key, &cmd.value)?;
                stored.save()?;
                println!("{} = {}", cmd.key, cmd.value);
                Ok(())
            }
        }
    }
}
