//! Global devhost configuration.
//!
//! Settings are stored with `confy` under the platform config directory
//! (`~/.config/devhost/` on Linux). A missing file means defaults.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name for config file storage.
const APP_NAME: &str = "devhost";

/// Environment variable overriding the Vagrant executable.
pub const BINARY_ENV: &str = "DEVHOST_VAGRANT";

/// Default location of the extension document, relative to the environment.
pub const DEFAULT_EXTENSIONS_FILE: &str = "config/config.yml";

/// Global devhost configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevhostConfig {
    /// Configuration format version.
    pub version: u8,

    /// Vagrant executable name or path.
    pub vagrant_binary: String,

    /// Environment directory used when none is given on the command line.
    pub environment: Option<PathBuf>,

    /// Extension document, relative to the environment directory.
    pub extensions_file: PathBuf,

    /// Report every Vagrant invocation.
    pub verbose: bool,

    /// Re-run provisioners when restarting.
    pub provision_on_restart: bool,
}

impl Default for DevhostConfig {
    fn default() -> Self {
        Self {
            version: 1,
            vagrant_binary: crate::vagrant::DEFAULT_BINARY.to_string(),
            environment: None,
            extensions_file: PathBuf::from(DEFAULT_EXTENSIONS_FILE),
            verbose: false,
            provision_on_restart: false,
        }
    }
}

impl DevhostConfig {
    /// Default config file location.
    pub fn default_path() -> Result<PathBuf> {
        confy::get_configuration_file_path(APP_NAME, None)
            .map_err(|e| Error::ConfigLoad(e.to_string()))
    }

    /// Load configuration from disk and apply environment overrides.
    pub fn load() -> Result<Self> {
        Ok(Self::load_stored()?.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Load configuration from disk as stored, without overrides.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    pub fn load_stored() -> Result<Self> {
        let config: Self =
            confy::load(APP_NAME, None).map_err(|e| Error::ConfigLoad(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to disk.
    pub fn save(&self) -> Result<()> {
        confy::store(APP_NAME, None, self).map_err(|e| Error::ConfigSave(e.to_string()))
    }

    /// Load configuration from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Self = confy::load_path(path)
            .map_err(|e| Error::ConfigLoad(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        confy::store_path(path, self)
            .map_err(|e| Error::ConfigSave(format!("{}: {}", path.display(), e)))
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(binary) = lookup(BINARY_ENV).filter(|b| !b.trim().is_empty()) {
            tracing::debug!(binary = %binary, "vagrant binary overridden from environment");
            self.vagrant_binary = binary;
        }
        self
    }

    /// Set one setting by name, as given on the command line.
    ///
    /// The configuration is unchanged when the value is rejected.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        match key {
            "vagrant_binary" => updated.vagrant_binary = value.to_string(),
            "environment" => {
                updated.environment = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            "extensions_file" => updated.extensions_file = PathBuf::from(value),
            "verbose" => updated.verbose = parse_bool(key, value)?,
            "provision_on_restart" => updated.provision_on_restart = parse_bool(key, value)?,
            _ => return Err(Error::config(format!("unknown setting: {}", key))),
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Resolve the environment directory: explicit argument, then the
    /// configured default, then the current directory.
    pub fn environment_dir(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit.or(self.environment.as_deref()) {
            Some(dir) => Ok(dir.to_path_buf()),
            None => Ok(std::env::current_dir()?),
        }
    }

    /// Extension document for the environment at `env_dir`.
    pub fn extensions_path(&self, env_dir: &Path) -> PathBuf {
        env_dir.join(&self.extensions_file)
    }

    fn validate(&self) -> Result<()> {
        if self.vagrant_binary.trim().is_empty() {
            return Err(Error::config("vagrant_binary cannot be empty"));
        }
        if self.extensions_file.as_os_str().is_empty() {
            return Err(Error::config("extensions_file cannot be empty"));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(Error::config(format!(
            "{} expects true or false, got '{}'",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = DevhostConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, DevhostConfig::default());
        assert_eq!(config.vagrant_binary, "vagrant");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = DevhostConfig::default();
        config.set("environment", "/srv/www/env").unwrap();
        config.set("verbose", "yes").unwrap();
        config.save_to(&path).unwrap();

        let loaded = DevhostConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.environment, Some(PathBuf::from("/srv/www/env")));
        assert!(loaded.verbose);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "provision_on_restart = true\n").unwrap();

        let config = DevhostConfig::load_from(&path).unwrap();
        assert!(config.provision_on_restart);
        assert_eq!(config.extensions_file, PathBuf::from(DEFAULT_EXTENSIONS_FILE));
    }

    #[test]
    fn test_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "verbose = \"sometimes\"\n").unwrap();
        assert!(matches!(
            DevhostConfig::load_from(&path),
            Err(Error::ConfigLoad(_))
        ));

        std::fs::write(&path, "vagrant_binary = \"\"\n").unwrap();
        assert!(matches!(DevhostConfig::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut config = DevhostConfig::default();
        assert!(config.set("colour", "blue").is_err());
        assert!(config.set("verbose", "perhaps").is_err());
        assert!(config.set("vagrant_binary", " ").is_err());
        assert!(config.set("extensions_file", "").is_err());
        assert_eq!(config, DevhostConfig::default());

        config.set("environment", "").unwrap();
        assert_eq!(config.environment, None);
    }

    #[test]
    fn test_rejected_value_does_not_block_later_sets() {
        let mut config = DevhostConfig::default();
        config.set("vagrant_binary", "/usr/local/bin/vagrant").unwrap();

        assert!(matches!(
            config.set("vagrant_binary", " "),
            Err(Error::Config(_))
        ));
        assert_eq!(config.vagrant_binary, "/usr/local/bin/vagrant");

        config.set("provision_on_restart", "on").unwrap();
        assert!(config.provision_on_restart);
    }

    #[test]
    fn test_binary_override() {
        let config = DevhostConfig::default().with_overrides(|key| {
            (key == BINARY_ENV).then(|| "/opt/vagrant/bin/vagrant".to_string())
        });
        assert_eq!(config.vagrant_binary, "/opt/vagrant/bin/vagrant");

        let config = DevhostConfig::default().with_overrides(|_| Some(String::new()));
        assert_eq!(config.vagrant_binary, "vagrant");
    }

    #[test]
    fn test_environment_dir_precedence() {
        let mut config = DevhostConfig::default();
        config.environment = Some(PathBuf::from("/srv/configured"));

        assert_eq!(
            config.environment_dir(Some(Path::new("/srv/explicit"))).unwrap(),
            PathBuf::from("/srv/explicit")
        );
        assert_eq!(
            config.environment_dir(None).unwrap(),
            PathBuf::from("/srv/configured")
        );

        config.environment = None;
        assert_eq!(
            config.environment_dir(None).unwrap(),
            std::env::current_dir().unwrap()
        );
        assert_eq!(
            config.extensions_path(Path::new("/srv/env")),
            PathBuf::from("/srv/env/config/config.yml")
        );
    }
}
