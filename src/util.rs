//! Shared utility functions.

use std::path::Path;
use std::time::Duration;

/// Display `path` with the home directory replaced by `~`.
pub fn display_path(path: &Path) -> String {
    match dirs::home_dir() {
        Some(home) => shorten_home(path, &home),
        None => path.display().to_string(),
    }
}

fn shorten_home(path: &Path, home: &Path) -> String {
    match path.strip_prefix(home) {
        Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Ok(rest) => format!("~/{}", rest.display()),
        Err(_) => path.display().to_string(),
    }
}

/// Format a duration for humans, rounded to whole seconds.
///
/// Returns e.g. "1m 5s"; sub-second durations show as "0s".
pub fn format_elapsed(elapsed: Duration) -> String {
    humantime::format_duration(Duration::from_secs(elapsed.as_secs())).to_string()
}
