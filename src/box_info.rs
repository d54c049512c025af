//! Box and guest OS identity.
//!
//! Each output shape the tool can produce has its own pure parser so a
//! change in upstream wording touches one function. The resolver only
//! decides which commands to run and when.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use crate::eol;
use crate::error::Result;
use crate::process::CommandRunner;
use crate::status::RunState;
use crate::vagrant::{StatusSnapshot, Vagrant, OS_RELEASE_COMMAND};

/// Base box the environment was created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoxInfo {
    /// Box name, e.g. `bento/ubuntu-22.04`.
    pub name: String,
    /// Installed box version.
    pub version: String,
    /// Provider the box is used with.
    pub provider: String,
}

/// Operating system running inside the guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuestOsInfo {
    /// Distribution name, e.g. `Ubuntu`.
    pub name: String,
    /// Version identifier, e.g. `22.04`.
    pub version: String,
    /// Release codename, e.g. `jammy`; empty when not reported.
    pub codename: String,
}

/// Everything known about an environment from one status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentInfo {
    /// Run state at query time.
    pub state: RunState,
    /// Provider reported by the status query.
    pub provider: Option<String>,
    /// Configured box, if any.
    pub box_info: Option<BoxInfo>,
    /// Guest OS, only when running and reachable.
    pub guest_os: Option<GuestOsInfo>,
    /// Whether the guest OS is end-of-life; `None` without guest OS info.
    pub eol: Option<bool>,
}

/// Partial box identity parsed from one output shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBox {
    pub name: String,
    pub version: String,
    pub provider: Option<String>,
}

static UI_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:==>|\s+)\s*[A-Za-z0-9_.-]+:\s+").expect("valid regex"));

static CHECKING_BOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Checking if box '(?P<name>[^']+)' version '(?P<version>[^']+)' is up to date")
        .expect("valid regex")
});

static NEWER_BOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"newer version of the box '(?P<name>[^']+)' for provider '(?P<provider>[^']+)' is available! You currently have version '(?P<version>[^']+)'",
    )
    .expect("valid regex")
});

static PAREN_CODENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((?P<codename>[A-Za-z]+)").expect("valid regex"));

/// Join wrapped UI output into one line, dropping `==> default:` prefixes.
fn normalize_ui_output(raw: &str) -> String {
    let lines: Vec<String> = raw
        .lines()
        .map(|line| UI_PREFIX.replace(line.trim_end(), "").into_owned())
        .collect();
    lines
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse `Checking if box 'NAME' version 'VERSION' is up to date...`.
pub fn parse_checking_box(raw: &str) -> Option<ParsedBox> {
    let text = normalize_ui_output(raw);
    let caps = CHECKING_BOX.captures(&text)?;
    Some(ParsedBox {
        name: caps["name"].to_string(),
        version: caps["version"].to_string(),
        provider: None,
    })
}

/// Parse `A newer version of the box 'NAME' for provider 'PROVIDER' is
/// available! You currently have version 'VERSION'.`
pub fn parse_newer_box(raw: &str) -> Option<ParsedBox> {
    let text = normalize_ui_output(raw);
    let caps = NEWER_BOX.captures(&text)?;
    Some(ParsedBox {
        name: caps["name"].to_string(),
        version: caps["version"].to_string(),
        provider: Some(caps["provider"].to_string()),
    })
}

/// Parse `/etc/os-release` content.
///
/// Requires `NAME`; the version comes from `VERSION_ID`, the codename from
/// `VERSION_CODENAME`, `UBUNTU_CODENAME` or the parenthesised part of
/// `VERSION`, in that order.
pub fn parse_os_release(raw: &str) -> Option<GuestOsInfo> {
    let mut name = None;
    let mut version_id = None;
    let mut version = None;
    let mut codename = None;
    let mut ubuntu_codename = None;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = unquote(value);
        match key.trim() {
            "NAME" => name = Some(value),
            "VERSION_ID" => version_id = Some(value),
            "VERSION" => version = Some(value),
            "VERSION_CODENAME" => codename = Some(value),
            "UBUNTU_CODENAME" => ubuntu_codename = Some(value),
            _ => {}
        }
    }

    let codename = codename
        .filter(|c| !c.is_empty())
        .or(ubuntu_codename.filter(|c| !c.is_empty()))
        .or_else(|| {
            version.as_deref().and_then(|v| {
                PAREN_CODENAME
                    .captures(v)
                    .map(|caps| caps["codename"].to_lowercase())
            })
        })
        .unwrap_or_default();

    Some(GuestOsInfo {
        name: name.filter(|n| !n.is_empty())?,
        version: version_id.or(version).unwrap_or_default(),
        codename,
    })
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    let stripped = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    stripped.replace("\\\"", "\"")
}

/// Resolves box and guest OS metadata for one environment.
pub struct BoxInfoResolver<'a, R> {
    vagrant: &'a Vagrant<R>,
}

impl<'a, R: CommandRunner> BoxInfoResolver<'a, R> {
    /// Create a resolver over `vagrant`.
    pub fn new(vagrant: &'a Vagrant<R>) -> Self {
        Self { vagrant }
    }

    /// Resolve the configured box.
    ///
    /// Returns `None` when no box is configured or the machine was never
    /// created.
    pub async fn resolve_box_info(&self) -> Result<Option<BoxInfo>> {
        let status = self.vagrant.status().await?;
        self.box_info_for(&status).await
    }

    /// Resolve the guest OS. Runs a fresh status query and only reaches
    /// into the guest when it reports [`RunState::Running`].
    pub async fn resolve_guest_os_info(&self) -> Result<Option<GuestOsInfo>> {
        let status = self.vagrant.status().await?;
        self.guest_os_for(status.state).await
    }

    /// Resolve state, box, guest OS and EOL status from one status query.
    pub async fn resolve_environment(&self, today: NaiveDate) -> Result<EnvironmentInfo> {
        let status = self.vagrant.status().await?;
        let box_info = self.box_info_for(&status).await?;
        let guest_os = self.guest_os_for(status.state).await?;
        let eol = guest_os.as_ref().map(|os| eol::is_eol(&os.version, today));

        Ok(EnvironmentInfo {
            state: status.state,
            provider: status.provider,
            box_info,
            guest_os,
            eol,
        })
    }

    async fn box_info_for(&self, status: &StatusSnapshot) -> Result<Option<BoxInfo>> {
        if status.state == RunState::NotCreated {
            return Ok(None);
        }

        let output = self.vagrant.box_outdated().await?;
        let text = format!("{}\n{}", output.stdout, output.stderr);
        let Some(parsed) = parse_newer_box(&text).or_else(|| parse_checking_box(&text)) else {
            tracing::debug!(
                env = %self.vagrant.env_path().display(),
                exit_code = output.exit_code,
                "no box information in output"
            );
            return Ok(None);
        };

        Ok(Some(BoxInfo {
            name: parsed.name,
            version: parsed.version,
            provider: status
                .provider
                .clone()
                .or(parsed.provider)
                .unwrap_or_default(),
        }))
    }

    async fn guest_os_for(&self, state: RunState) -> Result<Option<GuestOsInfo>> {
        if !state.is_running() {
            tracing::debug!(%state, "guest not running, skipping OS lookup");
            return Ok(None);
        }

        let output = self.vagrant.ssh(OS_RELEASE_COMMAND).await?;
        if !output.success() {
            tracing::debug!(
                exit_code = output.exit_code,
                "guest unreachable, OS unknown"
            );
            return Ok(None);
        }
        Ok(parse_os_release(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    const UBUNTU_JAMMY: &str = r#"PRETTY_NAME="Ubuntu 22.04.4 LTS"
NAME="Ubuntu"
VERSION_ID="22.04"
VERSION="22.04.4 LTS (Jammy Jellyfish)"
VERSION_CODENAME=jammy
ID=ubuntu
ID_LIKE=debian
UBUNTU_CODENAME=jammy
"#;

    const CHECKING: &str = "\
==> default: Checking if box 'bento/ubuntu-22.04' version '202401.31.0' is up to date...
";

    const NEWER: &str = "\
==> default: Checking if box 'ubuntu/focal64' version '20210119.0.0' is up to date...
==> default: A newer version of the box 'ubuntu/focal64' for provider 'virtualbox' is
==> default: available! You currently have version '20210119.0.0'. The latest is version
==> default: '20210415.0.0'. Run `vagrant box update` to update.
";

    const RUNNING: &str = "1,default,provider-name,virtualbox\n1,default,state,running\n";
    const POWEROFF: &str = "1,metadata,provider\n2,state,poweroff\n";

    #[test]
    fn test_parse_checking_box() {
        let parsed = parse_checking_box(CHECKING).unwrap();
        assert_eq!(parsed.name, "bento/ubuntu-22.04");
        assert_eq!(parsed.version, "202401.31.0");
        assert_eq!(parsed.provider, None);
    }

    #[test]
    fn test_parse_newer_box_across_wrapped_lines() {
        let parsed = parse_newer_box(NEWER).unwrap();
        assert_eq!(parsed.name, "ubuntu/focal64");
        assert_eq!(parsed.version, "20210119.0.0");
        assert_eq!(parsed.provider.as_deref(), Some("virtualbox"));
    }

    #[test]
    fn test_parse_box_without_match() {
        let raw = "==> default: VM not created. Moving on...\n";
        assert_eq!(parse_checking_box(raw), None);
        assert_eq!(parse_newer_box(raw), None);
    }

    #[test]
    fn test_parse_os_release_ubuntu() {
        let os = parse_os_release(UBUNTU_JAMMY).unwrap();
        assert_eq!(os.name, "Ubuntu");
        assert_eq!(os.version, "22.04");
        assert_eq!(os.codename, "jammy");
    }

    #[test]
    fn test_parse_os_release_codename_fallbacks() {
        let xenial = "NAME=\"Ubuntu\"\r\nVERSION=\"16.04.7 LTS (Xenial Xerus)\"\r\nVERSION_ID=\"16.04\"\r\nUBUNTU_CODENAME=xenial\r\n";
        assert_eq!(parse_os_release(xenial).unwrap().codename, "xenial");

        let only_version = "NAME='Ubuntu'\nVERSION=\"14.04.6 LTS, Trusty Tahr\"\nVERSION_ID=\"14.04\"\n";
        let os = parse_os_release(only_version).unwrap();
        assert_eq!(os.name, "Ubuntu");
        assert_eq!(os.codename, "");

        let paren = "NAME=\"Debian GNU/Linux\"\nVERSION=\"11 (bullseye)\"\nVERSION_ID=\"11\"\n";
        assert_eq!(parse_os_release(paren).unwrap().codename, "bullseye");
    }

    #[test]
    fn test_parse_os_release_requires_name() {
        assert_eq!(parse_os_release(""), None);
        assert_eq!(parse_os_release("VERSION_ID=\"22.04\"\n"), None);
        assert_eq!(parse_os_release("ssh: connect to host refused\n"), None);
    }

    #[tokio::test]
    async fn test_resolve_box_info_uses_status_provider() {
        let runner = ScriptedRunner::new()
            .reply("status", 0, RUNNING)
            .reply("box", 0, CHECKING);
        let vagrant = Vagrant::new(runner, "/srv/env");
        let info = BoxInfoResolver::new(&vagrant)
            .resolve_box_info()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            info,
            BoxInfo {
                name: "bento/ubuntu-22.04".into(),
                version: "202401.31.0".into(),
                provider: "virtualbox".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_box_info_absent_when_not_created() {
        let runner = ScriptedRunner::new().reply("status", 0, "1,default,state,not_created\n");
        let vagrant = Vagrant::new(runner, "/srv/env");
        let info = BoxInfoResolver::new(&vagrant).resolve_box_info().await.unwrap();
        assert_eq!(info, None);
        assert_eq!(vagrant.runner().count("box"), 0);
    }

    #[tokio::test]
    async fn test_resolve_box_info_absent_when_unparsable() {
        let runner = ScriptedRunner::new()
            .reply("status", 0, POWEROFF)
            .reply("box", 1, "There are no boxes installed.\n");
        let vagrant = Vagrant::new(runner, "/srv/env");
        let info = BoxInfoResolver::new(&vagrant).resolve_box_info().await.unwrap();
        assert_eq!(info, None);
    }

    #[tokio::test]
    async fn test_guest_os_not_attempted_when_stopped() {
        let runner = ScriptedRunner::new().reply("status", 0, POWEROFF);
        let vagrant = Vagrant::new(runner, "/srv/env");
        let os = BoxInfoResolver::new(&vagrant)
            .resolve_guest_os_info()
            .await
            .unwrap();
        assert_eq!(os, None);
        assert_eq!(vagrant.runner().count("ssh"), 0);
    }

    #[tokio::test]
    async fn test_guest_os_resolved_when_running() {
        let runner = ScriptedRunner::new()
            .reply("status", 0, RUNNING)
            .reply("ssh", 0, UBUNTU_JAMMY);
        let vagrant = Vagrant::new(runner, "/srv/env");
        let os = BoxInfoResolver::new(&vagrant)
            .resolve_guest_os_info()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(os.version, "22.04");
        assert_eq!(vagrant.runner().subcommands(), ["status", "ssh"]);
    }

    #[tokio::test]
    async fn test_guest_os_absent_when_ssh_fails() {
        let runner = ScriptedRunner::new()
            .reply("status", 0, RUNNING)
            .reply("ssh", 255, "");
        let vagrant = Vagrant::new(runner, "/srv/env");
        let os = BoxInfoResolver::new(&vagrant)
            .resolve_guest_os_info()
            .await
            .unwrap();
        assert_eq!(os, None);
    }

    #[tokio::test]
    async fn test_resolve_environment_running() {
        let runner = ScriptedRunner::new()
            .reply("status", 0, RUNNING)
            .reply("box", 0, NEWER)
            .reply("ssh", 0, UBUNTU_JAMMY);
        let vagrant = Vagrant::new(runner, "/srv/env");
        let today = NaiveDate::from_ymd_opt(2027, 6, 1).unwrap();
        let env = BoxInfoResolver::new(&vagrant)
            .resolve_environment(today)
            .await
            .unwrap();

        assert_eq!(env.state, RunState::Running);
        assert_eq!(env.box_info.unwrap().name, "ubuntu/focal64");
        assert_eq!(env.guest_os.unwrap().codename, "jammy");
        assert_eq!(env.eol, Some(true));
        assert_eq!(vagrant.runner().count("status"), 1);
    }

    #[tokio::test]
    async fn test_resolve_environment_stopped_skips_guest() {
        let runner = ScriptedRunner::new()
            .reply("status", 0, POWEROFF)
            .reply("box", 0, CHECKING);
        let vagrant = Vagrant::new(runner, "/srv/env");
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let env = BoxInfoResolver::new(&vagrant)
            .resolve_environment(today)
            .await
            .unwrap();

        assert_eq!(env.state, RunState::Stopped);
        assert_eq!(env.guest_os, None);
        assert_eq!(env.eol, None);
        assert_eq!(env.box_info.unwrap().provider, "");
        assert_eq!(vagrant.runner().count("ssh"), 0);
    }

    #[tokio::test]
    async fn test_launch_failure_propagates() {
        let runner = ScriptedRunner::new().launch_failure("status");
        let vagrant = Vagrant::new(runner, "/srv/env");
        let err = BoxInfoResolver::new(&vagrant)
            .resolve_box_info()
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::ExecutionFailure { .. }));
    }
}
