//! Machine-readable status parsing.
//!
//! `vagrant status --machine-readable` emits one comma-delimited record per
//! line: `timestamp,target,type,data...`. Commas and newlines inside data
//! are escaped as `%!(VAGRANT_COMMA)` and a literal `\n`. Shorter records
//! without the target column (`timestamp,type,data`) are accepted too.

use serde::{Deserialize, Serialize};

/// Record type carrying the machine state token.
pub const STATE_RECORD: &str = "state";

/// Record type carrying the provider name.
pub const PROVIDER_RECORD: &str = "provider-name";

/// Observed run state of the environment.
///
/// A snapshot taken from one status query; never reused across queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// The machine has never been brought up.
    NotCreated,
    /// The machine is up.
    Running,
    /// The machine is powered off.
    Stopped,
    /// The machine is suspended to disk.
    Saved,
    /// The machine stopped abruptly.
    Aborted,
    /// No recognizable state was reported.
    Unknown,
}

impl RunState {
    /// Map a state token to a run state.
    pub fn from_token(token: &str) -> Self {
        match token.trim() {
            "not_created" | "not created" => RunState::NotCreated,
            "running" => RunState::Running,
            "poweroff" | "shutoff" | "stopped" | "off" => RunState::Stopped,
            "saved" | "suspended" => RunState::Saved,
            "aborted" => RunState::Aborted,
            _ => RunState::Unknown,
        }
    }

    /// Whether commands can be executed inside the guest.
    pub fn is_running(self) -> bool {
        self == RunState::Running
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::NotCreated => write!(f, "not created"),
            RunState::Running => write!(f, "running"),
            RunState::Stopped => write!(f, "stopped"),
            RunState::Saved => write!(f, "saved"),
            RunState::Aborted => write!(f, "aborted"),
            RunState::Unknown => write!(f, "unknown"),
        }
    }
}

/// One decoded machine-readable record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record type (`state`, `provider-name`, `metadata`, ...).
    pub kind: String,
    /// Data fields following the type, unescaped.
    pub data: Vec<String>,
}

/// Parse the run state from raw status output.
///
/// The first `state` record wins. Output without one yields
/// [`RunState::Unknown`].
pub fn parse_state(raw: &str) -> RunState {
    first_value(raw, STATE_RECORD)
        .map(|token| RunState::from_token(&token))
        .unwrap_or(RunState::Unknown)
}

/// Parse the active provider name from raw status output.
pub fn parse_provider(raw: &str) -> Option<String> {
    first_value(raw, PROVIDER_RECORD).filter(|p| !p.is_empty())
}

/// Iterate the decoded records of raw status output.
///
/// Lines with fewer than three fields are skipped.
pub fn records(raw: &str) -> impl Iterator<Item = Record> + '_ {
    raw.lines().filter_map(parse_record)
}

fn first_value(raw: &str, kind: &str) -> Option<String> {
    records(raw)
        .find(|r| r.kind == kind)
        .and_then(|r| r.data.into_iter().next())
}

fn parse_record(line: &str) -> Option<Record> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return None;
    }

    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 3 {
        return None;
    }

    // `ts,type,data` is checked before `ts,target,type,data`, so a known
    // record type in the second column always wins.
    let type_index = if is_known_kind(fields[1]) || fields.len() < 4 {
        1
    } else {
        2
    };

    Some(Record {
        kind: fields[type_index].to_string(),
        data: fields[type_index + 1..].iter().map(|f| unescape(f)).collect(),
    })
}

fn is_known_kind(field: &str) -> bool {
    matches!(
        field,
        STATE_RECORD
            | PROVIDER_RECORD
            | "metadata"
            | "state-human-short"
            | "state-human-long"
            | "ui"
            | "error-exit"
            | "box-name"
            | "box-version"
    )
}

fn unescape(field: &str) -> String {
    field.replace("%!(VAGRANT_COMMA)", ",").replace("\\n", "\n")
}
