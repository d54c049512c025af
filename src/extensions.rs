//! Extension/provisioner toggles in the environment configuration file.
//!
//! The document keeps extension groups under a top-level `extensions` key:
//!
//! ```yaml
//! extensions:
//!   core:
//!     tls-ca:
//!       enabled: true
//!     phpmyadmin:
//!       enabled: false
//! ```
//!
//! or, in TOML, `[extensions.core.tls-ca]` tables with an `enabled` key.
//! An entry may also be a bare boolean (`tls-ca: true`) or empty
//! (`tls-ca:`), which counts as enabled.
//!
//! A toggle changes one boolean and leaves every other byte of the file as
//! it was. TOML documents are edited through `toml_edit`. YAML documents are
//! read with `serde_yaml` for validation; the `enabled` token is then patched
//! in the source text and the result re-parsed before it is written. YAML
//! groups and entries must be in block style, except that an entry may be a
//! single-line flow mapping (`tls-ca: { enabled: true }`).
//!
//! Writes are skipped when the value is already what was asked for. There is
//! no locking: two concurrent writers can lose an update.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_yaml::{Mapping, Value as Yaml};
use toml_edit::{DocumentMut, Item, TableLike};

use crate::error::{Error, Result};

/// Top-level key holding the extension groups.
pub const EXTENSIONS_KEY: &str = "extensions";

/// Per-entry flag.
pub const ENABLED_KEY: &str = "enabled";

/// One provisioner of one extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionEntry {
    /// Extension group name.
    pub extension: String,
    /// Provisioner name within the group.
    pub provisioner: String,
    /// Whether the provisioner runs.
    pub enabled: bool,
}

/// On-disk syntax of the configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Toml,
}

impl DocumentFormat {
    /// Pick the format from the file extension; anything but `.toml` is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => DocumentFormat::Toml,
            _ => DocumentFormat::Yaml,
        }
    }
}

/// Reads and toggles extension entries in one document.
#[derive(Debug, Clone)]
pub struct ExtensionConfigMutator {
    path: PathBuf,
    format: DocumentFormat,
}

impl ExtensionConfigMutator {
    /// Create a mutator for the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = DocumentFormat::from_path(&path);
        Self { path, format }
    }

    /// Document path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, in document order.
    pub fn list_entries(&self) -> Result<Vec<ExtensionEntry>> {
        self.load()?.entries(&self.path)
    }

    /// Current flag of one entry.
    pub fn is_enabled(&self, extension: &str, provisioner: &str) -> Result<bool> {
        self.load()?
            .entries(&self.path)?
            .into_iter()
            .find(|e| e.extension == extension && e.provisioner == provisioner)
            .map(|e| e.enabled)
            .ok_or_else(|| self.not_found(extension, provisioner))
    }

    /// Set one entry's flag and persist the document.
    ///
    /// Returns whether the file was rewritten. Fails with
    /// [`Error::EntryNotFound`] without touching the file when the pair is
    /// absent; entries are never created.
    pub fn set_enabled(&self, extension: &str, provisioner: &str, enabled: bool) -> Result<bool> {
        let mut doc = self.load()?;
        let previous = doc
            .set(extension, provisioner, enabled, &self.path)?
            .ok_or_else(|| self.not_found(extension, provisioner))?;

        if previous == enabled {
            tracing::debug!(
                path = %self.path.display(),
                extension,
                provisioner,
                enabled,
                "entry already set, not rewriting"
            );
            return Ok(false);
        }

        std::fs::write(&self.path, doc.render()).map_err(|e| Error::document(&self.path, e))?;
        tracing::info!(
            path = %self.path.display(),
            extension,
            provisioner,
            enabled,
            "extension entry updated"
        );
        Ok(true)
    }

    fn load(&self) -> Result<Document> {
        let text =
            std::fs::read_to_string(&self.path).map_err(|e| Error::document(&self.path, e))?;
        Document::parse(self.format, &text, &self.path)
    }

    fn not_found(&self, extension: &str, provisioner: &str) -> Error {
        Error::EntryNotFound {
            extension: extension.to_string(),
            provisioner: provisioner.to_string(),
            path: self.path.clone(),
        }
    }
}

/// Set one entry's flag in the document at `path`.
pub fn set_enabled(
    path: impl Into<PathBuf>,
    extension: &str,
    provisioner: &str,
    enabled: bool,
) -> Result<()> {
    ExtensionConfigMutator::new(path)
        .set_enabled(extension, provisioner, enabled)
        .map(|_| ())
}

enum Document {
    Yaml { source: String, root: Yaml },
    Toml(DocumentMut),
}

impl Document {
    fn parse(format: DocumentFormat, text: &str, path: &Path) -> Result<Self> {
        match format {
            DocumentFormat::Yaml => serde_yaml::from_str(text)
                .map(|root| Document::Yaml {
                    source: text.to_string(),
                    root,
                })
                .map_err(|e| Error::malformed(path, e.to_string())),
            DocumentFormat::Toml => text
                .parse::<DocumentMut>()
                .map(Document::Toml)
                .map_err(|e| Error::malformed(path, e.to_string())),
        }
    }

    fn entries(&self, path: &Path) -> Result<Vec<ExtensionEntry>> {
        match self {
            Document::Yaml { root, .. } => yaml_entries(root, path),
            Document::Toml(doc) => toml_entries(doc, path),
        }
    }

    /// Returns the previous flag, or `None` when the entry does not exist.
    fn set(
        &mut self,
        extension: &str,
        provisioner: &str,
        enabled: bool,
        path: &Path,
    ) -> Result<Option<bool>> {
        match self {
            Document::Yaml { source, root } => {
                yaml_set(source, root, extension, provisioner, enabled, path)
            }
            Document::Toml(doc) => toml_set(doc, extension, provisioner, enabled, path),
        }
    }

    fn render(&self) -> String {
        match self {
            Document::Yaml { source, .. } => source.clone(),
            Document::Toml(doc) => doc.to_string(),
        }
    }
}

fn entry_error(path: &Path, extension: &str, provisioner: &str, what: &str) -> Error {
    Error::malformed(
        path,
        format!("entry {}/{}: {}", extension, provisioner, what),
    )
}

// ============================================================================
// YAML
// ============================================================================

/// Layout of a YAML entry before it is toggled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum YamlEntryShape {
    /// `tls-ca: true`
    Flag,
    /// `tls-ca:` or `tls-ca: ~`
    Empty,
    /// A mapping, with or without an `enabled` key.
    Table { has_flag: bool },
}

fn yaml_groups<'a>(root: &'a Yaml, path: &Path) -> Result<Option<&'a Mapping>> {
    match root {
        Yaml::Null => Ok(None),
        Yaml::Mapping(map) => match map.get(EXTENSIONS_KEY) {
            None | Some(Yaml::Null) => Ok(None),
            Some(Yaml::Mapping(groups)) => Ok(Some(groups)),
            Some(_) => Err(Error::malformed(path, "`extensions` is not a mapping")),
        },
        _ => Err(Error::malformed(path, "top level is not a mapping")),
    }
}

fn yaml_enabled(entry: &Yaml, path: &Path, extension: &str, provisioner: &str) -> Result<bool> {
    match entry {
        Yaml::Bool(b) => Ok(*b),
        Yaml::Null => Ok(true),
        Yaml::Mapping(map) => match map.get(ENABLED_KEY) {
            None | Some(Yaml::Null) => Ok(true),
            Some(Yaml::Bool(b)) => Ok(*b),
            Some(_) => Err(entry_error(
                path,
                extension,
                provisioner,
                "`enabled` is not a boolean",
            )),
        },
        _ => Err(entry_error(
            path,
            extension,
            provisioner,
            "expected a mapping or boolean",
        )),
    }
}

fn yaml_key<'a>(key: &'a Yaml, path: &Path) -> Result<&'a str> {
    key.as_str()
        .ok_or_else(|| Error::malformed(path, format!("non-string key {:?}", key)))
}

fn yaml_entries(root: &Yaml, path: &Path) -> Result<Vec<ExtensionEntry>> {
    let Some(groups) = yaml_groups(root, path)? else {
        return Ok(Vec::new());
    };

    let mut entries = Vec::new();
    for (group_key, group) in groups {
        let extension = yaml_key(group_key, path)?;
        let provisioners = match group {
            Yaml::Null => continue,
            Yaml::Mapping(map) => map,
            _ => {
                return Err(Error::malformed(
                    path,
                    format!("extension `{}` is not a mapping", extension),
                ))
            }
        };
        for (entry_key, entry) in provisioners {
            let provisioner = yaml_key(entry_key, path)?;
            entries.push(ExtensionEntry {
                extension: extension.to_string(),
                provisioner: provisioner.to_string(),
                enabled: yaml_enabled(entry, path, extension, provisioner)?,
            });
        }
    }
    Ok(entries)
}

/// Current flag and layout of one entry, or `None` when it does not exist.
fn yaml_lookup(
    root: &Yaml,
    extension: &str,
    provisioner: &str,
    path: &Path,
) -> Result<Option<(bool, YamlEntryShape)>> {
    let Some(groups) = yaml_groups(root, path)? else {
        return Ok(None);
    };
    let group = match groups.get(extension) {
        None | Some(Yaml::Null) => return Ok(None),
        Some(Yaml::Mapping(map)) => map,
        Some(_) => {
            return Err(Error::malformed(
                path,
                format!("extension `{}` is not a mapping", extension),
            ))
        }
    };
    let Some(entry) = group.get(provisioner) else {
        return Ok(None);
    };

    let enabled = yaml_enabled(entry, path, extension, provisioner)?;
    let shape = match entry {
        Yaml::Mapping(map) => YamlEntryShape::Table {
            has_flag: map.contains_key(ENABLED_KEY),
        },
        Yaml::Null => YamlEntryShape::Empty,
        _ => YamlEntryShape::Flag,
    };
    Ok(Some((enabled, shape)))
}

/// Value-level form of a toggle, used to check the source patch.
fn set_yaml_flag(entry: &mut Yaml, enabled: bool) {
    match entry {
        Yaml::Mapping(map) => {
            map.insert(Yaml::from(ENABLED_KEY), Yaml::Bool(enabled));
        }
        Yaml::Null => {
            let mut map = Mapping::new();
            map.insert(Yaml::from(ENABLED_KEY), Yaml::Bool(enabled));
            *entry = Yaml::Mapping(map);
        }
        _ => *entry = Yaml::Bool(enabled),
    }
}

fn yaml_set(
    source: &mut String,
    root: &mut Yaml,
    extension: &str,
    provisioner: &str,
    enabled: bool,
    path: &Path,
) -> Result<Option<bool>> {
    let Some((previous, shape)) = yaml_lookup(root, extension, provisioner, path)? else {
        return Ok(None);
    };
    if previous == enabled {
        return Ok(Some(previous));
    }

    let patched = patch_yaml_flag(source, extension, provisioner, shape, enabled)
        .map_err(|reason| entry_error(path, extension, provisioner, reason))?;

    let reparsed: Yaml =
        serde_yaml::from_str(&patched).map_err(|e| Error::malformed(path, e.to_string()))?;
    let mut expected = root.clone();
    if let Some(entry) = expected
        .get_mut(EXTENSIONS_KEY)
        .and_then(|groups| groups.get_mut(extension))
        .and_then(|group| group.get_mut(provisioner))
    {
        set_yaml_flag(entry, enabled);
    }
    if reparsed != expected {
        return Err(entry_error(
            path,
            extension,
            provisioner,
            "layout cannot be edited in place",
        ));
    }

    *source = patched;
    *root = reparsed;
    Ok(Some(previous))
}

// ============================================================================
// YAML source patching
// ============================================================================

type Patch = std::result::Result<String, &'static str>;

static FLOW_FLAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[{,]\s*enabled\s*:\s*(?P<value>[^,}\s]*)").expect("valid regex")
});

/// Rewrite the flag of one entry in `source`, keeping all other bytes.
fn patch_yaml_flag(
    source: &str,
    extension: &str,
    provisioner: &str,
    shape: YamlEntryShape,
    enabled: bool,
) -> Patch {
    let mut lines: Vec<String> = source.split_inclusive('\n').map(str::to_string).collect();
    let flag = if enabled { "true" } else { "false" };

    let root = find_key(&lines, 0, lines.len(), 0, EXTENSIONS_KEY)
        .ok_or("`extensions` is not a top-level block mapping")?;
    let (group, group_end) = find_child(&lines, root, lines.len(), extension)
        .ok_or("extension is not a block mapping")?;
    let (entry, entry_end) =
        find_child(&lines, group, group_end, provisioner).ok_or("entry is not in block style")?;

    let entry_indent = leading_spaces(&lines[entry]);
    let step = entry_indent - leading_spaces(&lines[group]);
    let line = lines[entry].clone();
    let (text, ending) = split_ending(&line);
    let (_, after_colon) = split_key(text, entry_indent).ok_or("unreadable entry key")?;
    let value = value_span(text, after_colon);

    match (shape, value) {
        (YamlEntryShape::Flag, _) => {
            lines[entry] = format!("{}{}", replace_value(text, after_colon, flag), ending);
        }
        (YamlEntryShape::Empty, _) => {
            let head = match value {
                Some((_, end)) => format!("{}{}", &text[..after_colon], &text[end..]),
                None => text.to_string(),
            };
            let newline = if ending.is_empty() { "\n" } else { ending };
            lines[entry] = format!("{}{}", head, newline);
            lines.insert(
                entry + 1,
                format!(
                    "{}{}: {}{}",
                    " ".repeat(entry_indent + step),
                    ENABLED_KEY,
                    flag,
                    ending
                ),
            );
        }
        (YamlEntryShape::Table { has_flag }, Some((start, end))) => {
            let flow = patch_flow_flag(&text[start..end], has_flag, flag)?;
            lines[entry] = format!("{}{}{}{}", &text[..start], flow, &text[end..], ending);
        }
        (YamlEntryShape::Table { has_flag: true }, None) => {
            let (at, _) = find_child(&lines, entry, entry_end, ENABLED_KEY)
                .ok_or("`enabled` is not in block style")?;
            let indent = leading_spaces(&lines[at]);
            let line = lines[at].clone();
            let (text, ending) = split_ending(&line);
            let (_, after_colon) = split_key(text, indent).ok_or("unreadable `enabled` key")?;
            lines[at] = format!("{}{}", replace_value(text, after_colon, flag), ending);
        }
        (YamlEntryShape::Table { has_flag: false }, None) => {
            let indent = child_indent(&lines, entry + 1, entry_end).ok_or("entry has no body")?;
            lines.insert(
                entry + 1,
                format!("{}{}: {}{}", " ".repeat(indent), ENABLED_KEY, flag, ending),
            );
        }
    }
    Ok(lines.concat())
}

/// Set or add `enabled` inside a single-line flow mapping.
fn patch_flow_flag(token: &str, has_flag: bool, flag: &str) -> Patch {
    let inner = token
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .ok_or("entry is neither a block nor a single-line flow mapping")?;

    if has_flag {
        let value = FLOW_FLAG
            .captures(token)
            .and_then(|caps| caps.name("value"))
            .ok_or("`enabled` is not a plain key")?;
        return Ok(format!(
            "{}{}{}",
            &token[..value.start()],
            flag,
            &token[value.end()..]
        ));
    }

    let body = inner.trim_start();
    if body.trim_end().is_empty() {
        return Ok(format!("{{{}: {}}}", ENABLED_KEY, flag));
    }
    let lead = &inner[..inner.len() - body.len()];
    Ok(format!("{{{}{}: {}, {}}}", lead, ENABLED_KEY, flag, body))
}

/// Locate `key` among the block children of the line at `parent`; returns
/// its line and the end of its block.
fn find_child(lines: &[String], parent: usize, end: usize, key: &str) -> Option<(usize, usize)> {
    let body_end = block_end(lines, parent, end);
    let indent = child_indent(lines, parent + 1, body_end)?;
    let at = find_key(lines, parent + 1, body_end, indent, key)?;
    Some((at, block_end(lines, at, body_end)))
}

fn find_key(lines: &[String], start: usize, end: usize, indent: usize, key: &str) -> Option<usize> {
    (start..end).find(|&i| {
        let (text, _) = split_ending(&lines[i]);
        !is_blank_or_comment(text)
            && leading_spaces(text) == indent
            && split_key(text, indent).is_some_and(|(k, _)| k == key)
    })
}

/// First line after `at` that is not nested under it.
fn block_end(lines: &[String], at: usize, end: usize) -> usize {
    let indent = leading_spaces(&lines[at]);
    (at + 1..end)
        .find(|&i| {
            let (text, _) = split_ending(&lines[i]);
            !is_blank_or_comment(text) && leading_spaces(text) <= indent
        })
        .unwrap_or(end)
}

fn child_indent(lines: &[String], start: usize, end: usize) -> Option<usize> {
    lines[start..end]
        .iter()
        .map(|line| split_ending(line).0)
        .find(|text| !is_blank_or_comment(text))
        .map(leading_spaces)
}

fn split_ending(line: &str) -> (&str, &str) {
    let text = line.trim_end_matches(['\r', '\n']);
    (text, &line[text.len()..])
}

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Split a `key: value` line into the unquoted key and the offset just past
/// the colon.
fn split_key(line: &str, indent: usize) -> Option<(&str, usize)> {
    let rest = line.get(indent..)?;
    if rest == "-" || rest.starts_with("- ") {
        return None;
    }
    let (key, colon) = match rest.chars().next()? {
        quote @ ('"' | '\'') => {
            let close = rest[1..].find(quote)? + 1;
            let tail = &rest[close + 1..];
            let gap = tail.len() - tail.trim_start_matches(' ').len();
            (&rest[1..close], close + 1 + gap)
        }
        '#' | '?' | '{' | '[' | '&' | '*' | '!' | '|' | '>' => return None,
        _ => {
            let colon = rest
                .match_indices(':')
                .map(|(i, _)| i)
                .find(|&i| matches!(rest.as_bytes().get(i + 1), None | Some(b' ' | b'\t')))?;
            (rest[..colon].trim_end(), colon)
        }
    };
    match (rest.as_bytes().get(colon), rest.as_bytes().get(colon + 1)) {
        (Some(b':'), None | Some(b' ' | b'\t')) => Some((key, indent + colon + 1)),
        _ => None,
    }
}

/// Byte range of the value after `after_colon`, without surrounding
/// whitespace or a trailing comment. `None` when there is no value.
fn value_span(line: &str, after_colon: usize) -> Option<(usize, usize)> {
    let tail = &line[after_colon..];
    let start = after_colon + tail.len() - tail.trim_start_matches([' ', '\t']).len();

    let mut end = line.len();
    let (mut single, mut double) = (false, false);
    let mut after_blank = true;
    for (i, b) in line.bytes().enumerate().skip(start) {
        match b {
            b'\'' if !double => single = !single,
            b'"' if !single => double = !double,
            b'#' if !single && !double && after_blank => {
                end = i;
                break;
            }
            _ => {}
        }
        after_blank = b == b' ' || b == b'\t';
    }

    let end = start + line[start..end].trim_end().len();
    (end > start).then_some((start, end))
}

fn replace_value(line: &str, after_colon: usize, value: &str) -> String {
    match value_span(line, after_colon) {
        Some((start, end)) => format!("{}{}{}", &line[..start], value, &line[end..]),
        None => format!("{} {}{}", &line[..after_colon], value, &line[after_colon..]),
    }
}

// ============================================================================
// TOML
// ============================================================================

fn toml_groups<'a>(doc: &'a DocumentMut, path: &Path) -> Result<Option<&'a dyn TableLike>> {
    match doc.get(EXTENSIONS_KEY) {
        None => Ok(None),
        Some(item) => item
            .as_table_like()
            .map(Some)
            .ok_or_else(|| Error::malformed(path, "`extensions` is not a table")),
    }
}

fn toml_enabled(entry: &Item, path: &Path, extension: &str, provisioner: &str) -> Result<bool> {
    if let Some(b) = entry.as_bool() {
        return Ok(b);
    }
    let Some(table) = entry.as_table_like() else {
        return Err(entry_error(
            path,
            extension,
            provisioner,
            "expected a table or boolean",
        ));
    };
    match table.get(ENABLED_KEY) {
        None => Ok(true),
        Some(flag) => flag.as_bool().ok_or_else(|| {
            entry_error(path, extension, provisioner, "`enabled` is not a boolean")
        }),
    }
}

fn toml_entries(doc: &DocumentMut, path: &Path) -> Result<Vec<ExtensionEntry>> {
    let Some(groups) = toml_groups(doc, path)? else {
        return Ok(Vec::new());
    };

    let mut entries = Vec::new();
    for (extension, group) in groups.iter() {
        let provisioners = group.as_table_like().ok_or_else(|| {
            Error::malformed(path, format!("extension `{}` is not a table", extension))
        })?;
        for (provisioner, entry) in provisioners.iter() {
            entries.push(ExtensionEntry {
                extension: extension.to_string(),
                provisioner: provisioner.to_string(),
                enabled: toml_enabled(entry, path, extension, provisioner)?,
            });
        }
    }
    Ok(entries)
}

fn toml_set(
    doc: &mut DocumentMut,
    extension: &str,
    provisioner: &str,
    enabled: bool,
    path: &Path,
) -> Result<Option<bool>> {
    let Some(groups) = doc.get_mut(EXTENSIONS_KEY) else {
        return Ok(None);
    };
    let groups = groups
        .as_table_like_mut()
        .ok_or_else(|| Error::malformed(path, "`extensions` is not a table"))?;
    let Some(group) = groups.get_mut(extension) else {
        return Ok(None);
    };
    let group = group.as_table_like_mut().ok_or_else(|| {
        Error::malformed(path, format!("extension `{}` is not a table", extension))
    })?;
    let Some(entry) = group.get_mut(provisioner) else {
        return Ok(None);
    };

    let previous = toml_enabled(entry, path, extension, provisioner)?;
    if let Some(table) = entry.as_table_like_mut() {
        match table.get_mut(ENABLED_KEY).and_then(Item::as_value_mut) {
            Some(flag) => replace_bool(flag, enabled),
            None => {
                table.insert(ENABLED_KEY, toml_edit::value(enabled));
            }
        }
    } else if let Some(flag) = entry.as_value_mut() {
        replace_bool(flag, enabled);
    }
    Ok(Some(previous))
}

/// Swap a boolean value, keeping the whitespace and comments around it.
fn replace_bool(value: &mut toml_edit::Value, enabled: bool) {
    let decor = value.decor().clone();
    *value = toml_edit::Value::from(enabled);
    *value.decor_mut() = decor;
}
