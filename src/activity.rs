//! `activity.md` codec.
//!
//! The activity log is an append-only sequence of single-line entries:
//!
//! ```text
//! 2026-01-05 14:03 | human | created | Task created (t-20260105-001)
//! ```
//!
//! Appending never re-reads or rewrites earlier lines. Reading is lenient: a
//! line that does not parse is skipped with a warning so the remaining
//! history stays inspectable.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

const SEPARATOR: &str = " | ";

/// What happened to the task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    Created,
    Started,
    Completed,
    Updated,
    Renamed,
    Trashed,
    Note,
    /// A kind written by another tool; kept verbatim.
    Other(String),
}

impl ActivityKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActivityKind::Created => "created",
            ActivityKind::Started => "started",
            ActivityKind::Completed => "completed",
            ActivityKind::Updated => "updated",
            ActivityKind::Renamed => "renamed",
            ActivityKind::Trashed => "trashed",
            ActivityKind::Note => "note",
            ActivityKind::Other(kind) => kind,
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ActivityKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim() {
            "created" | "create" => ActivityKind::Created,
            "started" | "plan" => ActivityKind::Started,
            "completed" | "complete" => ActivityKind::Completed,
            "updated" | "update" => ActivityKind::Updated,
            "renamed" => ActivityKind::Renamed,
            "trashed" => ActivityKind::Trashed,
            "note" => ActivityKind::Note,
            other => ActivityKind::Other(other.to_string()),
        })
    }
}

/// One line of the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    pub actor: String,
    pub kind: ActivityKind,
    pub note: String,
}

fn serialize_timestamp<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
}

impl ActivityEntry {
    pub fn new(
        timestamp: NaiveDateTime,
        actor: impl Into<String>,
        kind: ActivityKind,
        note: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            actor: actor.into(),
            kind,
            note: note.into(),
        }
    }

    /// Render the entry as a single newline-terminated line.
    ///
    /// Actor and kind must not contain the column separator, and no field may
    /// span lines, so those characters are replaced.
    pub fn to_line(&self) -> String {
        let actor = single_line(&self.actor).replace('|', "/");
        let kind = single_line(self.kind.as_str()).replace('|', "/");
        let note = single_line(&self.note);
        format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}\n",
            self.timestamp.format(TIMESTAMP_FORMAT),
            if actor.trim().is_empty() { "unknown" } else { actor.trim() },
            kind.trim(),
            note.trim()
        )
    }

    /// Parse one log line. Notes may themselves contain `|`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        let mut parts = line.splitn(4, '|');
        let timestamp = parts.next()?.trim();
        let actor = parts.next()?.trim();
        let kind = parts.next()?.trim();
        let note = parts.next()?.trim();
        let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;
        if actor.is_empty() || kind.is_empty() {
            return None;
        }
        Some(Self {
            timestamp,
            actor: actor.to_string(),
            kind: kind.parse().unwrap_or_else(|never| match never {}),
            note: note.to_string(),
        })
    }
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// Append an entry to existing log bytes without touching earlier content.
///
/// If the existing bytes do not end in a newline (hand edit, interrupted
/// write) a newline is inserted first so the new entry starts its own line.
pub fn append_log_entry(existing: &[u8], entry: &ActivityEntry) -> Vec<u8> {
    let line = entry.to_line();
    let mut out = Vec::with_capacity(existing.len() + line.len() + 1);
    out.extend_from_slice(existing);
    if needs_separator(existing) {
        out.push(b'\n');
    }
    out.extend_from_slice(line.as_bytes());
    out
}

/// True when appending to `existing` requires a leading newline.
fn needs_separator(existing: &[u8]) -> bool {
    existing.last().is_some_and(|last| *last != b'\n')
}

/// Lazily iterate the entries of a log.
///
/// The iterator is cheap to clone; cloning before consuming gives a fresh
/// pass over the same bytes.
pub fn read_log(bytes: &[u8]) -> LogEntries<'_> {
    LogEntries {
        lines: bytes.split(is_newline as fn(&u8) -> bool),
        line_no: 0,
    }
}

fn is_newline(byte: &u8) -> bool {
    *byte == b'\n'
}

#[derive(Clone)]
pub struct LogEntries<'a> {
    lines: std::slice::Split<'a, u8, fn(&u8) -> bool>,
    line_no: usize,
}

impl Iterator for LogEntries<'_> {
    type Item = ActivityEntry;

    fn next(&mut self) -> Option<Self::Item> {
        for raw in self.lines.by_ref() {
            self.line_no += 1;
            let Ok(line) = std::str::from_utf8(raw) else {
                tracing::warn!(line = self.line_no, "skipping activity line with invalid UTF-8");
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }
            match ActivityEntry::parse_line(line) {
                Some(entry) => return Some(entry),
                None => {
                    tracing::warn!(line = self.line_no, content = line, "skipping malformed activity line");
                }
            }
        }
        None
    }
}
