//! `task.md` codec.
//!
//! A record is a TOML metadata block fenced by `+++` lines followed by the
//! free-form markdown body:
//!
//! ```text
//! +++
//! task_id = "t-20260101-001"
//! task_name = "write-docs"
//! status = "todo"
//! ...
//! +++
//!
//! ## Summary
//! - ...
//! ```
//!
//! Known keys are always written in the same order and unknown keys follow
//! sorted by name, so re-encoding an unchanged task yields identical bytes.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use toml::Value;

use crate::error::{Error, Result};
use crate::task::{validate_task_name, Task, DEFAULT_EFFORT, DEFAULT_PRIORITY};

pub const FENCE: &str = "+++";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Metadata keys owned by the codec. Anything else is carried in `Task::extra`.
pub const KNOWN_KEYS: [&str; 12] = [
    "task_id",
    "task_name",
    "status",
    "date_created",
    "date_started",
    "date_completed",
    "priority",
    "effort",
    "spec_readiness",
    "depends_on",
    "owner",
    "tags",
];

/// Why a record could not be decoded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}{reason}", .field.as_deref().map(|field| format!("{field}: ")).unwrap_or_default())]
pub struct DecodeError {
    pub field: Option<String>,
    pub reason: String,
}

impl DecodeError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            field: None,
            reason: reason.into(),
        }
    }

    fn field(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: Some(field.to_string()),
            reason: reason.into(),
        }
    }
}

#[derive(Serialize)]
struct Frontmatter<'a> {
    task_id: &'a str,
    task_name: &'a str,
    status: &'static str,
    date_created: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_started: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_completed: Option<String>,
    priority: &'static str,
    effort: &'static str,
    spec_readiness: &'static str,
    depends_on: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    owner: Option<&'a str>,
    tags: Vec<&'a str>,
    #[serde(flatten)]
    extra: BTreeMap<&'a str, &'a Value>,
}

/// Serialize a task into `task.md` contents.
pub fn encode(task: &Task) -> Result<String> {
    let frontmatter = Frontmatter {
        task_id: &task.id,
        task_name: &task.name,
        status: task.status.as_str(),
        date_created: format_date(task.created_at),
        date_started: task.started_at.map(format_date),
        date_completed: task.completed_at.map(format_date),
        priority: task.priority.as_str(),
        effort: task.effort.as_str(),
        spec_readiness: task.spec_readiness.as_str(),
        depends_on: &task.depends_on,
        owner: task.owner.as_deref(),
        tags: task.tags.iter().map(String::as_str).collect(),
        extra: task
            .extra
            .iter()
            .filter(|(key, _)| !KNOWN_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.as_str(), value))
            .collect(),
    };
    let mut meta = toml::to_string(&frontmatter)?;
    if !meta.ends_with('\n') {
        meta.push('\n');
    }
    if meta.lines().any(|line| line.trim_end_matches('\r') == FENCE) {
        check_fence_free(&meta)?;
    }

    let mut out = String::with_capacity(meta.len() + task.body.len() + 16);
    out.push_str(FENCE);
    out.push('\n');
    out.push_str(&meta);
    out.push_str(FENCE);
    out.push('\n');
    let body = task.body.trim_end();
    if !body.is_empty() {
        out.push('\n');
        out.push_str(body);
        out.push('\n');
    }
    Ok(out)
}

/// A `+++` line inside encoded metadata must sit in a string, where it
/// cannot be taken for the closing fence.
fn check_fence_free(meta: &str) -> Result<()> {
    let framed = format!("{meta}{FENCE}\n");
    match closing_fence(&framed) {
        Ok(closing) if closing.meta_len == meta.len() => Ok(()),
        _ => Err(Error::validation(
            "metadata",
            format!("a value would end the metadata block with a bare '{FENCE}' line"),
        )),
    }
}

/// Parse `task.md` contents.
///
/// Closed-set fields must hold one of their allowed values; unknown keys are
/// preserved in `Task::extra`. The body is returned with trailing whitespace
/// trimmed.
pub fn decode(text: &str) -> std::result::Result<Task, DecodeError> {
    let (mut table, body) = split_frontmatter(text)?;

    let id = required_string(&mut table, "task_id")?;
    let name = required_string(&mut table, "task_name")?;
    // The name becomes a directory name.
    validate_task_name(&name).map_err(|_| {
        DecodeError::field("task_name", format!("'{name}' is not a valid task name"))
    })?;
    let status = parse_choice(&required_string(&mut table, "status")?, "status")?;
    let created_at = required_date(&mut table, "date_created")?;
    let started_at = optional_date(&mut table, "date_started")?;
    let completed_at = optional_date(&mut table, "date_completed")?;
    let priority = match optional_string(&mut table, "priority")? {
        Some(value) => parse_choice(&value, "priority")?,
        None => DEFAULT_PRIORITY,
    };
    let effort = match optional_string(&mut table, "effort")? {
        Some(value) => parse_choice(&value, "effort")?,
        None => DEFAULT_EFFORT,
    };
    let spec_readiness = match optional_string(&mut table, "spec_readiness")? {
        Some(value) => parse_choice(&value, "spec_readiness")?,
        None => Default::default(),
    };
    let depends_on = string_list(&mut table, "depends_on")?;
    let owner = optional_string(&mut table, "owner")?.filter(|owner| !owner.trim().is_empty());
    let tags = string_list(&mut table, "tags")?.into_iter().collect();

    Ok(Task {
        id,
        name,
        status,
        created_at,
        started_at,
        completed_at,
        priority,
        effort,
        spec_readiness,
        owner,
        tags,
        depends_on,
        body: body.trim_end().to_string(),
        extra: table.into_iter().collect(),
    })
}

fn split_frontmatter(text: &str) -> std::result::Result<(toml::Table, &str), DecodeError> {
    let rest = strip_fence_line(text)
        .ok_or_else(|| DecodeError::new(format!("record must start with a '{FENCE}' line")))?;
    let closing = closing_fence(rest)?;
    let body = &rest[closing.body_start..];
    let body = body
        .strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(body);
    Ok((closing.table, body))
}

struct ClosingFence {
    table: toml::Table,
    meta_len: usize,
    body_start: usize,
}

/// Locate the fence that closes the metadata block.
///
/// Multi-line strings may contain a line that reads `+++`, so the closing
/// fence is the first fence line before which the metadata parses.
fn closing_fence(rest: &str) -> std::result::Result<ClosingFence, DecodeError> {
    let mut first_error = None;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\n', '\r']) == FENCE {
            match toml::from_str::<toml::Table>(&rest[..offset]) {
                Ok(table) => {
                    return Ok(ClosingFence {
                        table,
                        meta_len: offset,
                        body_start: offset + line.len(),
                    });
                }
                Err(err) => {
                    first_error.get_or_insert_with(|| {
                        DecodeError::new(format!("malformed metadata: {}", err.message()))
                    });
                }
            }
        }
        offset += line.len();
    }
    Err(first_error.unwrap_or_else(|| {
        DecodeError::new(format!("metadata block is not closed by a '{FENCE}' line"))
    }))
}

fn strip_fence_line(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(FENCE)?;
    rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_choice<T>(value: &str, field: &str) -> std::result::Result<T, DecodeError>
where
    T: std::str::FromStr<Err = Error>,
{
    value
        .parse()
        .map_err(|err: Error| DecodeError::field(field, err.to_string()))
}

fn required_string(table: &mut toml::Table, key: &str) -> std::result::Result<String, DecodeError> {
    optional_string(table, key)?
        .ok_or_else(|| DecodeError::field(key, "required key is missing"))
}

fn optional_string(
    table: &mut toml::Table,
    key: &str,
) -> std::result::Result<Option<String>, DecodeError> {
    match table.remove(key) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(other) => Err(DecodeError::field(
            key,
            format!("expected a string, found {}", other.type_str()),
        )),
    }
}

fn required_date(table: &mut toml::Table, key: &str) -> std::result::Result<NaiveDate, DecodeError> {
    optional_date(table, key)?.ok_or_else(|| DecodeError::field(key, "required key is missing"))
}

fn optional_date(
    table: &mut toml::Table,
    key: &str,
) -> std::result::Result<Option<NaiveDate>, DecodeError> {
    match table.remove(key) {
        None => Ok(None),
        Some(Value::String(value)) if value.trim().is_empty() => Ok(None),
        Some(Value::String(value)) => NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
            .map(Some)
            .map_err(|err| DecodeError::field(key, format!("invalid date '{value}': {err}"))),
        // Hand-edited records may use a bare TOML date.
        Some(Value::Datetime(datetime)) => datetime
            .date
            .and_then(|date| {
                NaiveDate::from_ymd_opt(i32::from(date.year), date.month.into(), date.day.into())
            })
            .map(Some)
            .ok_or_else(|| DecodeError::field(key, format!("invalid date '{datetime}'"))),
        Some(other) => Err(DecodeError::field(
            key,
            format!("expected a date, found {}", other.type_str()),
        )),
    }
}

fn string_list(table: &mut toml::Table, key: &str) -> std::result::Result<Vec<String>, DecodeError> {
    match table.remove(key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(value) => Ok(value),
                other => Err(DecodeError::field(
                    key,
                    format!("expected strings, found {}", other.type_str()),
                )),
            })
            .collect(),
        Some(other) => Err(DecodeError::field(
            key,
            format!("expected an array, found {}", other.type_str()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Effort, Priority, SpecReadiness, Status};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    fn sample_task() -> Task {
        let mut task = Task::new("t-20260105-002", "wire-parser", date(2026, 1, 5));
        task.status = Status::Doing;
        task.started_at = Some(date(2026, 1, 6));
        task.priority = Priority::P1;
        task.effort = Effort::L;
        task.spec_readiness = SpecReadiness::Ready;
        task.owner = Some("alice".to_string());
        task.tags = ["parser", "api"].iter().map(|t| t.to_string()).collect();
        task.depends_on = vec!["t-20260104-001".to_string()];
        task.body = "## Summary\n- Wire the parser\n\n## Acceptance Criteria\n- Tests pass".to_string();
        task
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let mut task = sample_task();
        task.extra
            .insert("estimate_hours".to_string(), Value::Integer(6));
        let mut nested = toml::Table::new();
        nested.insert("url".to_string(), Value::String("https://example.com/1".to_string()));
        task.extra.insert("link".to_string(), Value::Table(nested));

        let encoded = encode(&task).expect("encode");
        let decoded = decode(&encoded).expect("decode");
        assert_eq!(decoded, task);
    }

    #[test]
    fn tag_order_does_not_affect_encoding() {
        let mut left = sample_task();
        left.tags = ["b", "a"].iter().map(|t| t.to_string()).collect();
        let mut right = sample_task();
        right.tags = ["a", "b"].iter().map(|t| t.to_string()).collect();
        assert_eq!(encode(&left).expect("left"), encode(&right).expect("right"));
    }

    #[test]
    fn encoding_uses_fixed_key_order() {
        let encoded = encode(&sample_task()).expect("encode");
        let positions: Vec<usize> = ["task_id", "task_name", "status", "date_created", "priority", "tags"]
            .iter()
            .map(|key| encoded.find(&format!("{key} = ")).expect(key))
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
        assert!(encoded.starts_with("+++\n"));
        assert!(encoded.ends_with("- Tests pass\n"));
        assert!(!encoded.contains("date_completed"));
    }

    #[test]
    fn decode_defaults_optional_fields() {
        let text = "+++\ntask_id = \"t-20260101-001\"\ntask_name = \"a\"\nstatus = \"todo\"\ndate_created = \"2026-01-01\"\n+++\n\nbody\n";
        let task = decode(text).expect("decode");
        assert_eq!(task.priority, Priority::P2);
        assert_eq!(task.effort, Effort::M);
        assert_eq!(task.spec_readiness, SpecReadiness::Unspecified);
        assert!(task.tags.is_empty());
        assert!(task.depends_on.is_empty());
        assert_eq!(task.body, "body");
    }

    #[test]
    fn decode_accepts_bare_toml_dates_and_legacy_status() {
        let text = "+++\ntask_id = \"t-20260101-001\"\ntask_name = \"a\"\nstatus = \"completed\"\ndate_created = 2026-01-01\ndate_completed = 2026-01-03\n+++\n";
        let task = decode(text).expect("decode");
        assert_eq!(task.status, Status::Done);
        assert_eq!(task.created_at, date(2026, 1, 1));
        assert_eq!(task.completed_at, Some(date(2026, 1, 3)));
        assert_eq!(task.body, "");
    }

    #[test]
    fn decode_rejects_out_of_set_enum() {
        let text = "+++\ntask_id = \"t-20260101-001\"\ntask_name = \"a\"\nstatus = \"todo\"\ndate_created = \"2026-01-01\"\neffort = \"huge\"\n+++\n";
        let err = decode(text).expect_err("bad effort");
        assert_eq!(err.field.as_deref(), Some("effort"));
    }

    #[test]
    fn decode_rejects_missing_required_key() {
        let text = "+++\ntask_name = \"a\"\nstatus = \"todo\"\ndate_created = \"2026-01-01\"\n+++\n";
        let err = decode(text).expect_err("missing id");
        assert_eq!(err.field.as_deref(), Some("task_id"));
    }

    #[test]
    fn decode_rejects_malformed_fences_and_metadata() {
        assert!(decode("no frontmatter here").is_err());
        assert!(decode("+++\ntask_id = \"x\"\n").is_err());
        let err = decode("+++\ntask_id = = \n+++\n").expect_err("bad toml");
        assert!(err.field.is_none());
    }

    #[test]
    fn fence_lines_inside_strings_round_trip() {
        let mut task = sample_task();
        task.owner = Some("a\n+++\nb".to_string());
        task.extra
            .insert("notes".to_string(), Value::String("+++\nsplit\n+++".to_string()));
        task.body = "intro\n+++\nafter".to_string();

        let encoded = encode(&task).expect("encode");
        let decoded = decode(&encoded).expect("decode");
        assert_eq!(decoded, task);
    }

    #[test]
    fn decode_rejects_names_that_are_not_directory_safe() {
        for name in ["../../escaped", "a/b", "", "Upper"] {
            let text = format!(
                "+++\ntask_id = \"t-20260101-001\"\ntask_name = \"{name}\"\nstatus = \"todo\"\ndate_created = \"2026-01-01\"\n+++\n"
            );
            let err = decode(&text).expect_err(name);
            assert_eq!(err.field.as_deref(), Some("task_name"), "{name}");
        }
    }
}
