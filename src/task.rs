//! Task entity and its closed field vocabularies.
//!
//! A task's `status` is an explicit field of the record. The status bucket a
//! task directory sits in is derived from it (see [`Status::bucket`]).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{Error, Result};

pub const DEFAULT_PRIORITY: Priority = Priority::P2;
pub const DEFAULT_EFFORT: Effort = Effort::M;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Todo,
    Doing,
    Done,
    Trashed,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::Todo, Status::Doing, Status::Done, Status::Trashed];
    pub const NAMES: [&'static str; 4] = ["todo", "doing", "done", "trashed"];

    pub const fn as_str(self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::Doing => "doing",
            Status::Done => "done",
            Status::Trashed => "trashed",
        }
    }

    /// Directory under the store root that holds tasks with this status.
    pub const fn bucket(self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::Doing => "doing",
            Status::Done => "done",
            Status::Trashed => "trash",
        }
    }

    pub const fn is_active(self) -> bool {
        !matches!(self, Status::Trashed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "todo" => Ok(Status::Todo),
            "doing" => Ok(Status::Doing),
            // Older stores spell the terminal state "completed".
            "done" | "completed" => Ok(Status::Done),
            "trashed" => Ok(Status::Trashed),
            other => Err(Error::invalid_choice("status", other, &Status::NAMES)),
        }
    }
}

macro_rules! closed_enum {
    ($(#[$meta:meta])* $name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const NAMES: &'static [&'static str] = &[$($text),+];

            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(value: &str) -> Result<Self> {
                match value.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::invalid_choice($field, other, $name::NAMES)),
                }
            }
        }
    };
}

closed_enum!(
    /// Urgency, `p0` being the most urgent.
    Priority, "priority", { P0 => "p0", P1 => "p1", P2 => "p2", P3 => "p3" }
);

closed_enum!(
    /// T-shirt size estimate.
    Effort, "effort", { S => "s", M => "m", L => "l", Xl => "xl" }
);

closed_enum!(
    /// How well specified a task is before someone picks it up.
    SpecReadiness, "spec_readiness", {
        Unspecified => "unspecified",
        Rough => "rough",
        Ready => "ready",
        Autonomous => "autonomous",
    }
);

impl Default for SpecReadiness {
    fn default() -> Self {
        SpecReadiness::Unspecified
    }
}

/// One task record.
///
/// `extra` carries metadata keys this version does not know about so they
/// survive a decode/encode cycle untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub status: Status,
    pub created_at: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<NaiveDate>,
    pub priority: Priority,
    pub effort: Effort,
    pub spec_readiness: SpecReadiness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub tags: BTreeSet<String>,
    pub depends_on: Vec<String>,
    pub body: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, toml::Value>,
}

impl Task {
    /// A fresh `todo` task with default metadata.
    pub fn new(id: impl Into<String>, name: impl Into<String>, created_at: NaiveDate) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: Status::Todo,
            created_at,
            started_at: None,
            completed_at: None,
            priority: DEFAULT_PRIORITY,
            effort: DEFAULT_EFFORT,
            spec_readiness: SpecReadiness::default(),
            owner: None,
            tags: BTreeSet::new(),
            depends_on: Vec::new(),
            body: String::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Directory name inside the status bucket: `<created-date>-<name>`.
    pub fn dir_name(&self) -> String {
        dir_name(self.created_at, &self.name)
    }
}

pub fn dir_name(created_at: NaiveDate, name: &str) -> String {
    format!("{}-{}", created_at.format("%Y-%m-%d"), name)
}

/// Fields supplied when creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub summary: Option<String>,
    pub priority: Option<Priority>,
    pub effort: Option<Effort>,
    pub spec_readiness: Option<SpecReadiness>,
    pub owner: Option<String>,
    pub tags: Vec<String>,
    /// Names or ids of tasks this one depends on.
    pub depends_on: Vec<String>,
}

/// How tag edits combine with the existing tag set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagEdit {
    Add(Vec<String>),
    Replace(Vec<String>),
}

/// How dependency edits combine with the existing list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyEdit {
    Add(Vec<String>),
    Clear,
    /// Clear, then add.
    Replace(Vec<String>),
}

/// Field edits applied by `update`. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskEdits {
    pub priority: Option<Priority>,
    pub effort: Option<Effort>,
    pub spec_readiness: Option<SpecReadiness>,
    /// `Some("")` clears the owner.
    pub owner: Option<String>,
    pub tags: Option<TagEdit>,
    pub depends_on: Option<DependencyEdit>,
    pub body: Option<String>,
}

impl TaskEdits {
    pub fn is_empty(&self) -> bool {
        self.priority.is_none()
            && self.effort.is_none()
            && self.spec_readiness.is_none()
            && self.owner.is_none()
            && self.tags.is_none()
            && self.depends_on.is_none()
            && self.body.is_none()
    }

    /// Names of the fields this edit touches, in record order.
    pub fn touched_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.priority.is_some() {
            fields.push("priority");
        }
        if self.effort.is_some() {
            fields.push("effort");
        }
        if self.spec_readiness.is_some() {
            fields.push("spec_readiness");
        }
        if self.depends_on.is_some() {
            fields.push("depends_on");
        }
        if self.owner.is_some() {
            fields.push("owner");
        }
        if self.tags.is_some() {
            fields.push("tags");
        }
        if self.body.is_some() {
            fields.push("body");
        }
        fields
    }
}

/// Names are kebab-case: lowercase ASCII letters and digits in
/// hyphen-separated groups.
pub fn validate_task_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.split('-').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit())
        });
    if valid {
        Ok(())
    } else {
        Err(Error::validation(
            "task_name",
            format!("'{name}' must be kebab-case (lowercase letters, digits, single hyphens)"),
        ))
    }
}

/// Owners and tags are single-line values.
pub fn reject_line_breaks(field: &str, value: &str) -> Result<()> {
    if value.contains(['\n', '\r']) {
        return Err(Error::validation(field, "value must not contain line breaks"));
    }
    Ok(())
}

/// Trim tags and collapse empties and duplicates.
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|tag| tag.as_ref().trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Drop repeated dependency ids, keeping first occurrence order.
pub fn dedup_ids(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_legacy_completed() {
        assert_eq!("completed".parse::<Status>().expect("status"), Status::Done);
        assert_eq!(Status::Trashed.bucket(), "trash");
    }

    #[test]
    fn closed_enums_reject_unknown_values() {
        let err = "p9".parse::<Priority>().expect_err("invalid");
        match err {
            Error::Validation {
                field, expected, ..
            } => {
                assert_eq!(field, "priority");
                assert_eq!(expected, vec!["p0", "p1", "p2", "p3"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!("huge".parse::<Effort>().is_err());
        assert_eq!("xl".parse::<Effort>().expect("effort"), Effort::Xl);
        assert_eq!(
            "autonomous".parse::<SpecReadiness>().expect("readiness"),
            SpecReadiness::Autonomous
        );
    }

    #[test]
    fn task_names_must_be_kebab_case() {
        assert!(validate_task_name("fix-login-2").is_ok());
        assert!(validate_task_name("x").is_ok());
        for bad in ["", "Fix", "a--b", "-a", "a-", "a_b", "a b"] {
            assert!(validate_task_name(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn tags_are_trimmed_and_collapsed() {
        let tags = normalize_tags(["api", " api ", "", "backend"]);
        assert_eq!(
            tags.into_iter().collect::<Vec<_>>(),
            vec!["api".to_string(), "backend".to_string()]
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let ids = dedup_ids(["b", "a", "b"].map(String::from));
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn dir_name_uses_created_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 4).expect("date");
        let task = Task::new("t-20260304-001", "write-docs", date);
        assert_eq!(task.dir_name(), "2026-03-04-write-docs");
    }
}
