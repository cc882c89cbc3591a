//! Lifecycle store.
//!
//! [`TaskStore`] is the only component that mutates a task tree. Each
//! operation scans the tree, validates its preconditions against what is on
//! disk right now, and then performs the smallest possible mutation: an
//! atomic file replace, an append, or a single directory rename.
//!
//! Two processes racing to create the same name can both pass the duplicate
//! check; the window is narrowed by checking again immediately before the
//! staged task is published, but it is not closed.
//!
//! Status transitions rewrite `task.md` in place and then rename the
//! directory into the new bucket. Between the two steps a reader sees the
//! new status in the old bucket; the recorded status is authoritative, so
//! the record write is the commit point and the rename only catches the
//! projection up. If the rename fails the record is restored.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::activity::{append_log_entry, read_log, ActivityEntry, ActivityKind};
use crate::config;
use crate::deps::{self, DependencyReport, DependencyState, Readiness};
use crate::error::{Error, IoContext, Result};
use crate::record::{self, DecodeError};
use crate::storage::{self, Layout};
use crate::task::{
    dedup_ids, normalize_tags, reject_line_breaks, validate_task_name, DependencyEdit, NewTask,
    Status, TagEdit, Task, TaskEdits,
};
use crate::task_id;

/// Actor recorded in log entries when none is configured
pub const DEFAULT_ACTOR: &str = "human";

/// Tag row label for tasks without tags in [`TaskStore::tag_counts`]
pub const UNTAGGED: &str = "(untagged)";

const MAX_ALLOCATION_ATTEMPTS: usize = 16;

/// A decoded task together with the directory it was loaded from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredTask {
    #[serde(flatten)]
    pub task: Task,
    pub dir: PathBuf,
}

impl StoredTask {
    fn dir_name(&self) -> Option<&str> {
        self.dir.file_name().and_then(|name| name.to_str())
    }

    fn matches(&self, selector: &str) -> bool {
        self.task.id == selector || self.task.name == selector || self.dir_name() == Some(selector)
    }

    fn to_ref(&self) -> TaskRef {
        TaskRef {
            id: self.task.id.clone(),
            name: self.task.name.clone(),
            status: self.task.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRef {
    pub id: String,
    pub name: String,
    pub status: Status,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub root: PathBuf,
    /// False when the store already existed.
    pub created: bool,
    pub settings_created: bool,
}

/// Filters for [`TaskStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<Status>,
    /// Keep tasks carrying any of these tags (all of them with `all_tags`).
    pub tags: Vec<String>,
    pub all_tags: bool,
    pub exclude_tags: Vec<String>,
    pub untagged: bool,
    pub include_trash: bool,
}

impl ListFilter {
    fn matches(&self, task: &Task) -> bool {
        match self.status {
            Some(status) if task.status != status => return false,
            None if task.status == Status::Trashed && !self.include_trash => return false,
            _ => {}
        }
        if self.untagged && !task.tags.is_empty() {
            return false;
        }
        let include = normalize_tags(&self.tags);
        if !include.is_empty() {
            let keep = if self.all_tags {
                include.is_subset(&task.tags)
            } else {
                !include.is_disjoint(&task.tags)
            };
            if !keep {
                return false;
            }
        }
        let exclude = normalize_tags(&self.exclude_tags);
        exclude.is_disjoint(&task.tags)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub total: usize,
    pub todo: usize,
    pub doing: usize,
    pub done: usize,
}

impl TagCount {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            total: 0,
            todo: 0,
            doing: 0,
            done: 0,
        }
    }

    fn count(&mut self, status: Status) {
        self.total += 1;
        match status {
            Status::Todo => self.todo += 1,
            Status::Doing => self.doing += 1,
            Status::Done => self.done += 1,
            Status::Trashed => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyRow {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub state: DependencyState,
}

/// Everything known about one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: StoredTask,
    pub readiness: Readiness,
    pub dependencies: Vec<DependencyRow>,
    /// Active tasks that list this one in `depends_on`.
    pub dependents: Vec<TaskRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    pub activity: Vec<ActivityEntry>,
}

#[derive(Debug, Clone, Copy)]
enum Clock {
    System,
    Fixed(NaiveDateTime),
}

/// Handle to one task tree.
#[derive(Debug, Clone)]
pub struct TaskStore {
    layout: Layout,
    actor: String,
    clock: Clock,
}

impl TaskStore {
    fn with_layout(layout: Layout) -> Self {
        Self {
            layout,
            actor: DEFAULT_ACTOR.to_string(),
            clock: Clock::System,
        }
    }

    /// Open an existing store rooted at `root` (the `.tasks` directory).
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let layout = Layout::new(root);
        if !layout.is_initialized() {
            return Err(Error::unavailable(
                layout.root(),
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "no task store here (run `dot-tasks init`)",
                ),
            ));
        }
        Ok(Self::with_layout(layout))
    }

    /// Create the store layout and default settings. Safe to re-run.
    pub fn init(root: impl Into<PathBuf>) -> Result<(Self, InitReport)> {
        let layout = Layout::new(root);
        let existed = layout.is_initialized();
        layout.ensure()?;
        let settings_created = config::write_default_if_missing(&layout.config_file())?;
        tracing::debug!(root = %layout.root().display(), existed, settings_created, "initialized task store");
        let report = InitReport {
            root: layout.root().to_path_buf(),
            created: !existed,
            settings_created,
        };
        Ok((Self::with_layout(layout), report))
    }

    /// Actor written into log entries.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        let actor = actor.into();
        let actor = actor.trim();
        self.actor = if actor.is_empty() {
            DEFAULT_ACTOR.to_string()
        } else {
            actor.to_string()
        };
        self
    }

    /// Pin the clock, for deterministic dates and log timestamps.
    pub fn with_clock(mut self, now: NaiveDateTime) -> Self {
        self.clock = Clock::Fixed(now);
        self
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Location of the settings document. The store itself never reads it.
    pub fn config_file(&self) -> PathBuf {
        self.layout.config_file()
    }

    fn now(&self) -> NaiveDateTime {
        match self.clock {
            Clock::System => Local::now().naive_local(),
            Clock::Fixed(now) => now,
        }
    }

    // =========================================================================
    // Lifecycle operations
    // =========================================================================

    /// Create a task in `todo`.
    ///
    /// The task is assembled in a staging directory and published with a
    /// single rename, so readers never see a task without its log.
    pub fn create(&self, name: &str, fields: NewTask) -> Result<StoredTask> {
        let name = name.trim();
        validate_task_name(name)?;
        if let Some(owner) = fields.owner.as_deref() {
            reject_line_breaks("owner", owner)?;
        }
        for tag in &fields.tags {
            reject_line_breaks("tags", tag)?;
        }

        let scan = self.scan()?;
        if scan.name_taken(name, None) {
            return Err(Error::DuplicateName {
                name: name.to_string(),
            });
        }
        let reserved = self.layout.reserved_ids()?;
        let depends_on = resolve_dependency_refs(&scan, &reserved, &fields.depends_on)?;

        let now = self.now();
        let id = self.allocate_id(now.date(), &scan, reserved)?;

        let mut task = Task::new(&id, name, now.date());
        if let Some(priority) = fields.priority {
            task.priority = priority;
        }
        if let Some(effort) = fields.effort {
            task.effort = effort;
        }
        if let Some(readiness) = fields.spec_readiness {
            task.spec_readiness = readiness;
        }
        task.owner = fields.owner.as_deref().and_then(non_empty);
        task.tags = normalize_tags(&fields.tags);
        task.depends_on = depends_on;
        task.body = seed_body(fields.summary.as_deref());

        let dest = self.layout.task_dir(Status::Todo, &task.dir_name());
        let entry = ActivityEntry::new(
            now,
            &self.actor,
            ActivityKind::Created,
            format!("Task created ({id})"),
        );
        let staging = self.layout.staging_task_dir(&id)?;
        if let Err(err) = self.publish(&task, &entry, &staging, &dest) {
            if let Err(cleanup) = storage::remove_dir(&staging) {
                tracing::warn!(path = %staging.display(), error = %cleanup, "failed to clean up staged task");
            }
            return Err(err);
        }

        tracing::debug!(id = %task.id, dir = %dest.display(), "created task");
        Ok(StoredTask { task, dir: dest })
    }

    fn publish(&self, task: &Task, entry: &ActivityEntry, staging: &Path, dest: &Path) -> Result<()> {
        storage::write_atomic(&storage::task_file(staging), record::encode(task)?.as_bytes())?;
        storage::write_atomic(&storage::activity_file(staging), &append_log_entry(&[], entry))?;

        // A concurrent creator may have taken the name since the first scan.
        if dest.exists() || self.scan()?.name_taken(&task.name, Some(&task.id)) {
            return Err(Error::DuplicateName {
                name: task.name.clone(),
            });
        }
        storage::relocate_dir(&task.id, staging, dest)
    }

    fn allocate_id(&self, day: NaiveDate, scan: &Scan, mut reserved: Vec<String>) -> Result<String> {
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let id = task_id::allocate(
                day,
                scan.tasks
                    .iter()
                    .map(|stored| stored.task.id.as_str())
                    .chain(reserved.iter().map(String::as_str)),
            );
            if self.layout.reserve_id(&id)? {
                return Ok(id);
            }
            tracing::debug!(%id, attempt, "identifier already reserved; rescanning");
            reserved = self.layout.reserved_ids()?;
        }
        Err(Error::unavailable(
            self.layout.ids_dir(),
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                "could not reserve a task identifier",
            ),
        ))
    }

    /// Move a `todo` task to `doing`.
    ///
    /// Trashed tasks are selectable here only so that starting one reports
    /// an invalid transition rather than a missing task.
    ///
    /// Unless `force` is set every dependency must be done. A forced start
    /// records the overridden dependency ids in the log.
    pub fn start(&self, selector: &str, force: bool) -> Result<StoredTask> {
        let scan = self.scan()?;
        let stored = scan.select(selector, true)?;
        if stored.task.status != Status::Todo {
            return Err(invalid_transition(&stored.task, "start"));
        }

        let report = deps::check(&stored.task, |id| scan.status_of(id));
        let note = match report.to_error() {
            None => "Task started".to_string(),
            Some(_) if force => format!(
                "Task started with --force; unmet dependencies: {}",
                report.blocking_ids().join(", ")
            ),
            Some(err) => return Err(err),
        };

        let mut task = stored.task.clone();
        task.status = Status::Doing;
        task.started_at.get_or_insert(self.now().date());
        let to = self.layout.task_dir(Status::Doing, &task.dir_name());
        self.transition(stored, task, to, ActivityKind::Started, note, true)
    }

    /// Move a `doing` task to `done`.
    pub fn complete(&self, selector: &str) -> Result<StoredTask> {
        let scan = self.scan()?;
        let stored = scan.select(selector, true)?;
        if stored.task.status != Status::Doing {
            return Err(invalid_transition(&stored.task, "complete"));
        }

        let mut task = stored.task.clone();
        task.status = Status::Done;
        task.completed_at.get_or_insert(self.now().date());
        let to = self.layout.task_dir(Status::Done, &task.dir_name());
        self.transition(
            stored,
            task,
            to,
            ActivityKind::Completed,
            "Task completed".to_string(),
            false,
        )
    }

    /// Apply field edits to an active task in place.
    ///
    /// Writes one `updated` log entry naming the touched fields, then a
    /// `note` entry when `note` is given. With no edits the note alone is
    /// appended.
    pub fn update(&self, selector: &str, edits: TaskEdits, note: Option<&str>) -> Result<StoredTask> {
        let note = note.and_then(non_empty);
        if edits.is_empty() && note.is_none() {
            return Err(Error::validation("edits", "no changes requested"));
        }
        if let Some(owner) = edits.owner.as_deref() {
            reject_line_breaks("owner", owner)?;
        }
        if let Some(TagEdit::Add(tags) | TagEdit::Replace(tags)) = &edits.tags {
            for tag in tags {
                reject_line_breaks("tags", tag)?;
            }
        }

        let scan = self.scan()?;
        let stored = scan.select(selector, false)?;
        let touched = edits.touched_fields();
        let mut task = stored.task.clone();

        if let Some(priority) = edits.priority {
            task.priority = priority;
        }
        if let Some(effort) = edits.effort {
            task.effort = effort;
        }
        if let Some(readiness) = edits.spec_readiness {
            task.spec_readiness = readiness;
        }
        if let Some(owner) = edits.owner.as_deref() {
            task.owner = non_empty(owner);
        }
        match edits.tags {
            Some(TagEdit::Add(tags)) => task.tags.extend(normalize_tags(&tags)),
            Some(TagEdit::Replace(tags)) => task.tags = normalize_tags(&tags),
            None => {}
        }
        if let Some(edit) = edits.depends_on {
            let reserved = self.layout.reserved_ids()?;
            task.depends_on = match edit {
                DependencyEdit::Add(refs) => {
                    let mut ids = task.depends_on.clone();
                    ids.extend(resolve_dependency_refs(&scan, &reserved, &refs)?);
                    dedup_ids(ids)
                }
                DependencyEdit::Clear => Vec::new(),
                DependencyEdit::Replace(refs) => resolve_dependency_refs(&scan, &reserved, &refs)?,
            };
            deps::reject_self_reference(&task.id, &task.depends_on)?;
            let mut graph = scan.graph();
            graph.insert(task.id.clone(), task.depends_on.clone());
            deps::ensure_acyclic_from(&graph, &task.id)?;
        }
        if let Some(body) = edits.body {
            task.body = body.trim_end().to_string();
        }

        let now = self.now();
        let activity = storage::activity_file(&stored.dir);
        if !touched.is_empty() {
            let record_path = storage::task_file(&stored.dir);
            storage::write_atomic(&record_path, record::encode(&task)?.as_bytes())?;
            let entry = ActivityEntry::new(
                now,
                &self.actor,
                ActivityKind::Updated,
                format!("Updated {}", touched.join(", ")),
            );
            storage::append_entry(&activity, &entry)?;
        }
        if let Some(note) = note {
            let entry = ActivityEntry::new(now, &self.actor, ActivityKind::Note, note);
            storage::append_entry(&activity, &entry)?;
        }

        tracing::debug!(id = %task.id, fields = ?touched, "updated task");
        Ok(StoredTask {
            task,
            dir: stored.dir.clone(),
        })
    }

    /// Append a free-form note to an active task's log.
    pub fn log(&self, selector: &str, note: &str) -> Result<ActivityEntry> {
        let note = non_empty(note).ok_or_else(|| Error::validation("note", "note is required"))?;
        let scan = self.scan()?;
        let stored = scan.select(selector, false)?;
        let entry = ActivityEntry::new(self.now(), &self.actor, ActivityKind::Note, note);
        storage::append_entry(&storage::activity_file(&stored.dir), &entry)?;
        tracing::debug!(id = %stored.task.id, "logged note");
        Ok(entry)
    }

    /// Give an active task a new name, moving its directory.
    ///
    /// The id, dependency edges in both directions, and the log are
    /// unchanged. Renaming to the current name is a no-op.
    pub fn rename(&self, selector: &str, new_name: &str) -> Result<StoredTask> {
        let new_name = new_name.trim();
        validate_task_name(new_name)?;

        let scan = self.scan()?;
        let stored = scan.select(selector, false)?;
        if stored.task.name == new_name {
            return Ok(stored.clone());
        }
        if scan.name_taken(new_name, Some(&stored.task.id)) {
            return Err(Error::DuplicateName {
                name: new_name.to_string(),
            });
        }

        let mut task = stored.task.clone();
        let old_name = std::mem::replace(&mut task.name, new_name.to_string());
        let to = self.layout.task_dir(task.status, &task.dir_name());
        if to.exists() {
            return Err(Error::DuplicateName {
                name: new_name.to_string(),
            });
        }
        let note = format!("Task renamed from {old_name} to {new_name}");
        self.transition(stored, task, to, ActivityKind::Renamed, note, false)
    }

    /// Trash a task, or remove it permanently with `hard`.
    ///
    /// Trashed tasks can still be selected by this operation, so a task can
    /// be hard-deleted out of the trash. Returns the task as it was last
    /// stored.
    pub fn delete(&self, selector: &str, hard: bool) -> Result<StoredTask> {
        let scan = self.scan()?;
        let stored = scan.select(selector, true)?;

        if hard {
            storage::remove_dir(&stored.dir)?;
            tracing::debug!(id = %stored.task.id, dir = %stored.dir.display(), "hard-deleted task");
            return Ok(stored.clone());
        }

        if stored.task.status == Status::Trashed {
            return Err(invalid_transition(&stored.task, "delete"));
        }
        let mut task = stored.task.clone();
        task.status = Status::Trashed;
        let to = self.layout.unique_trash_dir(&task.dir_name());
        self.transition(
            stored,
            task,
            to,
            ActivityKind::Trashed,
            "Task moved to trash".to_string(),
            false,
        )
    }

    /// Rewrite the record and move the task directory to `to`.
    ///
    /// The record is rewritten before the move and restored if the move
    /// fails, together with a plan file created by this call. The log entry
    /// is appended only once the task sits at its new location.
    fn transition(
        &self,
        stored: &StoredTask,
        task: Task,
        to: PathBuf,
        kind: ActivityKind,
        note: String,
        create_plan: bool,
    ) -> Result<StoredTask> {
        let from = stored.dir.as_path();
        let moving = to != from;
        if moving && to.exists() {
            return Err(Error::StoreCorruption {
                id: task.id.clone(),
                from: from.to_path_buf(),
                to,
            });
        }

        let record_path = storage::task_file(from);
        let previous = fs::read(&record_path).at(&record_path)?;
        storage::write_atomic(&record_path, record::encode(&task)?.as_bytes())?;

        let plan_path = storage::plan_file(from);
        let plan_created = if create_plan {
            match storage::create_if_missing(&plan_path) {
                Ok(created) => created,
                Err(err) => {
                    restore_record(&record_path, &previous);
                    return Err(err);
                }
            }
        } else {
            false
        };

        if moving {
            if let Err(err) = storage::relocate_dir(&task.id, from, &to) {
                if plan_created {
                    if let Err(cleanup) = fs::remove_file(&plan_path) {
                        tracing::warn!(path = %plan_path.display(), error = %cleanup, "failed to remove plan after aborted move");
                    }
                }
                restore_record(&record_path, &previous);
                return Err(err);
            }
        }

        let entry = ActivityEntry::new(self.now(), &self.actor, kind, note);
        storage::append_entry(&storage::activity_file(&to), &entry)?;
        tracing::debug!(
            id = %task.id,
            kind = %entry.kind,
            from = %from.display(),
            to = %to.display(),
            "task transitioned"
        );
        Ok(StoredTask { task, dir: to })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The single active task matching `selector` (id, name or directory name).
    pub fn resolve(&self, selector: &str) -> Result<StoredTask> {
        self.scan()?.select(selector, false).cloned()
    }

    /// Tasks matching `filter`, ordered by status, priority, creation date
    /// and name.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<StoredTask>> {
        let mut tasks: Vec<StoredTask> = self
            .scan()?
            .tasks
            .into_iter()
            .filter(|stored| filter.matches(&stored.task))
            .collect();
        tasks.sort_by(|a, b| {
            (a.task.status, a.task.priority, a.task.created_at, &a.task.name).cmp(&(
                b.task.status,
                b.task.priority,
                b.task.created_at,
                &b.task.name,
            ))
        });
        Ok(tasks)
    }

    /// Per-tag task counts over active tasks, sorted by tag.
    pub fn tag_counts(&self, status: Option<Status>, include_untagged: bool) -> Result<Vec<TagCount>> {
        let scan = self.scan()?;
        let mut counts: BTreeMap<&str, TagCount> = BTreeMap::new();
        for stored in scan.active() {
            let task = &stored.task;
            if status.is_some_and(|status| status != task.status) {
                continue;
            }
            if task.tags.is_empty() {
                if include_untagged {
                    counts
                        .entry(UNTAGGED)
                        .or_insert_with(|| TagCount::new(UNTAGGED))
                        .count(task.status);
                }
                continue;
            }
            for tag in &task.tags {
                counts
                    .entry(tag.as_str())
                    .or_insert_with(|| TagCount::new(tag))
                    .count(task.status);
            }
        }
        Ok(counts.into_values().collect())
    }

    /// Full detail for one task. Trashed tasks can be viewed too.
    pub fn view(&self, selector: &str) -> Result<TaskView> {
        let scan = self.scan()?;
        let stored = scan.select(selector, true)?;
        let report = deps::check(&stored.task, |id| scan.status_of(id));

        let dependencies = report
            .dependencies
            .iter()
            .map(|dep| DependencyRow {
                id: dep.id.clone(),
                name: scan.by_id(&dep.id).map(|found| found.task.name.clone()),
                state: dep.state,
            })
            .collect();
        let dependents = scan
            .active()
            .filter(|other| other.task.depends_on.contains(&stored.task.id))
            .map(StoredTask::to_ref)
            .collect();

        let plan = storage::read_optional(&storage::plan_file(&stored.dir))?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
        let log = storage::read_optional(&storage::activity_file(&stored.dir))?.unwrap_or_default();
        let activity = read_log(&log).collect();

        Ok(TaskView {
            task: stored.clone(),
            readiness: report.readiness,
            dependencies,
            dependents,
            plan,
            activity,
        })
    }

    /// Dependency readiness of an active task.
    pub fn check(&self, selector: &str) -> Result<DependencyReport> {
        let scan = self.scan()?;
        let stored = scan.select(selector, false)?;
        Ok(deps::check(&stored.task, |id| scan.status_of(id)))
    }

    /// Decode every task in the tree, trash included.
    ///
    /// A task whose record cannot be decoded is skipped with a warning so
    /// the rest of the store stays usable.
    fn scan(&self) -> Result<Scan> {
        let mut scan = Scan::default();
        for dir in self.layout.task_dirs(true)? {
            let record_path = storage::task_file(&dir.path);
            let bytes = match fs::read(&record_path) {
                Ok(bytes) => bytes,
                // Moved by a concurrent transition since the bucket was listed.
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(path = %record_path.display(), "task vanished during scan");
                    continue;
                }
                Err(err) => return Err(Error::unavailable(&record_path, err)),
            };
            let decoded = String::from_utf8(bytes)
                .map_err(|_| DecodeError {
                    field: None,
                    reason: "record is not valid UTF-8".to_string(),
                })
                .and_then(|text| record::decode(&text));
            match decoded {
                Ok(task) => {
                    if task.status != dir.bucket {
                        tracing::warn!(
                            id = %task.id,
                            status = %task.status,
                            bucket = dir.bucket.bucket(),
                            "task status disagrees with its bucket; using the recorded status"
                        );
                    }
                    scan.tasks.push(StoredTask {
                        task,
                        dir: dir.path,
                    });
                }
                Err(error) => {
                    tracing::warn!(path = %record_path.display(), %error, "skipping undecodable task");
                    scan.broken.push(BrokenTask {
                        dir: dir.path,
                        error,
                    });
                }
            }
        }
        Ok(scan)
    }
}

fn invalid_transition(task: &Task, operation: &'static str) -> Error {
    Error::InvalidTransition {
        id: task.id.clone(),
        from: task.status,
        operation,
    }
}

fn restore_record(path: &Path, previous: &[u8]) {
    if let Err(err) = storage::write_atomic(path, previous) {
        tracing::error!(path = %path.display(), error = %err, "failed to restore task record");
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn seed_body(summary: Option<&str>) -> String {
    let summary = summary.and_then(non_empty);
    format!(
        "## Summary\n- {}\n\n## Acceptance Criteria\n- TODO",
        summary.as_deref().unwrap_or("TODO")
    )
}

/// Turn dependency references into ids.
///
/// A reference may name or identify an active task. An id that no longer
/// resolves to an active task is still accepted when it was allocated in
/// this store at some point (trashed or hard-deleted), so the edge can be
/// reported as dangling later. Anything else is a validation error.
fn resolve_dependency_refs(scan: &Scan, reserved: &[String], refs: &[String]) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for raw in refs {
        let reference = raw.trim();
        if reference.is_empty() {
            continue;
        }
        match scan.select(reference, false) {
            Ok(stored) => ids.push(stored.task.id.clone()),
            Err(Error::NotFound { .. })
                if scan.by_id(reference).is_some() || reserved.iter().any(|id| id == reference) =>
            {
                ids.push(reference.to_string());
            }
            Err(Error::NotFound { .. }) => {
                return Err(Error::validation(
                    "depends_on",
                    format!("unknown dependency '{reference}'"),
                ));
            }
            Err(err) => return Err(err),
        }
    }
    Ok(dedup_ids(ids))
}

#[derive(Debug)]
struct BrokenTask {
    dir: PathBuf,
    error: DecodeError,
}

/// Result of reading the whole tree once.
#[derive(Debug, Default)]
struct Scan {
    tasks: Vec<StoredTask>,
    broken: Vec<BrokenTask>,
}

impl Scan {
    fn active(&self) -> impl Iterator<Item = &StoredTask> {
        self.tasks.iter().filter(|stored| stored.task.status.is_active())
    }

    fn by_id(&self, id: &str) -> Option<&StoredTask> {
        self.tasks.iter().find(|stored| stored.task.id == id)
    }

    fn status_of(&self, id: &str) -> Option<Status> {
        self.by_id(id).map(|stored| stored.task.status)
    }

    fn name_taken(&self, name: &str, except_id: Option<&str>) -> bool {
        self.active()
            .any(|stored| stored.task.name == name && Some(stored.task.id.as_str()) != except_id)
    }

    /// Dependency edges between active tasks.
    fn graph(&self) -> BTreeMap<String, Vec<String>> {
        self.active()
            .map(|stored| (stored.task.id.clone(), stored.task.depends_on.clone()))
            .collect()
    }

    /// Resolve a selector to exactly one task.
    ///
    /// Active tasks are searched first; the trash only when nothing active
    /// matches and `include_trash` is set.
    fn select(&self, selector: &str, include_trash: bool) -> Result<&StoredTask> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(Error::validation("selector", "task selector cannot be empty"));
        }

        let mut found: Vec<&StoredTask> = self.active().filter(|stored| stored.matches(selector)).collect();
        if found.is_empty() && include_trash {
            found = self
                .tasks
                .iter()
                .filter(|stored| !stored.task.status.is_active() && stored.matches(selector))
                .collect();
        }

        match found.as_slice() {
            [single] => Ok(*single),
            [] => Err(self.missing(selector)),
            many => {
                let matches: BTreeSet<String> = many.iter().map(|stored| stored.task.id.clone()).collect();
                Err(Error::Ambiguous {
                    selector: selector.to_string(),
                    matches: matches.into_iter().collect(),
                })
            }
        }
    }

    /// `NotFound`, unless the selector names a task that failed to decode.
    fn missing(&self, selector: &str) -> Error {
        let broken = self.broken.iter().find(|broken| {
            let dir_name = broken.dir.file_name().and_then(|name| name.to_str());
            dir_name == Some(selector) || dir_name.and_then(|name| name.get(11..)) == Some(selector)
        });
        match broken {
            Some(broken) => Error::decode(
                storage::task_file(&broken.dir),
                broken.error.field.clone(),
                broken.error.reason.clone(),
            ),
            None => Error::NotFound {
                selector: selector.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, TaskStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, _) = TaskStore::init(dir.path().join(".tasks")).expect("init");
        let now = NaiveDate::from_ymd_opt(2026, 1, 5)
            .and_then(|date| date.and_hms_opt(9, 30, 0))
            .expect("now");
        (dir, store.with_clock(now))
    }

    #[test]
    fn open_requires_initialized_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = TaskStore::open(dir.path().join(".tasks")).expect_err("missing");
        assert_eq!(err.kind(), "store_unavailable");
    }

    #[test]
    fn init_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join(".tasks");
        let (_, first) = TaskStore::init(&root).expect("init");
        let (_, second) = TaskStore::init(&root).expect("init");
        assert!(first.created && first.settings_created);
        assert!(!second.created && !second.settings_created);
    }

    #[test]
    fn body_is_seeded_with_summary() {
        let (_dir, store) = store();
        let fields = NewTask {
            summary: Some("  Write the docs ".to_string()),
            ..NewTask::default()
        };
        let created = store.create("docs", fields).expect("create");
        assert!(created.task.body.starts_with("## Summary\n- Write the docs\n"));
        assert!(created.task.body.contains("## Acceptance Criteria"));
    }

    #[test]
    fn selector_matches_directory_name() {
        let (_dir, store) = store();
        store.create("alpha", NewTask::default()).expect("create");
        let found = store.resolve("2026-01-05-alpha").expect("resolve");
        assert_eq!(found.task.name, "alpha");
    }

    #[test]
    fn selector_matching_two_tasks_is_ambiguous() {
        let (_dir, store) = store();
        let first = store.create("alpha", NewTask::default()).expect("create");
        // A second task whose name equals the first task's id.
        store.create(&first.task.id, NewTask::default()).expect("create");
        let err = store.resolve(&first.task.id).expect_err("ambiguous");
        assert!(matches!(err, Error::Ambiguous { ref matches, .. } if matches.len() == 2));
    }

    #[test]
    fn undecodable_task_is_skipped_but_reported_on_selection() {
        let (_dir, store) = store();
        store.create("good", NewTask::default()).expect("create");
        let bad = store.root().join("todo").join("2026-01-05-bad");
        fs::create_dir_all(&bad).expect("mkdir");
        fs::write(bad.join("task.md"), "no frontmatter").expect("write");

        let listed = store.list(&ListFilter::default()).expect("list");
        assert_eq!(listed.len(), 1);

        let err = store.resolve("bad").expect_err("decode");
        assert_eq!(err.kind(), "decode_error");
    }

    #[test]
    fn bucket_disagreement_uses_recorded_status() {
        let (_dir, store) = store();
        let created = store.create("drifted", NewTask::default()).expect("create");
        let moved = store.root().join("done").join(created.dir.file_name().expect("name"));
        fs::rename(&created.dir, &moved).expect("move");

        let found = store.resolve("drifted").expect("resolve");
        assert_eq!(found.task.status, Status::Todo);
        let started = store.start("drifted", false).expect("start");
        assert!(started.dir.starts_with(store.root().join("doing")));
    }
}
