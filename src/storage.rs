//! Storage layer for dot-tasks
//!
//! Owns the physical layout of a store and the low-level file operations the
//! lifecycle engine builds on.
//!
//! # Directory Structure
//!
//! ```text
//! .tasks/
//!   config.toml                   # Presentation settings
//!   todo/<date>-<name>/           # task.md, activity.md
//!   doing/<date>-<name>/          # task.md, activity.md, plan.md
//!   done/<date>-<name>/           # task.md, activity.md, plan.md?
//!   trash/<date>-<name>/          # task.md, activity.md, plan.md?
//!   .ids/<task-id>                # One marker per identifier ever allocated
//!   .staging/<task-id>/           # Task being assembled by `create`
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::activity::{append_log_entry, ActivityEntry};
use crate::error::{Error, IoContext, Result};
use crate::git;
use crate::task::Status;

/// Name of the store directory
pub const TASKS_DIR: &str = ".tasks";

pub const TASK_FILE: &str = "task.md";
pub const ACTIVITY_FILE: &str = "activity.md";
pub const PLAN_FILE: &str = "plan.md";
pub const CONFIG_FILE: &str = "config.toml";

const IDS_DIR: &str = ".ids";
const STAGING_DIR: &str = ".staging";

/// Path layout of one store rooted at a `.tasks` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    /// Directory holding every task with `status`
    pub fn bucket_dir(&self, status: Status) -> PathBuf {
        self.root.join(status.bucket())
    }

    pub fn task_dir(&self, status: Status, dir_name: &str) -> PathBuf {
        self.bucket_dir(status).join(dir_name)
    }

    pub fn ids_dir(&self) -> PathBuf {
        self.root.join(IDS_DIR)
    }

    pub fn id_marker(&self, id: &str) -> PathBuf {
        self.ids_dir().join(id)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    pub fn is_initialized(&self) -> bool {
        self.root.is_dir()
    }

    /// Create the bucket and bookkeeping directories. Idempotent.
    pub fn ensure(&self) -> Result<()> {
        for status in Status::ALL {
            let dir = self.bucket_dir(status);
            fs::create_dir_all(&dir).at(&dir)?;
        }
        let ids = self.ids_dir();
        fs::create_dir_all(&ids).at(&ids)?;
        Ok(())
    }

    // =========================================================================
    // Task directory enumeration
    // =========================================================================

    /// Every task directory in the store, bucket by bucket in lifecycle
    /// order, sorted by directory name within a bucket.
    ///
    /// A directory counts as a task when it contains a `task.md`. Missing
    /// buckets are treated as empty.
    pub fn task_dirs(&self, include_trash: bool) -> Result<Vec<TaskDir>> {
        let mut dirs = Vec::new();
        for bucket in Status::ALL {
            if bucket == Status::Trashed && !include_trash {
                continue;
            }
            let bucket_dir = self.bucket_dir(bucket);
            let entries = match fs::read_dir(&bucket_dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(Error::unavailable(&bucket_dir, err)),
            };
            let mut found = Vec::new();
            for entry in entries {
                let path = entry.at(&bucket_dir)?.path();
                if path.is_dir() && task_file(&path).is_file() {
                    found.push(path);
                }
            }
            found.sort();
            dirs.extend(found.into_iter().map(|path| TaskDir { bucket, path }));
        }
        Ok(dirs)
    }

    // =========================================================================
    // Identifier reservations
    // =========================================================================

    /// Claim `id` by creating its marker file.
    ///
    /// Returns `false` when another creator already holds it.
    pub fn reserve_id(&self, id: &str) -> Result<bool> {
        let dir = self.ids_dir();
        fs::create_dir_all(&dir).at(&dir)?;
        let marker = self.id_marker(id);
        match OpenOptions::new().write(true).create_new(true).open(&marker) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(Error::unavailable(&marker, err)),
        }
    }

    /// Every identifier that has ever been reserved.
    pub fn reserved_ids(&self) -> Result<Vec<String>> {
        let dir = self.ids_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::unavailable(&dir, err)),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.at(&dir)?;
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        Ok(ids)
    }

    /// Fresh staging directory for a task being created.
    pub fn staging_task_dir(&self, id: &str) -> Result<PathBuf> {
        let dir = self.staging_dir().join(id);
        if dir.exists() {
            remove_dir(&dir)?;
        }
        fs::create_dir_all(&dir).at(&dir)?;
        Ok(dir)
    }

    /// First free path in `trash/` for `dir_name`, suffixed `-2`, `-3`, ...
    /// when earlier trashed tasks already used the name.
    pub fn unique_trash_dir(&self, dir_name: &str) -> PathBuf {
        let base = self.task_dir(Status::Trashed, dir_name);
        if !base.exists() {
            return base;
        }
        let mut n = 2u32;
        loop {
            let candidate = self.task_dir(Status::Trashed, &format!("{dir_name}-{n}"));
            if !candidate.exists() {
                return candidate;
            }
            n += 1;
        }
    }
}

/// A task directory found while scanning a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDir {
    pub bucket: Status,
    pub path: PathBuf,
}

pub fn task_file(task_dir: &Path) -> PathBuf {
    task_dir.join(TASK_FILE)
}

pub fn activity_file(task_dir: &Path) -> PathBuf {
    task_dir.join(ACTIVITY_FILE)
}

pub fn plan_file(task_dir: &Path) -> PathBuf {
    task_dir.join(PLAN_FILE)
}

// =============================================================================
// Root discovery
// =============================================================================

/// Every `.tasks` directory in `start` and its ancestors, nearest first.
pub fn discover_roots(start: &Path) -> Vec<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(TASKS_DIR))
        .filter(|candidate| candidate.is_dir())
        .collect()
}

/// Nearest store above `start`. Warns when several ancestors carry one.
pub fn choose_root(start: &Path) -> Option<PathBuf> {
    let mut roots = discover_roots(start).into_iter();
    let nearest = roots.next()?;
    let shadowed: Vec<PathBuf> = roots.collect();
    if !shadowed.is_empty() {
        tracing::warn!(
            root = %nearest.display(),
            shadowed = ?shadowed,
            "multiple task stores found; using the nearest"
        );
    }
    Some(nearest)
}

/// Where `init` puts a new store: the enclosing git working tree if any,
/// otherwise `start` itself.
pub fn default_init_root(start: &Path) -> Result<PathBuf> {
    let base = git::repo_root(start)?.unwrap_or_else(|| start.to_path_buf());
    Ok(base.join(TASKS_DIR))
}

// =============================================================================
// File I/O helpers
// =============================================================================

/// Write data atomically using temp file + rename
///
/// The temp file lives next to `path` so the rename never crosses a
/// filesystem; readers see either the old contents or the new ones.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).at(parent)?;

    let mut temp = NamedTempFile::new_in(parent).at(parent)?;
    temp.write_all(data).at(temp.path())?;
    temp.as_file().sync_all().at(temp.path())?;
    temp.persist(path)
        .map_err(|err| Error::unavailable(path, err.error))?;
    Ok(())
}

/// Append a log entry to a file, creating it if needed.
///
/// Only the last byte of the file is read, to decide whether the entry
/// needs a separating newline. Existing bytes are never rewritten.
pub fn append_entry(path: &Path, entry: &ActivityEntry) -> Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .at(path)?;

    let mut last = [0u8; 1];
    let len = file.metadata().at(path)?.len();
    let tail: &[u8] = if len > 0 {
        file.seek(SeekFrom::End(-1)).at(path)?;
        file.read_exact(&mut last).at(path)?;
        &last
    } else {
        &[]
    };

    let appended = append_log_entry(tail, entry);
    file.write_all(&appended[tail.len()..]).at(path)?;
    file.sync_all().at(path)?;
    Ok(())
}

/// Read a file that may legitimately be absent.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(Error::unavailable(path, err)),
    }
}

/// Create an empty file unless one already exists.
///
/// Returns `true` when the file was created by this call.
pub fn create_if_missing(path: &Path) -> Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(Error::unavailable(path, err)),
    }
}

pub fn remove_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::unavailable(path, err)),
    }
}

// =============================================================================
// Directory relocation
// =============================================================================

/// Move a whole task directory from `from` to `to`.
///
/// A plain rename is used whenever possible, which is atomic. When the
/// buckets live on different filesystems the tree is copied and the source
/// removed afterwards; a failed copy is rolled back so the task stays at
/// `from`. If the source cannot be removed after a successful copy the task
/// exists in both places and `StoreCorruption` is returned.
pub fn relocate_dir(id: &str, from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        return Err(Error::StoreCorruption {
            id: id.to_string(),
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        });
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }

    match fs::rename(from, to) {
        Ok(()) => {
            tracing::debug!(id, from = %from.display(), to = %to.display(), "relocated task");
            Ok(())
        }
        Err(err) if is_cross_device(&err) => {
            tracing::debug!(id, "rename crosses filesystems; copying instead");
            copy_then_remove(id, from, to)
        }
        Err(err) => Err(Error::unavailable(from, err)),
    }
}

fn copy_then_remove(id: &str, from: &Path, to: &Path) -> Result<()> {
    if let Err(err) = copy_tree(from, to) {
        if let Err(cleanup) = fs::remove_dir_all(to) {
            tracing::warn!(path = %to.display(), error = %cleanup, "failed to remove partial copy");
        }
        return Err(err);
    }
    if let Err(err) = fs::remove_dir_all(from) {
        if from.exists() && to.exists() {
            tracing::error!(id, from = %from.display(), to = %to.display(), error = %err, "task left in two locations");
            return Err(Error::StoreCorruption {
                id: id.to_string(),
                from: from.to_path_buf(),
                to: to.to_path_buf(),
            });
        }
        return Err(Error::unavailable(from, err));
    }
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir(to).at(to)?;
    for entry in fs::read_dir(from).at(from)? {
        let entry = entry.at(from)?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        if entry.file_type().at(&source)?.is_dir() {
            copy_tree(&source, &target)?;
        } else {
            fs::copy(&source, &target).at(&source)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn is_cross_device(err: &io::Error) -> bool {
    // EXDEV
    err.raw_os_error() == Some(18)
}

#[cfg(windows)]
fn is_cross_device(err: &io::Error) -> bool {
    // ERROR_NOT_SAME_DEVICE
    err.raw_os_error() == Some(17)
}

#[cfg(not(any(unix, windows)))]
fn is_cross_device(_err: &io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout() -> (TempDir, Layout) {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::new(dir.path().join(TASKS_DIR));
        layout.ensure().expect("ensure");
        (dir, layout)
    }

    #[test]
    fn ensure_creates_all_buckets() {
        let (_dir, layout) = layout();
        for bucket in ["todo", "doing", "done", "trash"] {
            assert!(layout.root().join(bucket).is_dir(), "{bucket}");
        }
        layout.ensure().expect("idempotent");
    }

    #[test]
    fn task_dirs_require_a_record() {
        let (_dir, layout) = layout();
        let real = layout.task_dir(Status::Todo, "2026-01-01-a");
        fs::create_dir_all(&real).expect("mkdir");
        fs::write(task_file(&real), "x").expect("write");
        fs::create_dir_all(layout.task_dir(Status::Todo, "2026-01-01-empty")).expect("mkdir");
        let trashed = layout.task_dir(Status::Trashed, "2026-01-01-b");
        fs::create_dir_all(&trashed).expect("mkdir");
        fs::write(task_file(&trashed), "x").expect("write");

        let active = layout.task_dirs(false).expect("scan");
        assert_eq!(active, vec![TaskDir { bucket: Status::Todo, path: real.clone() }]);
        assert_eq!(layout.task_dirs(true).expect("scan").len(), 2);
    }

    #[test]
    fn reservations_are_exclusive() {
        let (_dir, layout) = layout();
        assert!(layout.reserve_id("t-20260101-001").expect("reserve"));
        assert!(!layout.reserve_id("t-20260101-001").expect("reserve"));
        assert_eq!(layout.reserved_ids().expect("ids"), vec!["t-20260101-001".to_string()]);
    }

    #[test]
    fn write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("file.md");
        write_atomic(&path, b"one").expect("write");
        write_atomic(&path, b"two").expect("write");
        assert_eq!(fs::read(&path).expect("read"), b"two");
        let leftovers = fs::read_dir(path.parent().expect("parent")).expect("dir").count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn append_entry_repairs_missing_newline() {
        use crate::activity::ActivityKind;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("activity.md");
        fs::write(&path, "partial").expect("write");
        let at = chrono::NaiveDate::from_ymd_opt(2026, 1, 5)
            .and_then(|day| day.and_hms_opt(9, 30, 0))
            .expect("timestamp");
        append_entry(&path, &ActivityEntry::new(at, "tester", ActivityKind::Note, "next")).expect("append");
        append_entry(&path, &ActivityEntry::new(at, "tester", ActivityKind::Note, "last")).expect("append");
        assert_eq!(
            fs::read_to_string(&path).expect("read"),
            "partial\n2026-01-05 09:30 | tester | note | next\n2026-01-05 09:30 | tester | note | last\n"
        );
    }

    #[test]
    fn relocate_moves_whole_directory() {
        let (_dir, layout) = layout();
        let from = layout.task_dir(Status::Todo, "2026-01-01-a");
        fs::create_dir_all(&from).expect("mkdir");
        fs::write(task_file(&from), "record").expect("write");
        fs::write(activity_file(&from), "log").expect("write");

        let to = layout.task_dir(Status::Doing, "2026-01-01-a");
        relocate_dir("t-1", &from, &to).expect("relocate");
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(activity_file(&to)).expect("read"), "log");
    }

    #[test]
    fn relocate_refuses_occupied_destination() {
        let (_dir, layout) = layout();
        let from = layout.task_dir(Status::Todo, "2026-01-01-a");
        let to = layout.task_dir(Status::Doing, "2026-01-01-a");
        fs::create_dir_all(&from).expect("mkdir");
        fs::create_dir_all(&to).expect("mkdir");

        let err = relocate_dir("t-1", &from, &to).expect_err("occupied");
        assert!(matches!(err, Error::StoreCorruption { .. }));
        assert!(from.exists());
    }

    #[test]
    fn copy_fallback_moves_everything() {
        let (_dir, layout) = layout();
        let from = layout.task_dir(Status::Todo, "2026-01-01-a");
        fs::create_dir_all(from.join("notes")).expect("mkdir");
        fs::write(task_file(&from), "record").expect("write");
        fs::write(from.join("notes").join("n.md"), "nested").expect("write");

        let to = layout.task_dir(Status::Done, "2026-01-01-a");
        copy_then_remove("t-1", &from, &to).expect("copy");
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(to.join("notes").join("n.md")).expect("read"), "nested");
    }

    #[test]
    fn trash_paths_never_collide() {
        let (_dir, layout) = layout();
        let first = layout.unique_trash_dir("2026-01-01-a");
        fs::create_dir_all(&first).expect("mkdir");
        let second = layout.unique_trash_dir("2026-01-01-a");
        assert_eq!(second.file_name().and_then(|n| n.to_str()), Some("2026-01-01-a-2"));
    }

    #[test]
    fn discovery_prefers_nearest_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outer = dir.path().join(TASKS_DIR);
        let inner_base = dir.path().join("sub");
        let inner = inner_base.join(TASKS_DIR);
        fs::create_dir_all(&outer).expect("mkdir");
        fs::create_dir_all(&inner).expect("mkdir");

        assert_eq!(discover_roots(&inner_base), vec![inner.clone(), outer]);
        assert_eq!(choose_root(&inner_base), Some(inner));
    }
}
