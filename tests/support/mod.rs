#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use chrono::{NaiveDate, NaiveDateTime};
use dot_tasks::store::TaskStore;
use tempfile::TempDir;

/// A scratch task store in a temporary directory.
pub struct TestStore {
    dir: TempDir,
    store: TaskStore,
}

impl TestStore {
    /// Initialize a store with the clock pinned to 2026-01-05 09:30.
    pub fn init() -> Self {
        Self::init_at(at(2026, 1, 5, 9, 30))
    }

    pub fn init_at(now: NaiveDateTime) -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let (store, _) = TaskStore::init(dir.path().join(".tasks")).expect("init store");
        Self {
            dir,
            store: store.with_clock(now).with_actor("tester"),
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// The same store seen at a different time.
    pub fn at(&self, now: NaiveDateTime) -> TaskStore {
        self.store.clone().with_clock(now)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join(".tasks")
    }

    pub fn read(&self, path: impl AsRef<Path>) -> String {
        fs::read_to_string(path).expect("read file")
    }

    /// Task directory names currently in a bucket.
    pub fn bucket(&self, bucket: &str) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.root().join(bucket))
            .expect("read bucket")
            .map(|entry| {
                entry
                    .expect("dir entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }
}

pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .expect("valid timestamp")
}

/// The binary, isolated from the caller's environment.
pub fn dot_tasks_cmd() -> Command {
    let mut cmd = Command::cargo_bin("dot-tasks").expect("dot-tasks binary");
    cmd.env_remove("DOT_TASKS_ROOT");
    cmd.env_remove("DOT_TASKS_ACTOR");
    cmd.env_remove("RUST_LOG");
    cmd
}
