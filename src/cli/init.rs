//! dot-tasks init command implementation
//!
//! Creates the status buckets and the default settings document.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::storage::{self, CONFIG_FILE};
use crate::store::TaskStore;

pub fn run(root: Option<PathBuf>, json: bool, quiet: bool) -> Result<()> {
    let root = match root {
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir().map_err(|err| Error::unavailable(".", err))?;
            storage::default_init_root(&cwd)?
        }
    };

    let (_, report) = TaskStore::init(&root)?;

    let mut human = if report.created {
        HumanOutput::new("Initialized task store")
    } else {
        HumanOutput::new("Task store already initialized")
    };
    human.push_summary("root", report.root.display().to_string());
    let settings = if report.settings_created {
        "created"
    } else {
        "kept existing"
    };
    human.push_summary(CONFIG_FILE, settings);
    if report.created {
        human.push_next_step("dot-tasks create <name>");
    }

    emit_success(OutputOptions { json, quiet }, "init", &report, Some(&human))
}
