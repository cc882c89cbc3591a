//! dot-tasks - File-backed Task Tracking Library
//!
//! This library provides the core functionality for the dot-tasks CLI,
//! a task tracker whose entire state is a directory tree of plain text
//! files that humans and agents edit side by side.
//!
//! # Core Concepts
//!
//! - **Tasks**: one directory per task holding `task.md`, `activity.md` and
//!   `plan.md`
//! - **Status buckets**: `todo/`, `doing/`, `done/` and `trash/` under the
//!   store root; a transition is a directory move
//! - **Dependencies**: tasks list the ids they depend on; `start` is gated on
//!   every dependency being done
//! - **Activity log**: append-only, one line per lifecycle event or note
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Presentation settings from `.tasks/config.toml`
//! - `error`: Error types and result aliases
//! - `task`: Task entity and field vocabularies
//! - `record`: `task.md` codec
//! - `activity`: `activity.md` codec
//! - `task_id`: Identifier allocation
//! - `deps`: Dependency validation and cycle detection
//! - `storage`: Store layout, atomic writes and directory relocation
//! - `store`: Lifecycle operations and queries
//! - `actor`: Actor identity for log entries
//! - `git`: Repository root discovery for `init`
//! - `output`: JSON envelope and human-readable rendering

pub mod activity;
pub mod actor;
pub mod cli;
pub mod config;
pub mod deps;
pub mod error;
pub mod git;
pub mod output;
pub mod record;
pub mod storage;
pub mod store;
pub mod task;
pub mod task_id;

pub use error::{Error, Result};
pub use store::TaskStore;
