//! CLI command definitions and dispatch

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Result;

mod init;
mod task;

/// dot-tasks - file-backed task tracking for humans and agents
#[derive(Parser, Debug)]
#[command(name = "dot-tasks")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Task store directory (defaults to the nearest `.tasks` above the
    /// working directory)
    #[arg(long, global = true, env = "DOT_TASKS_ROOT")]
    pub root: Option<PathBuf>,

    /// Actor recorded in activity logs (also DOT_TASKS_ACTOR)
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a task store (defaults to the git repository root)
    Init,

    /// Create a task in todo
    Create {
        /// Task name (kebab-case)
        name: String,

        /// One-line summary seeded into the body
        #[arg(long)]
        summary: Option<String>,

        /// Priority (p0|p1|p2|p3)
        #[arg(long)]
        priority: Option<String>,

        /// Effort (s|m|l|xl)
        #[arg(long)]
        effort: Option<String>,

        /// Spec readiness (unspecified|rough|ready|autonomous)
        #[arg(long)]
        spec_readiness: Option<String>,

        #[arg(long)]
        owner: Option<String>,

        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Name or id of a task this one depends on (repeatable)
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
    },

    /// Move a todo task to doing
    Start {
        /// Task id, name, or directory name
        selector: String,

        /// Start even when dependencies are not done
        #[arg(long)]
        force: bool,
    },

    /// Move a doing task to done
    Complete {
        /// Task id, name, or directory name
        selector: String,
    },

    /// List tasks
    List {
        /// Only tasks with this status
        #[arg(long)]
        status: Option<String>,

        /// Only tasks with this tag (repeatable, any-of)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Require every --tag instead of any
        #[arg(long)]
        all_tags: bool,

        /// Drop tasks with this tag (repeatable)
        #[arg(long = "exclude-tag")]
        exclude_tags: Vec<String>,

        /// Only tasks without tags
        #[arg(long, conflicts_with_all = ["tags", "all_tags"])]
        untagged: bool,

        /// Include trashed tasks
        #[arg(long)]
        trash: bool,
    },

    /// Count tasks per tag
    Tags {
        /// Only count tasks with this status
        #[arg(long)]
        status: Option<String>,

        /// Leave out the (untagged) row
        #[arg(long)]
        no_untagged: bool,
    },

    /// Show a task with its dependencies, plan, and activity
    View {
        /// Task id, name, or directory name
        selector: String,
    },

    /// Edit task metadata or body
    Update {
        /// Task id, name, or directory name
        selector: String,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long)]
        effort: Option<String>,

        #[arg(long)]
        spec_readiness: Option<String>,

        /// New owner; an empty value clears it
        #[arg(long)]
        owner: Option<String>,

        /// Tag to add (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Replace the tag set with the given --tag values
        #[arg(long, requires = "tags")]
        replace_tags: bool,

        /// Dependency to add (repeatable)
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,

        /// Clear dependencies (before adding any --depends-on)
        #[arg(long)]
        clear_deps: bool,

        /// Replace the markdown body
        #[arg(long)]
        body: Option<String>,

        /// Note appended to the activity log
        #[arg(long)]
        note: Option<String>,
    },

    /// Append a note to a task's activity log
    Log {
        /// Task id, name, or directory name
        selector: String,

        note: String,
    },

    /// Rename a task
    Rename {
        /// Task id, name, or directory name
        selector: String,

        /// New name (kebab-case)
        new_name: String,
    },

    /// Move a task to trash
    Delete {
        /// Task id, name, or directory name
        selector: String,

        /// Remove the task directory permanently
        #[arg(long)]
        hard: bool,
    },

    /// Report whether a task's dependencies are done
    Check {
        /// Task id, name, or directory name
        selector: String,
    },
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let ctx = task::Context {
            root: self.root,
            actor: self.actor,
            json: self.json,
            quiet: self.quiet,
        };
        match self.command {
            Commands::Init => init::run(ctx.root, ctx.json, ctx.quiet),
            Commands::Create {
                name,
                summary,
                priority,
                effort,
                spec_readiness,
                owner,
                tags,
                depends_on,
            } => task::run_create(
                ctx,
                task::CreateOptions {
                    name,
                    summary,
                    priority,
                    effort,
                    spec_readiness,
                    owner,
                    tags,
                    depends_on,
                },
            ),
            Commands::Start { selector, force } => task::run_start(ctx, &selector, force),
            Commands::Complete { selector } => task::run_complete(ctx, &selector),
            Commands::List {
                status,
                tags,
                all_tags,
                exclude_tags,
                untagged,
                trash,
            } => task::run_list(
                ctx,
                task::ListOptions {
                    status,
                    tags,
                    all_tags,
                    exclude_tags,
                    untagged,
                    trash,
                },
            ),
            Commands::Tags {
                status,
                no_untagged,
            } => task::run_tags(ctx, status.as_deref(), !no_untagged),
            Commands::View { selector } => task::run_view(ctx, &selector),
            Commands::Update {
                selector,
                priority,
                effort,
                spec_readiness,
                owner,
                tags,
                replace_tags,
                depends_on,
                clear_deps,
                body,
                note,
            } => task::run_update(
                ctx,
                task::UpdateOptions {
                    selector,
                    priority,
                    effort,
                    spec_readiness,
                    owner,
                    tags,
                    replace_tags,
                    depends_on,
                    clear_deps,
                    body,
                    note,
                },
            ),
            Commands::Log { selector, note } => task::run_log(ctx, &selector, &note),
            Commands::Rename { selector, new_name } => task::run_rename(ctx, &selector, &new_name),
            Commands::Delete { selector, hard } => task::run_delete(ctx, &selector, hard),
            Commands::Check { selector } => task::run_check(ctx, &selector),
        }
    }
}
