//! dot-tasks task command implementations.

use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::actor;
use crate::config::{Column, Settings};
use crate::deps::DependencyState;
use crate::error::{Error, Result};
use crate::output::{emit_success, emit_text, format_human, format_table, HumanOutput, OutputOptions};
use crate::storage::{self, TASKS_DIR};
use crate::store::{ListFilter, StoredTask, TaskStore, TaskView};
use crate::task::{DependencyEdit, NewTask, TagEdit, Task, TaskEdits};

/// Global flags shared by every task command.
pub struct Context {
    pub root: Option<PathBuf>,
    pub actor: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

impl Context {
    fn output(&self) -> OutputOptions {
        OutputOptions {
            json: self.json,
            quiet: self.quiet,
        }
    }

    fn open_store(&self) -> Result<TaskStore> {
        let root = match &self.root {
            Some(root) => root.clone(),
            None => {
                let cwd = std::env::current_dir().map_err(|err| Error::unavailable(".", err))?;
                storage::choose_root(&cwd).ok_or_else(|| {
                    Error::unavailable(
                        cwd.join(TASKS_DIR),
                        io::Error::new(
                            io::ErrorKind::NotFound,
                            "no .tasks directory here or in any parent (run `dot-tasks init`)",
                        ),
                    )
                })?
            }
        };
        let store = TaskStore::open(root)?;
        Ok(store.with_actor(actor::resolve_actor(self.actor.as_deref())))
    }
}

pub struct CreateOptions {
    pub name: String,
    pub summary: Option<String>,
    pub priority: Option<String>,
    pub effort: Option<String>,
    pub spec_readiness: Option<String>,
    pub owner: Option<String>,
    pub tags: Vec<String>,
    pub depends_on: Vec<String>,
}

pub struct ListOptions {
    pub status: Option<String>,
    pub tags: Vec<String>,
    pub all_tags: bool,
    pub exclude_tags: Vec<String>,
    pub untagged: bool,
    pub trash: bool,
}

pub struct UpdateOptions {
    pub selector: String,
    pub priority: Option<String>,
    pub effort: Option<String>,
    pub spec_readiness: Option<String>,
    pub owner: Option<String>,
    pub tags: Vec<String>,
    pub replace_tags: bool,
    pub depends_on: Vec<String>,
    pub clear_deps: bool,
    pub body: Option<String>,
    pub note: Option<String>,
}

pub fn run_create(ctx: Context, options: CreateOptions) -> Result<()> {
    let store = ctx.open_store()?;
    let fields = NewTask {
        summary: options.summary,
        priority: parse_opt(options.priority.as_deref())?,
        effort: parse_opt(options.effort.as_deref())?,
        spec_readiness: parse_opt(options.spec_readiness.as_deref())?,
        owner: options.owner,
        tags: options.tags,
        depends_on: options.depends_on,
    };
    let created = store.create(&options.name, fields)?;

    let mut human = HumanOutput::new("Task created");
    push_task_summary(&mut human, &created);
    human.push_next_step(format!("dot-tasks start {}", created.task.name));
    emit_success(ctx.output(), "create", &created, Some(&human))
}

pub fn run_start(ctx: Context, selector: &str, force: bool) -> Result<()> {
    let store = ctx.open_store()?;
    let started = store.start(selector, force)?;

    let mut human = HumanOutput::new("Task started");
    push_task_summary(&mut human, &started);
    human.push_next_step(format!("dot-tasks complete {}", started.task.name));
    emit_success(ctx.output(), "start", &started, Some(&human))
}

pub fn run_complete(ctx: Context, selector: &str) -> Result<()> {
    let store = ctx.open_store()?;
    let completed = store.complete(selector)?;

    let mut human = HumanOutput::new("Task completed");
    push_task_summary(&mut human, &completed);
    emit_success(ctx.output(), "complete", &completed, Some(&human))
}

#[derive(Serialize)]
struct TaskListOutput {
    total: usize,
    tasks: Vec<StoredTask>,
}

pub fn run_list(ctx: Context, options: ListOptions) -> Result<()> {
    let store = ctx.open_store()?;
    let filter = ListFilter {
        status: parse_opt(options.status.as_deref())?,
        tags: options.tags,
        all_tags: options.all_tags,
        exclude_tags: options.exclude_tags,
        untagged: options.untagged,
        include_trash: options.trash,
    };
    let tasks = store.list(&filter)?;
    let loaded = Settings::load(&store.config_file());

    let columns = &loaded.settings.list_table.columns;
    let rows: Vec<Vec<String>> = tasks
        .iter()
        .map(|stored| list_row(columns, &stored.task))
        .collect();
    let mut text = String::new();
    if loaded.settings.show_banner {
        text.push_str(&format!("dot-tasks: {}\n\n", store.root().display()));
    }
    if rows.is_empty() {
        text.push_str("No tasks.");
    } else {
        text.push_str(&format_table(columns, &rows));
    }

    let output = TaskListOutput {
        total: tasks.len(),
        tasks,
    };
    emit_text(ctx.output(), "list", &output, &text, &loaded.warnings)
}

fn list_row(columns: &[Column], task: &Task) -> Vec<String> {
    columns
        .iter()
        .map(|column| match column.name.as_str() {
            "task_name" => task.name.clone(),
            "task_id" => task.id.clone(),
            "status" => task.status.to_string(),
            "priority" => task.priority.to_string(),
            "effort" => task.effort.to_string(),
            "spec_readiness" => task.spec_readiness.to_string(),
            "deps" if task.depends_on.is_empty() => "-".to_string(),
            "deps" => task.depends_on.join(","),
            "created" => task.created_at.format("%Y-%m-%d").to_string(),
            _ => String::new(),
        })
        .collect()
}

pub fn run_tags(ctx: Context, status: Option<&str>, include_untagged: bool) -> Result<()> {
    let store = ctx.open_store()?;
    let counts = store.tag_counts(parse_opt(status)?, include_untagged)?;

    let columns = [
        column("tag", 24),
        column("total", 5),
        column("todo", 5),
        column("doing", 5),
        column("done", 5),
    ];
    let rows: Vec<Vec<String>> = counts
        .iter()
        .map(|count| {
            vec![
                count.tag.clone(),
                count.total.to_string(),
                count.todo.to_string(),
                count.doing.to_string(),
                count.done.to_string(),
            ]
        })
        .collect();
    let text = if rows.is_empty() {
        "No tags.".to_string()
    } else {
        format_table(&columns, &rows)
    };
    emit_text(ctx.output(), "tags", &counts, &text, &[])
}

fn column(name: &str, width: usize) -> Column {
    Column {
        name: name.to_string(),
        width,
    }
}

pub fn run_view(ctx: Context, selector: &str) -> Result<()> {
    let store = ctx.open_store()?;
    let view = store.view(selector)?;
    let text = render_view(&view);
    emit_text(ctx.output(), "view", &view, &text, &[])
}

fn render_view(view: &TaskView) -> String {
    let task = &view.task.task;
    let mut human = HumanOutput::new(format!("{} ({})", task.name, task.id));
    human.push_summary("status", task.status.as_str());
    human.push_summary("priority", task.priority.as_str());
    human.push_summary("effort", task.effort.as_str());
    human.push_summary("spec_readiness", task.spec_readiness.as_str());
    if let Some(owner) = &task.owner {
        human.push_summary("owner", owner.clone());
    }
    if !task.tags.is_empty() {
        let tags: Vec<&str> = task.tags.iter().map(String::as_str).collect();
        human.push_summary("tags", tags.join(", "));
    }
    human.push_summary("created", task.created_at.to_string());
    if let Some(started) = task.started_at {
        human.push_summary("started", started.to_string());
    }
    if let Some(completed) = task.completed_at {
        human.push_summary("completed", completed.to_string());
    }
    human.push_summary("readiness", view.readiness.as_str());
    for dep in &view.dependencies {
        let state = match dep.state {
            DependencyState::Satisfied => "satisfied".to_string(),
            DependencyState::Unmet { status } => format!("unmet ({status})"),
            DependencyState::Dangling => "dangling".to_string(),
        };
        match &dep.name {
            Some(name) => human.push_detail(format!("depends on {} {name}: {state}", dep.id)),
            None => human.push_detail(format!("depends on {}: {state}", dep.id)),
        }
    }
    for dependent in &view.dependents {
        human.push_detail(format!(
            "required by {} {} ({})",
            dependent.id, dependent.name, dependent.status
        ));
    }

    let mut text = format_human(&human);
    text.push_str("\n\n");
    text.push_str(task.body.trim_end());
    if let Some(plan) = view.plan.as_deref().filter(|plan| !plan.trim().is_empty()) {
        text.push_str("\n\nPlan:\n");
        text.push_str(plan.trim_end());
    }
    if !view.activity.is_empty() {
        text.push_str("\n\nActivity:\n");
        for entry in &view.activity {
            text.push_str(&entry.to_line());
        }
    }
    text.trim_end().to_string()
}

pub fn run_update(ctx: Context, options: UpdateOptions) -> Result<()> {
    let store = ctx.open_store()?;
    let tags = match (options.tags.is_empty(), options.replace_tags) {
        (true, _) => None,
        (false, true) => Some(TagEdit::Replace(options.tags)),
        (false, false) => Some(TagEdit::Add(options.tags)),
    };
    let depends_on = match (options.depends_on.is_empty(), options.clear_deps) {
        (true, false) => None,
        (true, true) => Some(DependencyEdit::Clear),
        (false, true) => Some(DependencyEdit::Replace(options.depends_on)),
        (false, false) => Some(DependencyEdit::Add(options.depends_on)),
    };
    let edits = TaskEdits {
        priority: parse_opt(options.priority.as_deref())?,
        effort: parse_opt(options.effort.as_deref())?,
        spec_readiness: parse_opt(options.spec_readiness.as_deref())?,
        owner: options.owner,
        tags,
        depends_on,
        body: options.body,
    };
    let touched = edits.touched_fields();
    let updated = store.update(&options.selector, edits, options.note.as_deref())?;

    let mut human = HumanOutput::new("Task updated");
    push_task_summary(&mut human, &updated);
    if !touched.is_empty() {
        human.push_summary("fields", touched.join(", "));
    }
    emit_success(ctx.output(), "update", &updated, Some(&human))
}

pub fn run_log(ctx: Context, selector: &str, note: &str) -> Result<()> {
    let store = ctx.open_store()?;
    let entry = store.log(selector, note)?;

    let mut human = HumanOutput::new("Note added");
    human.push_detail(entry.to_line().trim_end().to_string());
    emit_success(ctx.output(), "log", &entry, Some(&human))
}

pub fn run_rename(ctx: Context, selector: &str, new_name: &str) -> Result<()> {
    let store = ctx.open_store()?;
    let renamed = store.rename(selector, new_name)?;

    let mut human = HumanOutput::new("Task renamed");
    push_task_summary(&mut human, &renamed);
    emit_success(ctx.output(), "rename", &renamed, Some(&human))
}

pub fn run_delete(ctx: Context, selector: &str, hard: bool) -> Result<()> {
    let store = ctx.open_store()?;
    let deleted = store.delete(selector, hard)?;

    let mut human = if hard {
        HumanOutput::new("Task deleted permanently")
    } else {
        HumanOutput::new("Task moved to trash")
    };
    human.push_summary("id", deleted.task.id.clone());
    human.push_summary("name", deleted.task.name.clone());
    if !hard {
        human.push_summary("dir", deleted.dir.display().to_string());
    }
    emit_success(ctx.output(), "delete", &deleted, Some(&human))
}

pub fn run_check(ctx: Context, selector: &str) -> Result<()> {
    let store = ctx.open_store()?;
    let report = store.check(selector)?;

    let mut human = if report.is_ready() {
        HumanOutput::new("Ready")
    } else {
        HumanOutput::new("Blocked")
    };
    human.push_summary("id", report.task_id.clone());
    let unmet = report.unmet_ids();
    if !unmet.is_empty() {
        human.push_summary("unmet", unmet.join(", "));
    }
    let dangling = report.dangling_ids();
    if !dangling.is_empty() {
        human.push_summary("dangling", dangling.join(", "));
    }
    if !report.is_ready() {
        human.push_next_step(format!("dot-tasks start {} --force", report.task_id));
    }
    emit_success(ctx.output(), "check", &report, Some(&human))
}

fn push_task_summary(human: &mut HumanOutput, stored: &StoredTask) {
    human.push_summary("id", stored.task.id.clone());
    human.push_summary("name", stored.task.name.clone());
    human.push_summary("status", stored.task.status.as_str());
    human.push_summary("dir", stored.dir.display().to_string());
}

fn parse_opt<T>(value: Option<&str>) -> Result<Option<T>>
where
    T: FromStr<Err = Error>,
{
    value.map(str::parse).transpose()
}
