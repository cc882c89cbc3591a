//! Shared output formatting for dot-tasks CLI commands.

use serde::Serialize;

use crate::config::Column;
use crate::error::{Error, Result};

pub const SCHEMA_VERSION: &str = "dot-tasks.v1";

/// Flags that take a value, so their value is not mistaken for a command.
const GLOBAL_VALUE_FLAGS: [&str; 2] = ["--root", "--actor"];

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            summary: Vec::new(),
            details: Vec::new(),
            warnings: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        let warnings = human.map(|h| h.warnings.clone()).unwrap_or_default();
        let next_steps = human.map(|h| h.next_steps.clone()).unwrap_or_default();

        #[derive(Serialize)]
        struct Envelope<'a, T: Serialize> {
            schema_version: &'static str,
            command: &'a str,
            status: &'static str,
            data: &'a T,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            warnings: Vec<String>,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            next_steps: Vec<String>,
        }

        let payload = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            data,
            warnings,
            next_steps,
        };

        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if options.quiet {
        return Ok(());
    }

    if let Some(human) = human {
        println!("{}", format_human(human));
    }

    Ok(())
}

/// Print pre-rendered text unless JSON or quiet output was requested.
///
/// Warnings go to stderr in human mode and into the envelope in JSON mode.
pub fn emit_text<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    text: &str,
    warnings: &[String],
) -> Result<()> {
    if options.json {
        let mut human = HumanOutput::new(command);
        for warning in warnings {
            human.push_warning(warning.clone());
        }
        return emit_success(options, command, data, Some(&human));
    }
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
    if !options.quiet {
        println!("{text}");
    }
    Ok(())
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let next_steps = error_next_steps(err);
    let hint = next_steps.first().map(|step| step.as_str());
    if json {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            message: &'a str,
            code: i32,
            kind: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<serde_json::Value>,
        }

        #[derive(Serialize)]
        struct Envelope<'a> {
            schema_version: &'static str,
            command: &'a str,
            status: &'static str,
            error: ErrorBody<'a>,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            next_steps: Vec<String>,
        }

        let payload = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            error: ErrorBody {
                message: &err.to_string(),
                code: err.exit_code(),
                kind: err.kind(),
                details: err.details(),
            },
            next_steps,
        };

        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    eprintln!("error: {err}");
    if let Some(hint) = hint {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

pub fn format_human(output: &HumanOutput) -> String {
    let mut lines = Vec::new();
    lines.push(output.header.clone());

    push_summary(&mut lines, &output.summary);
    push_section(&mut lines, "Details", &output.details);
    push_section(&mut lines, "Warnings", &output.warnings);
    push_section(&mut lines, "Next steps", &output.next_steps);

    lines.join("\n")
}

/// Render rows as fixed-width columns.
///
/// Cells longer than their column are cut and end in `~`.
pub fn format_table(columns: &[Column], rows: &[Vec<String>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    let header: Vec<String> = columns.iter().map(|column| column.name.clone()).collect();
    lines.push(format_row(columns, &header));
    for row in rows {
        lines.push(format_row(columns, row));
    }
    lines.join("\n")
}

fn format_row(columns: &[Column], cells: &[String]) -> String {
    let rendered: Vec<String> = columns
        .iter()
        .zip(cells)
        .map(|(column, cell)| fit(cell, column.width))
        .collect();
    rendered.join("  ").trim_end().to_string()
}

fn fit(cell: &str, width: usize) -> String {
    let len = cell.chars().count();
    if len <= width {
        return format!("{cell:<width$}");
    }
    if width <= 1 {
        return cell.chars().take(width).collect();
    }
    let mut cut: String = cell.chars().take(width - 1).collect();
    cut.push('~');
    cut
}

pub fn infer_command_name_from_args() -> String {
    command_name(std::env::args().skip(1))
}

fn command_name(args: impl IntoIterator<Item = String>) -> String {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if GLOBAL_VALUE_FLAGS.contains(&arg.as_str()) {
            args.next();
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        return arg;
    }
    "dot-tasks".to_string()
}

fn error_next_steps(err: &Error) -> Vec<String> {
    match err {
        Error::DependenciesUnmet { id, .. } => vec![
            format!("dot-tasks view {id}"),
            format!("dot-tasks start {id} --force"),
        ],
        Error::Ambiguous { matches, .. } => matches
            .iter()
            .map(|id| format!("dot-tasks view {id}"))
            .collect(),
        Error::NotFound { .. } => vec!["dot-tasks list".to_string()],
        Error::StoreUnavailable { .. } => vec!["dot-tasks init".to_string()],
        Error::StoreCorruption { from, to, .. } => vec![format!(
            "remove one of {} or {} by hand",
            from.display(),
            to.display()
        )],
        _ => Vec::new(),
    }
}

fn push_summary(lines: &mut Vec<String>, summary: &[(String, String)]) {
    if summary.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push("Summary:".to_string());
    for (key, value) in summary {
        if value.is_empty() {
            lines.push(format!("- {key}"));
        } else {
            lines.push(format!("- {key}: {value}"));
        }
    }
}

fn push_section(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push(format!("{title}:"));
    for item in items {
        lines.push(format!("- {item}"));
    }
}
