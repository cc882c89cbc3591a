//! Configuration loading and management
//!
//! Handles the store-level `config.toml` settings document:
//!
//! ```toml
//! [settings]
//! interactive_enabled = true
//! show_banner = true
//!
//! [[settings.list_table.columns]]
//! name = "task_name"
//! width = 32
//! ```
//!
//! Settings only affect presentation. Loading never fails: every invalid
//! value falls back to its own default and produces a warning naming the
//! offending key.

use std::path::Path;

use serde::{Deserialize, Serialize};
use toml::{Table, Value};

use crate::error::Result;
use crate::storage;

pub const DEFAULT_INTERACTIVE_ENABLED: bool = true;
pub const DEFAULT_SHOW_BANNER: bool = true;

/// Column names the list table knows how to render
pub const SUPPORTED_COLUMNS: [&str; 8] = [
    "task_name",
    "task_id",
    "status",
    "priority",
    "effort",
    "spec_readiness",
    "deps",
    "created",
];

const DEFAULT_COLUMNS: [(&str, usize); 5] = [
    ("task_name", 32),
    ("priority", 8),
    ("effort", 6),
    ("deps", 12),
    ("created", 10),
];

const SETTINGS_KEYS: [&str; 3] = ["interactive_enabled", "show_banner", "list_table"];

/// One list table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub width: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListTable {
    pub columns: Vec<Column>,
}

impl Default for ListTable {
    fn default() -> Self {
        Self {
            columns: default_columns(),
        }
    }
}

fn default_columns() -> Vec<Column> {
    DEFAULT_COLUMNS
        .iter()
        .map(|(name, width)| Column {
            name: name.to_string(),
            width: *width,
        })
        .collect()
}

/// Presentation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Whether commands may prompt when run without arguments
    pub interactive_enabled: bool,
    pub show_banner: bool,
    pub list_table: ListTable,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interactive_enabled: DEFAULT_INTERACTIVE_ENABLED,
            show_banner: DEFAULT_SHOW_BANNER,
            list_table: ListTable::default(),
        }
    }
}

#[derive(Serialize)]
struct Document<'a> {
    settings: &'a Settings,
}

/// Settings plus the warnings produced while resolving them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub warnings: Vec<String>,
}

impl Settings {
    /// Load settings from `path`. A missing file yields defaults silently.
    pub fn load(path: &Path) -> LoadedSettings {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text, &path.display().to_string()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => LoadedSettings {
                settings: Settings::default(),
                warnings: Vec::new(),
            },
            Err(err) => {
                let mut warnings = Warnings::default();
                warnings.push(format!(
                    "Unable to read config at {}: {err}. Falling back to defaults.",
                    path.display()
                ));
                warnings.finish(Settings::default())
            }
        }
    }

    /// Resolve settings from document text. `origin` names the document in
    /// warnings.
    pub fn parse(text: &str, origin: &str) -> LoadedSettings {
        let mut warnings = Warnings::default();
        let table: Table = match toml::from_str(text) {
            Ok(table) => table,
            Err(_) => {
                warnings.push(format!(
                    "Unable to parse config at {origin}. Falling back to defaults."
                ));
                return warnings.finish(Settings::default());
            }
        };

        for key in table.keys().filter(|key| key.as_str() != "settings") {
            warnings.push(format!(
                "Unsupported config key '{key}' in {origin}. Ignoring."
            ));
        }

        let mut settings = Settings::default();
        let section = match table.get("settings") {
            None => return warnings.finish(settings),
            Some(Value::Table(section)) => section,
            Some(_) => {
                warnings.push(format!(
                    "Invalid settings section in {origin}. Using defaults."
                ));
                return warnings.finish(settings);
            }
        };

        for key in section
            .keys()
            .filter(|key| !SETTINGS_KEYS.contains(&key.as_str()))
        {
            warnings.push(format!(
                "Unsupported settings key '{key}' in {origin}. Ignoring."
            ));
        }

        settings.interactive_enabled = resolve_bool(
            section,
            "interactive_enabled",
            DEFAULT_INTERACTIVE_ENABLED,
            origin,
            &mut warnings,
        );
        settings.show_banner = resolve_bool(
            section,
            "show_banner",
            DEFAULT_SHOW_BANNER,
            origin,
            &mut warnings,
        );
        settings.list_table.columns = resolve_columns(section, origin, &mut warnings);
        warnings.finish(settings)
    }

    /// Render as a settings document.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(&Document { settings: self })?)
    }
}

/// Write the default settings document unless one already exists.
///
/// Returns `true` when the document was created.
pub fn write_default_if_missing(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    let content = Settings::default().to_toml()?;
    storage::write_atomic(path, content.as_bytes())?;
    Ok(true)
}

#[derive(Default)]
struct Warnings(Vec<String>);

impl Warnings {
    fn push(&mut self, message: String) {
        tracing::warn!("{message}");
        self.0.push(message);
    }

    fn finish(self, settings: Settings) -> LoadedSettings {
        LoadedSettings {
            settings,
            warnings: self.0,
        }
    }
}

fn resolve_bool(
    section: &Table,
    key: &str,
    default: bool,
    origin: &str,
    warnings: &mut Warnings,
) -> bool {
    match section.get(key) {
        None => default,
        Some(Value::Boolean(value)) => *value,
        Some(_) => {
            warnings.push(format!(
                "Invalid settings.{key} in {origin}. Using default '{default}'."
            ));
            default
        }
    }
}

fn resolve_columns(section: &Table, origin: &str, warnings: &mut Warnings) -> Vec<Column> {
    let list_table = match section.get("list_table") {
        None => return default_columns(),
        Some(Value::Table(list_table)) => list_table,
        Some(_) => {
            warnings.push(format!(
                "Invalid settings.list_table section in {origin}. Using defaults."
            ));
            return default_columns();
        }
    };

    for key in list_table.keys().filter(|key| key.as_str() != "columns") {
        warnings.push(format!(
            "Unsupported settings.list_table key '{key}' in {origin}. Ignoring."
        ));
    }

    let entries = match list_table.get("columns") {
        None => return default_columns(),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            warnings.push(format!(
                "Invalid settings.list_table.columns in {origin}. Using defaults."
            ));
            return default_columns();
        }
    };

    let mut columns: Vec<Column> = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let Some(entry) = entry.as_table() else {
            warnings.push(format!(
                "Invalid column entry at settings.list_table.columns[{}] in {origin}. Ignoring.",
                index + 1
            ));
            continue;
        };
        let name = entry.get("name").and_then(Value::as_str);
        let Some(name) = name.filter(|name| SUPPORTED_COLUMNS.contains(name)) else {
            warnings.push(format!(
                "Unsupported list column '{}' in {origin}. Ignoring.",
                name.unwrap_or("<missing>")
            ));
            continue;
        };
        if columns.iter().any(|column| column.name == name) {
            warnings.push(format!(
                "Duplicate list column '{name}' in {origin}. Keeping first occurrence."
            ));
            continue;
        }
        let width = entry
            .get("width")
            .and_then(Value::as_integer)
            .filter(|width| *width > 0)
            .and_then(|width| usize::try_from(width).ok());
        let Some(width) = width else {
            warnings.push(format!(
                "Invalid width for list column '{name}' in {origin}. Expected a positive integer."
            ));
            continue;
        };
        columns.push(Column {
            name: name.to_string(),
            width,
        });
    }

    if columns.is_empty() {
        warnings.push(format!(
            "No valid settings.list_table.columns in {origin}. Using defaults."
        ));
        return default_columns();
    }
    columns
}
