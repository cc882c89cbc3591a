//! Error types for dot-tasks
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad selector, invalid field, illegal transition)
//! - 3: Blocked by dependencies (recoverable with `--force`)
//! - 4: Operation failed (store unreadable, corrupt, undecodable)

use std::io;
use std::path::{Path, PathBuf};

use serde_json::json;
use thiserror::Error;

use crate::task::Status;

/// Exit codes for the dot-tasks CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for store operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("task not found: {selector}")]
    NotFound { selector: String },

    #[error("ambiguous task selector '{selector}': {}", .matches.join(", "))]
    Ambiguous {
        selector: String,
        matches: Vec<String>,
    },

    #[error("task name already exists: {name}")]
    DuplicateName { name: String },

    #[error("cannot {operation} task {id}: status is {from}")]
    InvalidTransition {
        id: String,
        from: Status,
        operation: &'static str,
    },

    #[error("invalid {field}: {reason}")]
    Validation {
        field: String,
        reason: String,
        expected: Vec<&'static str>,
    },

    // Blocked (exit code 3)
    #[error("unmet dependencies for {id}: {}", blocking_ids(.unmet, .dangling).join(", "))]
    DependenciesUnmet {
        id: String,
        unmet: Vec<String>,
        dangling: Vec<String>,
    },

    // Operation failures (exit code 4)
    #[error("task store unavailable at {}: {source}", .path.display())]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("task {id} is present at both {} and {}", .from.display(), .to.display())]
    StoreCorruption {
        id: String,
        from: PathBuf,
        to: PathBuf,
    },

    #[error(
        "cannot decode {}: {}{reason}",
        .path.display(),
        .field.as_deref().map(|field| format!("{field}: ")).unwrap_or_default()
    )]
    Decode {
        path: PathBuf,
        field: Option<String>,
        reason: String,
    },

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
}

fn blocking_ids(unmet: &[String], dangling: &[String]) -> Vec<String> {
    unmet.iter().chain(dangling.iter()).cloned().collect()
}

impl Error {
    /// Build a validation failure for a single field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
            expected: Vec::new(),
        }
    }

    /// Build a validation failure for a closed-set field.
    pub fn invalid_choice(field: &str, value: &str, expected: &[&'static str]) -> Self {
        Error::Validation {
            field: field.to_string(),
            reason: format!("'{value}' (expected {})", expected.join("|")),
            expected: expected.to_vec(),
        }
    }

    pub fn unavailable(path: impl AsRef<Path>, source: io::Error) -> Self {
        Error::StoreUnavailable {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn decode(path: impl AsRef<Path>, field: Option<String>, reason: impl Into<String>) -> Self {
        Error::Decode {
            path: path.as_ref().to_path_buf(),
            field,
            reason: reason.into(),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotFound { .. }
            | Error::Ambiguous { .. }
            | Error::DuplicateName { .. }
            | Error::InvalidTransition { .. }
            | Error::Validation { .. } => exit_codes::USER_ERROR,

            Error::DependenciesUnmet { .. } => exit_codes::BLOCKED,

            Error::StoreUnavailable { .. }
            | Error::StoreCorruption { .. }
            | Error::Decode { .. }
            | Error::TomlSerialize(_)
            | Error::Json(_)
            | Error::Git(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Stable machine-readable name of the failure category.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Ambiguous { .. } => "ambiguous",
            Error::DuplicateName { .. } => "duplicate_name",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::Validation { .. } => "validation_error",
            Error::DependenciesUnmet { .. } => "dependencies_unmet",
            Error::StoreUnavailable { .. } | Error::Git(_) => "store_unavailable",
            Error::StoreCorruption { .. } => "store_corruption",
            Error::Decode { .. } | Error::TomlSerialize(_) | Error::Json(_) => "decode_error",
        }
    }

    /// Structured payload so callers can render their own message.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::NotFound { selector } => Some(json!({ "selector": selector })),
            Error::Ambiguous { selector, matches } => {
                Some(json!({ "selector": selector, "matches": matches }))
            }
            Error::DuplicateName { name } => Some(json!({ "name": name })),
            Error::InvalidTransition {
                id,
                from,
                operation,
            } => Some(json!({ "id": id, "from": from.as_str(), "operation": operation })),
            Error::Validation {
                field, expected, ..
            } => {
                if expected.is_empty() {
                    Some(json!({ "field": field }))
                } else {
                    Some(json!({ "field": field, "expected": expected }))
                }
            }
            Error::DependenciesUnmet {
                id,
                unmet,
                dangling,
            } => Some(json!({ "id": id, "unmet": unmet, "dangling": dangling })),
            Error::StoreUnavailable { path, .. } => Some(json!({ "path": path })),
            Error::Decode {
                path,
                field: Some(field),
                ..
            } => Some(json!({ "path": path, "field": field })),
            Error::Decode { path, .. } => Some(json!({ "path": path })),
            Error::StoreCorruption { id, from, to } => {
                Some(json!({ "id": id, "from": from, "to": to }))
            }
            _ => None,
        }
    }
}

/// Attach the offending path to raw I/O failures.
pub trait IoContext<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, io::Error> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|source| Error::unavailable(path, source))
    }
}

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            kind: err.kind(),
            details: err.details(),
        }
    }
}
