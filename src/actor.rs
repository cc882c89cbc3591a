//! Actor identity for activity log entries.
//!
//! Actor resolution order:
//! 1) CLI --actor (explicit)
//! 2) DOT_TASKS_ACTOR environment variable
//! 3) "human"

use crate::store::DEFAULT_ACTOR;

/// Environment variable consulted when no `--actor` is given
pub const ACTOR_ENV: &str = "DOT_TASKS_ACTOR";

/// Resolve the current actor from the CLI flag and the environment.
pub fn resolve_actor(cli_actor: Option<&str>) -> String {
    let env_actor = std::env::var(ACTOR_ENV).ok();
    resolve_actor_from(cli_actor, env_actor.as_deref())
}

fn resolve_actor_from(cli_actor: Option<&str>, env_actor: Option<&str>) -> String {
    non_empty(cli_actor)
        .or_else(|| non_empty(env_actor))
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}

fn non_empty(input: Option<&str>) -> Option<&str> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}
