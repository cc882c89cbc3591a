use std::io;
use std::path::PathBuf;

use dot_tasks::error::{exit_codes, Error, JsonError};
use dot_tasks::task::Status;

#[test]
fn exit_codes_map_correctly() {
    let user = Error::NotFound {
        selector: "x".to_string(),
    };
    assert_eq!(user.exit_code(), exit_codes::USER_ERROR);

    let blocked = Error::DependenciesUnmet {
        id: "t-20260105-002".to_string(),
        unmet: vec!["t-20260105-001".to_string()],
        dangling: Vec::new(),
    };
    assert_eq!(blocked.exit_code(), exit_codes::BLOCKED);

    let op = Error::unavailable(PathBuf::from(".tasks"), io::Error::other("disk gone"));
    assert_eq!(op.exit_code(), exit_codes::OPERATION_FAILED);
}

#[test]
fn json_error_includes_code_kind_and_details() {
    let err = Error::InvalidTransition {
        id: "t-20260105-001".to_string(),
        from: Status::Done,
        operation: "start",
    };
    let json = JsonError::from(&err);
    assert_eq!(json.code, exit_codes::USER_ERROR);
    assert_eq!(json.kind, "invalid_transition");
    assert_eq!(json.error, "cannot start task t-20260105-001: status is done");
    assert_eq!(
        json.details,
        Some(serde_json::json!({
            "id": "t-20260105-001",
            "from": "done",
            "operation": "start"
        }))
    );
}

#[test]
fn blocked_message_lists_unmet_before_dangling() {
    let err = Error::DependenciesUnmet {
        id: "t-3".to_string(),
        unmet: vec!["t-1".to_string()],
        dangling: vec!["t-2".to_string()],
    };
    assert_eq!(err.to_string(), "unmet dependencies for t-3: t-1, t-2");
}

#[test]
fn choice_errors_carry_expected_values() {
    let err = Error::invalid_choice("effort", "huge", &["s", "m", "l", "xl"]);
    assert_eq!(err.kind(), "validation_error");
    assert_eq!(
        err.details(),
        Some(serde_json::json!({ "field": "effort", "expected": ["s", "m", "l", "xl"] }))
    );
}

#[test]
fn decode_errors_name_the_failing_field() {
    let err = Error::decode(
        PathBuf::from(".tasks/todo/2026-01-05-a/task.md"),
        Some("task_name".to_string()),
        "'../x' is not a valid task name",
    );
    assert_eq!(err.kind(), "decode_error");
    assert_eq!(
        err.to_string(),
        "cannot decode .tasks/todo/2026-01-05-a/task.md: task_name: '../x' is not a valid task name"
    );
    assert_eq!(
        err.details(),
        Some(serde_json::json!({
            "path": ".tasks/todo/2026-01-05-a/task.md",
            "field": "task_name"
        }))
    );
}
