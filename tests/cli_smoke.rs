mod support;

use std::path::Path;

use predicates::str::contains;
use serde_json::Value;

use support::dot_tasks_cmd;

fn run_json(root: &Path, args: &[&str]) -> Value {
    let output = dot_tasks_cmd()
        .arg("--root")
        .arg(root)
        .arg("--json")
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("json output")
}

fn init_store(dir: &Path) -> std::path::PathBuf {
    let root = dir.join(".tasks");
    dot_tasks_cmd()
        .arg("--root")
        .arg(&root)
        .arg("init")
        .assert()
        .success()
        .stdout(contains("Initialized task store"));
    root
}

#[test]
fn help_lists_commands() {
    dot_tasks_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("create"))
        .stdout(contains("complete"));
}

#[test]
fn init_defaults_to_working_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    dot_tasks_cmd()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
    assert!(dir.path().join(".tasks").join("todo").is_dir());
    assert!(dir.path().join(".tasks").join("config.toml").is_file());

    dot_tasks_cmd()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(contains("already initialized"));
}

#[test]
fn create_start_complete_round() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = init_store(dir.path());

    let created = run_json(
        &root,
        &["create", "write-docs", "--priority", "p1", "--tag", "docs"],
    );
    assert_eq!(created["schema_version"], "dot-tasks.v1");
    assert_eq!(created["command"], "create");
    assert_eq!(created["status"], "success");
    assert_eq!(created["data"]["name"], "write-docs");
    assert_eq!(created["data"]["priority"], "p1");
    let id = created["data"]["id"].as_str().expect("id").to_string();

    let started = run_json(&root, &["start", &id]);
    assert_eq!(started["data"]["status"], "doing");

    let completed = run_json(&root, &["complete", "write-docs"]);
    assert_eq!(completed["data"]["status"], "done");

    let listed = run_json(&root, &["list"]);
    assert_eq!(listed["data"]["total"], 1);
    assert_eq!(listed["data"]["tasks"][0]["id"], id.as_str());
}

#[test]
fn blocked_start_exits_with_code_three() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = init_store(dir.path());
    run_json(&root, &["create", "base"]);
    run_json(&root, &["create", "follow-up", "--depends-on", "base"]);

    let output = dot_tasks_cmd()
        .arg("--root")
        .arg(&root)
        .args(["--json", "start", "follow-up"])
        .assert()
        .code(3)
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output).expect("json");
    assert_eq!(value["status"], "error");
    assert_eq!(value["error"]["kind"], "dependencies_unmet");
    assert_eq!(value["error"]["code"], 3);

    dot_tasks_cmd()
        .arg("--root")
        .arg(&root)
        .args(["start", "follow-up", "--force"])
        .assert()
        .success()
        .stdout(contains("Task started"));
}

#[test]
fn unknown_task_is_a_user_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = init_store(dir.path());
    dot_tasks_cmd()
        .arg("--root")
        .arg(&root)
        .args(["view", "missing"])
        .assert()
        .code(2)
        .stderr(contains("error: task not found: missing"))
        .stderr(contains("hint: dot-tasks list"));
}

#[test]
fn invalid_priority_names_allowed_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = init_store(dir.path());
    dot_tasks_cmd()
        .arg("--root")
        .arg(&root)
        .args(["create", "a", "--priority", "urgent"])
        .assert()
        .code(2)
        .stderr(contains("p0|p1|p2|p3"));
}

#[test]
fn missing_store_is_an_operation_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    dot_tasks_cmd()
        .arg("--root")
        .arg(dir.path().join(".tasks"))
        .arg("list")
        .assert()
        .code(4)
        .stderr(contains("hint: dot-tasks init"));
}

#[test]
fn actor_flag_is_written_to_the_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = init_store(dir.path());
    dot_tasks_cmd()
        .arg("--root")
        .arg(&root)
        .args(["--actor", "agent-7", "create", "a"])
        .assert()
        .success();
    dot_tasks_cmd()
        .arg("--root")
        .arg(&root)
        .env("DOT_TASKS_ACTOR", "from-env")
        .args(["log", "a", "picked up"])
        .assert()
        .success();

    let view = run_json(&root, &["view", "a"]);
    let activity = view["data"]["activity"].as_array().expect("activity");
    assert_eq!(activity.len(), 2);
    assert_eq!(activity[0]["actor"], "agent-7");
    assert_eq!(activity[0]["kind"], "created");
    assert_eq!(activity[1]["actor"], "from-env");
    assert_eq!(activity[1]["note"], "picked up");
}

#[test]
fn list_renders_configured_columns_and_warns_on_bad_settings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = init_store(dir.path());
    std::fs::write(
        root.join("config.toml"),
        r#"
[settings]
show_banner = false

[[settings.list_table.columns]]
name = "task_id"
width = 16

[[settings.list_table.columns]]
name = "task_name"
width = 6

[[settings.list_table.columns]]
name = "colour"
width = 4
"#,
    )
    .expect("write config");
    run_json(&root, &["create", "very-long-name"]);

    let output = dot_tasks_cmd()
        .arg("--root")
        .arg(&root)
        .arg("list")
        .assert()
        .success()
        .stderr(contains("Unsupported list column 'colour'"))
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).expect("utf8");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], format!("{:<16}  {}", "task_id", "task_~"));
    assert!(lines[1].ends_with("  very-~"), "{stdout}");
}

#[test]
fn delete_moves_to_trash_then_hard_delete_removes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = init_store(dir.path());
    run_json(&root, &["create", "a"]);

    let trashed = run_json(&root, &["delete", "a"]);
    assert_eq!(trashed["data"]["status"], "trashed");
    let trashed_dir = Path::new(trashed["data"]["dir"].as_str().expect("dir"));
    assert!(trashed_dir.starts_with(root.join("trash")));
    assert!(trashed_dir.is_dir());

    run_json(&root, &["delete", "a", "--hard"]);
    let listed = run_json(&root, &["list", "--trash"]);
    assert_eq!(listed["data"]["total"], 0);
}
