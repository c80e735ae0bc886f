//! End-to-end engine scenarios against a real python3 interpreter.

use std::path::Path;
use std::time::{Duration, Instant};

use runbox::engine::{execute, EngineConfig, ExecutionRequest, Verdict};
use runbox::metrics::{record, FileMetricsStore, MetricsStore};

/// These tests need a python3 on PATH; skip them gracefully where the
/// interpreter is unavailable.
fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

macro_rules! require_python3 {
    () => {
        if !python3_available() {
            eprintln!("python3 not found on PATH, skipping");
            return;
        }
    };
}

fn request(source: &str, stdin: &str, timeout_seconds: u64) -> ExecutionRequest {
    ExecutionRequest {
        source: source.to_string(),
        stdin: stdin.to_string(),
        timeout_seconds,
    }
}

/// Config whose workspaces live in a private tempdir, so tests can assert
/// that no artifact survives the call.
fn scoped_config(root: &Path) -> EngineConfig {
    EngineConfig {
        workspace_root: root.to_path_buf(),
        ..EngineConfig::default()
    }
}

fn assert_no_leftover_workspaces(root: &Path) {
    let leftovers: Vec<_> = std::fs::read_dir(root)
        .expect("workspace root readable")
        .collect();
    assert!(leftovers.is_empty(), "workspace leaked: {:?}", leftovers);
}

#[test]
fn test_hello_world_accepted() {
    require_python3!();
    let root = tempfile::tempdir().unwrap();
    let config = scoped_config(root.path());

    let result = execute(&config, &request("print('Hello, world!')", "", 5));

    assert_eq!(result.status, Verdict::Accepted);
    assert!(result.stdout.contains("Hello, world!"), "{:?}", result);
    assert!(result.stderr.is_empty(), "{:?}", result);
    assert!(result.error.is_none(), "{:?}", result);
    assert_no_leftover_workspaces(root.path());
}

#[test]
fn test_stdin_is_fed_to_the_submission() {
    require_python3!();
    let root = tempfile::tempdir().unwrap();
    let config = scoped_config(root.path());

    let source = "import sys\nprint(sys.stdin.read().strip().upper())";
    let result = execute(&config, &request(source, "hello", 5));

    assert_eq!(result.status, Verdict::Accepted);
    assert!(result.stdout.contains("HELLO"), "{:?}", result);
    assert_no_leftover_workspaces(root.path());
}

#[test]
fn test_division_by_zero_is_runtime_error() {
    require_python3!();
    let root = tempfile::tempdir().unwrap();
    let config = scoped_config(root.path());

    let result = execute(&config, &request("print(1 / 0)", "", 5));

    assert_eq!(result.status, Verdict::RuntimeError);
    assert!(!result.stderr.is_empty(), "{:?}", result);
    assert!(result.stderr.contains("ZeroDivisionError"), "{:?}", result);
    assert!(result.error.is_some(), "{:?}", result);
    assert_no_leftover_workspaces(root.path());
}

#[test]
fn test_traceback_path_is_sanitized() {
    require_python3!();
    let root = tempfile::tempdir().unwrap();
    let config = scoped_config(root.path());

    let result = execute(&config, &request("raise ValueError('boom')", "", 5));

    assert_eq!(result.status, Verdict::RuntimeError);
    // The traceback names the source file; the absolute workspace path must
    // be rewritten to the placeholder.
    assert!(result.stderr.contains("submission.py"), "{:?}", result);
    let root_str = root.path().to_str().unwrap();
    assert!(
        !result.stderr.contains(root_str),
        "workspace path leaked: {:?}",
        result
    );
}

#[test]
fn test_nonzero_exit_without_stderr_is_execution_failed() {
    require_python3!();
    let root = tempfile::tempdir().unwrap();
    let config = scoped_config(root.path());

    let result = execute(&config, &request("import sys\nsys.exit(3)", "", 5));

    assert_eq!(result.status, Verdict::ExecutionFailed);
    assert!(result.stderr.is_empty(), "{:?}", result);
    assert_eq!(result.error.as_deref(), Some("Process exited with code 3"));
}

#[test]
fn test_infinite_loop_hits_time_limit() {
    require_python3!();
    let root = tempfile::tempdir().unwrap();
    let config = scoped_config(root.path());

    let started = Instant::now();
    let result = execute(&config, &request("while True:\n    pass", "", 1));
    let elapsed = started.elapsed();

    assert_eq!(result.status, Verdict::TimeLimitExceeded);
    assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);
    let error = result.error.expect("error message set");
    assert!(error.contains("1 second"), "{}", error);
    assert!(result.stdout.is_empty());
    assert!(result.stderr.is_empty());
    assert_no_leftover_workspaces(root.path());
}

#[test]
fn test_background_descendant_does_not_block_return() {
    require_python3!();
    let root = tempfile::tempdir().unwrap();
    let config = scoped_config(root.path());

    // The grandchild inherits the output pipes; the engine must still return
    // once the direct child exits.
    let source = "import subprocess\nsubprocess.Popen(['sleep', '30'])\nprint('spawned')";
    let started = Instant::now();
    let result = execute(&config, &request(source, "", 5));
    let elapsed = started.elapsed();

    assert_eq!(result.status, Verdict::Accepted, "{:?}", result);
    assert!(elapsed < Duration::from_secs(5), "took {:?}", elapsed);
    assert_no_leftover_workspaces(root.path());
}

#[test]
fn test_unwritable_workspace_root_is_internal_error() {
    require_python3!();
    let root = tempfile::tempdir().unwrap();
    // A regular file where the workspace root should be forces workspace
    // creation to fail before any child is spawned.
    let blocker = root.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();
    let config = scoped_config(&blocker);

    let result = execute(&config, &request("print('never runs')", "", 5));

    assert_eq!(result.status, Verdict::InternalError);
    assert!(result.stdout.is_empty());
    let error = result.error.expect("error message set");
    assert!(error.contains("workspace"), "{}", error);
}

#[test]
fn test_missing_interpreter_is_internal_error() {
    let root = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        interpreter: "runbox-no-such-interpreter".to_string(),
        workspace_root: root.path().to_path_buf(),
    };

    let result = execute(&config, &request("print('never runs')", "", 5));

    assert_eq!(result.status, Verdict::InternalError);
    assert!(result.error.is_some());
    assert_no_leftover_workspaces(root.path());
}

#[test]
fn test_zero_timeout_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let config = scoped_config(root.path());

    let result = execute(&config, &request("print('never runs')", "", 0));

    assert_eq!(result.status, Verdict::InternalError);
    assert_eq!(
        result.error.as_deref(),
        Some("timeout_seconds must be positive")
    );
}

#[test]
fn test_same_submission_classifies_identically() {
    require_python3!();
    let root = tempfile::tempdir().unwrap();
    let config = scoped_config(root.path());

    let req = request("print(1 / 0)", "", 5);
    let first = execute(&config, &req);
    let second = execute(&config, &req);
    assert_eq!(first.status, second.status);
}

#[test]
fn test_executions_are_recorded_in_metrics_file() {
    require_python3!();
    let root = tempfile::tempdir().unwrap();
    let config = scoped_config(root.path());
    let metrics_path = root.path().join("state").join("metrics.json");
    let store = FileMetricsStore::new(&metrics_path);

    for source in ["print('ok')", "print(1 / 0)", "print('ok again')"] {
        let result = execute(&config, &request(source, "", 5));
        record(&store, &result);
    }

    let snapshot = store.load();
    assert_eq!(snapshot.total_executions, 3);
    assert_eq!(snapshot.accepted, 2);
    assert_eq!(snapshot.runtime_error, 1);
    assert_eq!(snapshot.verdict_total(), snapshot.total_executions);
    assert!(snapshot.last_updated.is_some());
}

#[test]
fn test_result_serializes_with_contract_field_names() {
    require_python3!();
    let root = tempfile::tempdir().unwrap();
    let config = scoped_config(root.path());

    let result = execute(&config, &request("print('Hello, world!')", "", 5));
    let json: serde_json::Value = serde_json::to_value(&result).unwrap();

    assert_eq!(json["status"], "Accepted");
    assert_eq!(json["stdout"], "Hello, world!");
    assert_eq!(json["stderr"], "");
    assert!(json["execution_time_ms"].is_u64());
    assert!(json["error"].is_null());
}
