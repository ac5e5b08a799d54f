//! Integration tests running a real native assembly.
//!
//! `tests/fixtures/accounts_specs.rs` is compiled to a cdylib with rustc for
//! every test, so each test gets its own library and call log.

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use specrun_core::{
    DylibResolver, MemoryTaskServer, OutputKind, RecursiveTaskRunner, RemoteTask, RunOptions,
    ServerCall, TaskNode, TaskResult, VersionCompatibilityChecker, load_context_assembly,
};
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// The fixture assembly built into a temporary directory.
struct Fixture {
    _temp_dir: TempDir,
    library: PathBuf,
    log: PathBuf,
}

impl Fixture {
    fn build() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let library = temp_dir
            .path()
            .join(format!("{}accounts_specs{}", DLL_PREFIX, DLL_SUFFIX));
        let log = temp_dir.path().join("calls.log");
        let source = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("accounts_specs.rs");

        let compiled = Command::new("rustc")
            .env("SPECRUN_FIXTURE_LOG", &log)
            .args(["--edition", "2021", "--crate-type", "cdylib", "--crate-name", "accounts_specs"])
            .arg("-o")
            .arg(&library)
            .arg(&source)
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        assert!(compiled, "Fixture assembly compilation failed");

        Self {
            _temp_dir: temp_dir,
            library,
            log,
        }
    }

    fn location(&self) -> &str {
        self.library.to_str().unwrap()
    }

    /// Exports called so far, in order.
    fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn runner(&self, server: Arc<MemoryTaskServer>) -> RecursiveTaskRunner {
        RecursiveTaskRunner::new(server).with_checker(VersionCompatibilityChecker::new("1.2.0"))
    }

    fn context(&self, id: &str, name: &str) -> TaskNode {
        TaskNode::new(RemoteTask::context(id, self.location(), name))
    }

    fn tree(&self, children: Vec<TaskNode>) -> TaskNode {
        children.into_iter().fold(
            TaskNode::new(RemoteTask::assembly("asm", self.location())),
            TaskNode::with_child,
        )
    }
}

fn finished(task_id: &str, message: &str, result: TaskResult) -> ServerCall {
    ServerCall::Finished {
        task_id: task_id.to_string(),
        message: message.to_string(),
        result,
    }
}

fn starting(task_id: &str) -> ServerCall {
    ServerCall::Starting {
        task_id: task_id.to_string(),
    }
}

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_manifest_read_from_export() {
    let fixture = Fixture::build();

    let assembly = load_context_assembly(&DylibResolver, &fixture.library).unwrap();

    assert_eq!(assembly.name(), "accounts_specs");
    assert_eq!(assembly.runner_version(), Some("1.2.0"));
    assert!(assembly.library().is_some());
    assert_eq!(
        assembly.contexts().names(),
        vec![
            "accounts::when_closed",
            "accounts::when_frozen",
            "accounts::when_overdrawn",
            "accounts::when_transferring",
        ]
    );
    assert_eq!(
        assembly
            .context("accounts::when_transferring, accounts_specs")
            .unwrap()
            .specifications,
        vec!["should_debit", "should_credit"]
    );
    assert_eq!(fixture.calls(), vec!["manifest"]);
}

// =============================================================================
// Running
// =============================================================================

#[test]
fn test_specification_results_reach_registered_nodes() {
    let fixture = Fixture::build();
    let server = Arc::new(MemoryTaskServer::new());
    let root = fixture.tree(vec![
        fixture
            .context("c1", "accounts::when_transferring, accounts_specs")
            .with_child(TaskNode::new(RemoteTask::specification(
                "s1",
                fixture.location(),
                "accounts::when_transferring",
                "should_debit",
            )))
            .with_child(TaskNode::new(RemoteTask::specification(
                "s2",
                fixture.location(),
                "accounts::when_transferring",
                "should_credit",
            ))),
    ]);

    let result = fixture.runner(server.clone()).run_to_completion(&root).unwrap();

    assert_eq!(result, TaskResult::Success);
    assert_eq!(
        fixture.calls(),
        vec![
            "manifest",
            "start_run",
            "run:accounts::when_transferring",
            "end_run",
        ]
    );
    assert_eq!(
        server.calls_for("s1"),
        vec![starting("s1"), finished("s1", "", TaskResult::Success)]
    );
    assert_eq!(
        server.calls_for("s2"),
        vec![
            starting("s2"),
            ServerCall::Output {
                task_id: "s2".to_string(),
                text: "expected 100, got 90".to_string(),
                kind: OutputKind::StandardOutput,
            },
            ServerCall::Exception {
                task_id: "s2".to_string(),
                message: "expected 100, got 90".to_string(),
            },
            finished("s2", "expected 100, got 90", TaskResult::Error),
        ]
    );
    assert_eq!(
        server.calls_for("c1"),
        vec![starting("c1"), finished("c1", "", TaskResult::Error)]
    );
    assert!(server.calls_for("asm").is_empty());
}

#[test]
fn test_failure_codes_are_fatal_errors_on_root() {
    let fixture = Fixture::build();
    let server = Arc::new(MemoryTaskServer::new());
    let root = fixture.tree(vec![
        fixture.context("c1", "accounts::when_closed"),
        fixture.context("c2", "accounts::when_overdrawn"),
        fixture.context("c3", "accounts::when_frozen"),
    ]);

    let result = fixture.runner(server.clone()).run_to_completion(&root).unwrap();

    assert_eq!(result, TaskResult::Success);
    assert_eq!(
        fixture.calls(),
        vec![
            "manifest",
            "start_run",
            "run:accounts::when_closed",
            "run:accounts::when_overdrawn",
            "run:accounts::when_frozen",
            "end_run",
        ]
    );

    let fatal: Vec<String> = server
        .calls_for("asm")
        .into_iter()
        .filter_map(|call| match call {
            ServerCall::Exception { message, .. } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(
        fatal,
        vec![
            "Assembly accounts_specs does not define context accounts::when_closed",
            "Context accounts::when_overdrawn failed with code -2",
            "Context accounts::when_frozen panicked",
        ]
    );
    assert!(matches!(
        server.calls_for("asm").last(),
        Some(ServerCall::Finished {
            result: TaskResult::Exception,
            ..
        })
    ));
}

#[test]
fn test_filtered_context_is_never_called() {
    let fixture = Fixture::build();
    let server = Arc::new(MemoryTaskServer::new());
    let root = fixture.tree(vec![fixture.context("c1", "accounts::when_overdrawn")]);
    let options = RunOptions {
        exclude_tags: vec!["slow".to_string()],
        ..Default::default()
    };

    let result = fixture
        .runner(server.clone())
        .with_options(options)
        .run_to_completion(&root)
        .unwrap();

    assert_eq!(result, TaskResult::Success);
    assert_eq!(fixture.calls(), vec!["manifest", "start_run", "end_run"]);
    assert!(server.calls().is_empty());
}
