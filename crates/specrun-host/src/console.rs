//! Remote task server printing notifications for a human.

use std::collections::HashMap;
use std::sync::Mutex;

use specrun_core::{OutputKind, RemoteTask, RemoteTaskServer, RunTask, TaskNode, TaskResult};

use crate::colors::{BOLD, DIM, GREEN, RED, RESET, YELLOW, flush_stdout};

/// Counts of finished specifications.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub inconclusive: usize,
    /// Explain/error notifications, from load and resolution failures.
    pub errors: usize,
}

/// Prints each notification as one line on stdout.
pub struct ConsoleTaskServer {
    depths: HashMap<String, usize>,
    summary: Mutex<Summary>,
}

impl ConsoleTaskServer {
    pub fn new(tree: &TaskNode) -> Self {
        let mut depths = HashMap::new();
        collect_depths(tree, 0, &mut depths);
        Self {
            depths,
            summary: Mutex::new(Summary::default()),
        }
    }

    pub fn summary(&self) -> Summary {
        self.summary.lock().map(|s| *s).unwrap_or_default()
    }

    fn indent(&self, task: &RemoteTask) -> String {
        "  ".repeat(self.depths.get(&task.id).copied().unwrap_or(0))
    }

    fn update(&self, f: impl FnOnce(&mut Summary)) {
        if let Ok(mut summary) = self.summary.lock() {
            f(&mut summary);
        }
    }
}

fn collect_depths(node: &TaskNode, depth: usize, depths: &mut HashMap<String, usize>) {
    depths.insert(node.task.id.clone(), depth);
    for child in &node.children {
        collect_depths(child, depth + 1, depths);
    }
}

fn label(task: &RemoteTask) -> String {
    match &task.task {
        RunTask::Assembly { location } => location.display().to_string(),
        RunTask::Context {
            context_type_name, ..
        } => context_type_name.clone(),
        RunTask::Specification {
            specification_name,
            ..
        } => specification_name.clone(),
    }
}

impl RemoteTaskServer for ConsoleTaskServer {
    fn task_starting(&self, task: &RemoteTask) {
        if matches!(task.task, RunTask::Context { .. }) {
            println!("{}{BOLD}{}{RESET}", self.indent(task), label(task));
            flush_stdout();
        }
    }

    fn task_output(&self, task: &RemoteTask, text: &str, kind: OutputKind) {
        let indent = self.indent(task);
        for line in text.lines() {
            match kind {
                OutputKind::StandardOutput => println!("{indent}  {DIM}{line}{RESET}"),
                OutputKind::StandardError => println!("{indent}  {RED}{line}{RESET}"),
            }
        }
    }

    fn task_explain(&self, task: &RemoteTask, explanation: &str) {
        println!("{}{YELLOW}{}{RESET}", self.indent(task), explanation);
    }

    fn task_error(&self, task: &RemoteTask, message: &str) {
        self.update(|s| s.errors += 1);
        println!("{}{RED}✗ {}: {}{RESET}", self.indent(task), label(task), message);
    }

    fn task_exception(&self, task: &RemoteTask, message: &str) {
        let indent = self.indent(task);
        for line in message.lines() {
            println!("{indent}  {RED}{line}{RESET}");
        }
    }

    fn task_finished(&self, task: &RemoteTask, _message: &str, result: TaskResult) {
        if !matches!(task.task, RunTask::Specification { .. }) {
            return;
        }
        let (marker, color) = match result {
            TaskResult::Success => ("✓", GREEN),
            TaskResult::Skipped => ("-", YELLOW),
            TaskResult::Inconclusive => ("?", YELLOW),
            TaskResult::Error | TaskResult::Exception => ("✗", RED),
        };
        self.update(|s| match result {
            TaskResult::Success => s.passed += 1,
            TaskResult::Skipped => s.skipped += 1,
            TaskResult::Inconclusive => s.inconclusive += 1,
            TaskResult::Error | TaskResult::Exception => s.failed += 1,
        });
        println!("{}{color}{marker}{RESET} {}", self.indent(task), label(task));
        flush_stdout();
    }
}
