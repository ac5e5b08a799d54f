//! The remote task server: where notifications about tasks go.
//!
//! Every call is fire-and-forget. Implementations must not fail the run
//! when a notification cannot be delivered.

use std::sync::Mutex;

use crate::task::{OutputKind, RemoteTask, TaskResult};

/// Receiver of task notifications on the host side.
pub trait RemoteTaskServer: Send + Sync {
    /// A task is about to run.
    fn task_starting(&self, task: &RemoteTask);

    /// Output produced while running a task.
    fn task_output(&self, task: &RemoteTask, text: &str, kind: OutputKind);

    /// Human-readable diagnostic text for a task.
    fn task_explain(&self, task: &RemoteTask, explanation: &str);

    /// Terse failure signal for a task.
    fn task_error(&self, task: &RemoteTask, message: &str);

    /// A failure with details (assertion text, panic message).
    fn task_exception(&self, task: &RemoteTask, message: &str);

    /// A task has finished.
    fn task_finished(&self, task: &RemoteTask, message: &str, result: TaskResult);
}

/// One recorded server call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCall {
    Starting { task_id: String },
    Output { task_id: String, text: String, kind: OutputKind },
    Explain { task_id: String, explanation: String },
    Error { task_id: String, message: String },
    Exception { task_id: String, message: String },
    Finished { task_id: String, message: String, result: TaskResult },
}

impl ServerCall {
    pub fn task_id(&self) -> &str {
        match self {
            ServerCall::Starting { task_id }
            | ServerCall::Output { task_id, .. }
            | ServerCall::Explain { task_id, .. }
            | ServerCall::Error { task_id, .. }
            | ServerCall::Exception { task_id, .. }
            | ServerCall::Finished { task_id, .. } => task_id,
        }
    }
}

/// Server that keeps every call in memory.
///
/// Used when embedding the runner in-process and in tests.
#[derive(Debug, Default)]
pub struct MemoryTaskServer {
    calls: Mutex<Vec<ServerCall>>,
}

impl MemoryTaskServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all calls so far, in order.
    pub fn calls(&self) -> Vec<ServerCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Calls made for one task.
    pub fn calls_for(&self, task_id: &str) -> Vec<ServerCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.task_id() == task_id)
            .collect()
    }

    fn record(&self, call: ServerCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl RemoteTaskServer for MemoryTaskServer {
    fn task_starting(&self, task: &RemoteTask) {
        self.record(ServerCall::Starting {
            task_id: task.id.clone(),
        });
    }

    fn task_output(&self, task: &RemoteTask, text: &str, kind: OutputKind) {
        self.record(ServerCall::Output {
            task_id: task.id.clone(),
            text: text.to_string(),
            kind,
        });
    }

    fn task_explain(&self, task: &RemoteTask, explanation: &str) {
        self.record(ServerCall::Explain {
            task_id: task.id.clone(),
            explanation: explanation.to_string(),
        });
    }

    fn task_error(&self, task: &RemoteTask, message: &str) {
        self.record(ServerCall::Error {
            task_id: task.id.clone(),
            message: message.to_string(),
        });
    }

    fn task_exception(&self, task: &RemoteTask, message: &str) {
        self.record(ServerCall::Exception {
            task_id: task.id.clone(),
            message: message.to_string(),
        });
    }

    fn task_finished(&self, task: &RemoteTask, message: &str, result: TaskResult) {
        self.record(ServerCall::Finished {
            task_id: task.id.clone(),
            message: message.to_string(),
            result,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_server_records_in_order() {
        let server = MemoryTaskServer::new();
        let asm = RemoteTask::assembly("asm", "/specs/lib.so");
        let ctx = RemoteTask::context("c1", "/specs/lib.so", "a::one");

        server.task_starting(&ctx);
        server.task_explain(&asm, "why");
        server.task_finished(&ctx, "", TaskResult::Success);

        let calls = server.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[1],
            ServerCall::Explain {
                task_id: "asm".to_string(),
                explanation: "why".to_string(),
            }
        );
        assert_eq!(server.calls_for("c1").len(), 2);
    }
}
