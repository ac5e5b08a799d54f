//! Run listener: turns engine callbacks into remote task notifications.

use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::FxHashMap;

use crate::assembly::abi::{SpecResult, SpecStatus};
use crate::server::RemoteTaskServer;
use crate::task::{OutputKind, RemoteTask, TaskResult};

use super::TaskNotification;

const NOT_IMPLEMENTED_MESSAGE: &str = "Not implemented";

#[derive(Default)]
struct ListenerState {
    notifications: Vec<TaskNotification>,
    /// Worst specification result seen per context.
    context_results: FxHashMap<String, TaskResult>,
}

/// Listener for one run of one assembly.
///
/// Notifications are registered up front; engine callbacks are routed to
/// every registered notification they match. Callbacks that match nothing
/// are dropped.
pub struct RunListener {
    server: Arc<dyn RemoteTaskServer>,
    assembly_task: RemoteTask,
    state: Mutex<ListenerState>,
}

impl RunListener {
    pub fn new(server: Arc<dyn RemoteTaskServer>, assembly_task: RemoteTask) -> Self {
        Self {
            server,
            assembly_task,
            state: Mutex::new(ListenerState::default()),
        }
    }

    /// The root task this listener reports fatal errors against.
    pub fn assembly_task(&self) -> &RemoteTask {
        &self.assembly_task
    }

    /// Listener state, recovered if a callback panicked while holding it.
    fn state(&self) -> MutexGuard<'_, ListenerState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register the notification for one node.
    pub fn register(&self, notification: TaskNotification) {
        tracing::debug!("Registering notification for task {}", notification.task().id);
        self.state().notifications.push(notification);
    }

    /// Number of registered notifications.
    pub fn registered_count(&self) -> usize {
        self.state().notifications.len()
    }

    /// Tasks of the registered notifications, in registration order.
    pub fn registered_tasks(&self) -> Vec<RemoteTask> {
        self.state()
            .notifications
            .iter()
            .map(|n| n.task().clone())
            .collect()
    }

    fn matching(&self, predicate: impl Fn(&TaskNotification) -> bool) -> Vec<RemoteTask> {
        self.state()
            .notifications
            .iter()
            .filter(|n| predicate(n))
            .map(|n| n.task().clone())
            .collect()
    }

    pub fn on_run_start(&self) {
        tracing::info!("Run started for {}", self.assembly_task.id);
    }

    pub fn on_run_end(&self) {
        tracing::info!("Run ended for {}", self.assembly_task.id);
    }

    pub fn on_context_start(&self, context: &str) {
        let tasks = self.matching(|n| n.matches_context(context));
        if tasks.is_empty() {
            tracing::warn!("No registered task for context {}", context);
        }
        for task in &tasks {
            self.server.task_starting(task);
        }
    }

    pub fn on_specification_start(&self, context: &str, specification: &str) {
        for task in self.matching(|n| n.matches_specification(context, specification)) {
            self.server.task_starting(&task);
        }
    }

    pub fn on_specification_end(&self, context: &str, specification: &str, result: &SpecResult) {
        let (task_result, message) = map_spec_result(result);

        {
            let mut state = self.state();
            let worst = state
                .context_results
                .entry(context.to_string())
                .or_insert(TaskResult::Success);
            *worst = (*worst).max(task_result);
        }

        let tasks = self.matching(|n| n.matches_specification(context, specification));
        if tasks.is_empty() {
            tracing::debug!("No registered task for {}::{}", context, specification);
        }
        for task in &tasks {
            if let Some(text) = result.message.as_deref() {
                self.server.task_output(task, text, OutputKind::StandardOutput);
            }
            if result.status == SpecStatus::Failed {
                self.server.task_exception(task, &message);
            }
            self.server.task_finished(task, &message, task_result);
        }
    }

    pub fn on_context_end(&self, context: &str) {
        let result = self
            .state()
            .context_results
            .remove(context)
            .unwrap_or(TaskResult::Success);

        for task in self.matching(|n| n.matches_context(context)) {
            self.server.task_finished(&task, "", result);
        }
    }

    pub fn on_fatal_error(&self, message: &str) {
        tracing::error!("Fatal error in {}: {}", self.assembly_task.id, message);
        self.server.task_exception(&self.assembly_task, message);
        self.server
            .task_finished(&self.assembly_task, message, TaskResult::Exception);
    }
}

fn map_spec_result(result: &SpecResult) -> (TaskResult, String) {
    let message = result.message.clone().unwrap_or_default();
    match result.status {
        SpecStatus::Passed => (TaskResult::Success, message),
        SpecStatus::Failed => (TaskResult::Error, message),
        SpecStatus::NotImplemented => (TaskResult::Inconclusive, NOT_IMPLEMENTED_MESSAGE.to_string()),
        SpecStatus::Ignored => (TaskResult::Skipped, message),
    }
}
