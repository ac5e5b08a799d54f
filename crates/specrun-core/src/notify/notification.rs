//! Per-node notifications.

use crate::assembly::type_portion;
use crate::task::{RemoteTask, RunTask, TaskNode};

/// Binds one execution node to the engine callbacks that concern it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskNotification {
    Assembly {
        task: RemoteTask,
    },
    Context {
        task: RemoteTask,
        context: String,
    },
    Specification {
        task: RemoteTask,
        context: String,
        specification: String,
    },
}

impl TaskNotification {
    pub fn task(&self) -> &RemoteTask {
        match self {
            TaskNotification::Assembly { task }
            | TaskNotification::Context { task, .. }
            | TaskNotification::Specification { task, .. } => task,
        }
    }

    /// Whether a context callback concerns this node.
    ///
    /// Names are compared by type portion, as the registry resolves them.
    pub fn matches_context(&self, context: &str) -> bool {
        matches!(self, TaskNotification::Context { context: c, .. } if c == type_portion(context))
    }

    /// Whether a specification callback concerns this node.
    ///
    /// Names are compared by type portion.
    pub fn matches_specification(&self, context: &str, specification: &str) -> bool {
        matches!(
            self,
            TaskNotification::Specification { context: c, specification: s, .. }
                if c == type_portion(context) && s == specification
        )
    }
}

/// Creates the notification for a node from its task kind.
///
/// Context names are stored without any assembly qualification so they
/// compare equal to the names engines report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationFactory;

impl NotificationFactory {
    pub fn create(&self, node: &TaskNode) -> TaskNotification {
        let task = node.task.clone();
        match &node.task.task {
            RunTask::Assembly { .. } => TaskNotification::Assembly { task },
            RunTask::Context {
                context_type_name, ..
            } => TaskNotification::Context {
                context: type_portion(context_type_name).to_string(),
                task,
            },
            RunTask::Specification {
                context_type_name,
                specification_name,
                ..
            } => TaskNotification::Specification {
                context: type_portion(context_type_name).to_string(),
                specification: specification_name.clone(),
                task,
            },
        }
    }
}
