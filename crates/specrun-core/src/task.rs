//! Task descriptors and the execution tree handed in by the host.
//!
//! A run is described by a tree of [`TaskNode`]s. The root carries an
//! assembly task; its children carry context tasks, which may in turn
//! carry specification tasks.
//!
//! ```text
//! TaskNode (Assembly: /abs/path/libspecs.so)
//! ├── TaskNode (Context: accounts::when_transferring)
//! │   ├── TaskNode (Specification: should_debit_source)
//! │   └── TaskNode (Specification: should_credit_target)
//! └── TaskNode (Context: accounts::when_overdrawn)
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use rkyv::Archive;
use serde::{Deserialize, Serialize};

/// The payload attached to one node of the execution tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunTask {
    /// Run every requested context in an assembly.
    Assembly {
        /// Absolute path to the assembly.
        location: PathBuf,
    },

    /// Run one context, resolved by type name.
    Context {
        /// Absolute path to the owning assembly.
        assembly_location: PathBuf,
        /// Fully-qualified context type name.
        context_type_name: String,
    },

    /// One specification inside a context.
    Specification {
        assembly_location: PathBuf,
        context_type_name: String,
        specification_name: String,
    },
}

impl RunTask {
    /// Location of the assembly this task belongs to.
    pub fn assembly_location(&self) -> &Path {
        match self {
            RunTask::Assembly { location } => location,
            RunTask::Context { assembly_location, .. }
            | RunTask::Specification { assembly_location, .. } => assembly_location,
        }
    }

    /// Context type name, for context and specification tasks.
    pub fn context_type_name(&self) -> Option<&str> {
        match self {
            RunTask::Assembly { .. } => None,
            RunTask::Context { context_type_name, .. }
            | RunTask::Specification { context_type_name, .. } => Some(context_type_name),
        }
    }
}

/// A task as seen by the remote task server.
///
/// The `id` is the identity the host uses to correlate notifications with
/// the node it created; it must be stable for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTask {
    pub id: String,
    #[serde(flatten)]
    pub task: RunTask,
}

impl RemoteTask {
    /// Create an assembly task.
    pub fn assembly(id: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            task: RunTask::Assembly {
                location: location.into(),
            },
        }
    }

    /// Create a context task.
    pub fn context(
        id: impl Into<String>,
        assembly_location: impl Into<PathBuf>,
        context_type_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            task: RunTask::Context {
                assembly_location: assembly_location.into(),
                context_type_name: context_type_name.into(),
            },
        }
    }

    /// Create a specification task.
    pub fn specification(
        id: impl Into<String>,
        assembly_location: impl Into<PathBuf>,
        context_type_name: impl Into<String>,
        specification_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            task: RunTask::Specification {
                assembly_location: assembly_location.into(),
                context_type_name: context_type_name.into(),
                specification_name: specification_name.into(),
            },
        }
    }
}

/// One node of the execution tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNode {
    pub task: RemoteTask,
    #[serde(default)]
    pub children: Vec<TaskNode>,
}

impl TaskNode {
    /// Create a leaf node.
    pub fn new(task: RemoteTask) -> Self {
        Self {
            task,
            children: Vec::new(),
        }
    }

    /// Append a child, keeping insertion order.
    pub fn with_child(mut self, child: TaskNode) -> Self {
        self.children.push(child);
        self
    }

    /// All nodes below this one, pre-order, children in stored order.
    ///
    /// The node itself is not yielded.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }
}

/// Pre-order iterator over the descendants of a [`TaskNode`].
pub struct Descendants<'a> {
    stack: Vec<&'a TaskNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a TaskNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Outcome of a task, as reported to the host.
///
/// The runner's own steps only ever return `Success` or `Error`; the other
/// variants describe individual contexts and specifications.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
pub enum TaskResult {
    Success,
    Skipped,
    Inconclusive,
    Error,
    Exception,
}

impl TaskResult {
    /// Whether the result counts as a failure.
    pub fn is_failure(self) -> bool {
        matches!(self, TaskResult::Error | TaskResult::Exception)
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskResult::Success => write!(f, "Success"),
            TaskResult::Skipped => write!(f, "Skipped"),
            TaskResult::Inconclusive => write!(f, "Inconclusive"),
            TaskResult::Error => write!(f, "Error"),
            TaskResult::Exception => write!(f, "Exception"),
        }
    }
}

/// Kind of output text attached to a task.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
pub enum OutputKind {
    StandardOutput,
    StandardError,
}
