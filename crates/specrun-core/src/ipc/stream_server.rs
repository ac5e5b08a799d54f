//! Remote task server writing notifications as IPC events.

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::server::RemoteTaskServer;
use crate::task::{OutputKind, RemoteTask, TaskResult};

use super::protocol::{HostEvent, write_message};

/// Sends every notification as a [`HostEvent`] on a shared writer.
///
/// The writer is shared with whoever answers commands on the same stream,
/// so events and responses never interleave mid-frame. Write failures are
/// logged and dropped.
pub struct StreamTaskServer<W: Write + Send> {
    writer: Arc<Mutex<W>>,
}

impl<W: Write + Send> StreamTaskServer<W> {
    pub fn new(writer: Arc<Mutex<W>>) -> Self {
        Self { writer }
    }

    /// Write one event. Errors are logged, not returned.
    pub fn send(&self, event: &HostEvent) {
        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = write_message(&mut *writer, event) {
            tracing::warn!("Dropped host event {:?}: {}", event, e);
        }
    }
}

impl<W: Write + Send> RemoteTaskServer for StreamTaskServer<W> {
    fn task_starting(&self, task: &RemoteTask) {
        self.send(&HostEvent::TaskStarting {
            task_id: task.id.clone(),
        });
    }

    fn task_output(&self, task: &RemoteTask, text: &str, kind: OutputKind) {
        self.send(&HostEvent::TaskOutput {
            task_id: task.id.clone(),
            text: text.to_string(),
            kind,
        });
    }

    fn task_explain(&self, task: &RemoteTask, explanation: &str) {
        self.send(&HostEvent::TaskExplain {
            task_id: task.id.clone(),
            explanation: explanation.to_string(),
        });
    }

    fn task_error(&self, task: &RemoteTask, message: &str) {
        self.send(&HostEvent::TaskError {
            task_id: task.id.clone(),
            message: message.to_string(),
        });
    }

    fn task_exception(&self, task: &RemoteTask, message: &str) {
        self.send(&HostEvent::TaskException {
            task_id: task.id.clone(),
            message: message.to_string(),
        });
    }

    fn task_finished(&self, task: &RemoteTask, message: &str, result: TaskResult) {
        self.send(&HostEvent::TaskFinished {
            task_id: task.id.clone(),
            message: message.to_string(),
            result,
        });
    }
}
