//! IPC protocol messages between the IDE and a specrun host process.
//!
//! Uses length-prefixed rkyv messages over stdin/stdout.
//! Format: 4-byte length (u32 LE) + rkyv-encoded message.
//!
//! The run request travels as JSON inside [`HostCommand::Run`] so the
//! execution tree does not need a recursive archived layout.

use std::io::{Read, Write};

use rkyv::api::high::{HighDeserializer, HighSerializer};
use rkyv::rancor::Error as RkyvError;
use rkyv::ser::allocator::ArenaHandle;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

use crate::engine::RunOptions;
use crate::error::{Error, Result};
use crate::task::{OutputKind, TaskNode, TaskResult};

/// Largest message either side will accept.
const MAX_MESSAGE_LEN: usize = 100 * 1024 * 1024;

/// Command sent from the IDE to the host process.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub enum HostCommand {
    /// Ping to check the host is alive.
    Ping,

    /// Run one execution tree.
    Run {
        /// [`RunRequest`] as JSON.
        request_json: Vec<u8>,
    },

    /// Shutdown the host process gracefully.
    Shutdown,
}

/// Event sent from the host process to the IDE.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum HostEvent {
    /// Response to Ping command.
    Pong,

    TaskStarting {
        task_id: String,
    },

    TaskOutput {
        task_id: String,
        text: String,
        kind: OutputKind,
    },

    TaskExplain {
        task_id: String,
        explanation: String,
    },

    TaskError {
        task_id: String,
        message: String,
    },

    TaskException {
        task_id: String,
        message: String,
    },

    TaskFinished {
        task_id: String,
        message: String,
        result: TaskResult,
    },

    /// The run started by a `Run` command is over.
    RunCompleted {
        run_id: String,
        result: TaskResult,
    },

    /// The command could not be carried out.
    Error {
        message: String,
    },

    /// Acknowledgement of shutdown request.
    ShuttingDown,
}

impl HostEvent {
    /// Task the event is about, for task notifications.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            HostEvent::TaskStarting { task_id }
            | HostEvent::TaskOutput { task_id, .. }
            | HostEvent::TaskExplain { task_id, .. }
            | HostEvent::TaskError { task_id, .. }
            | HostEvent::TaskException { task_id, .. }
            | HostEvent::TaskFinished { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

/// One run: the execution tree plus its options.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RunRequest {
    pub tree: TaskNode,
    #[serde(default)]
    pub options: RunOptions,
}

impl RunRequest {
    pub fn new(tree: TaskNode) -> Self {
        Self {
            tree,
            options: RunOptions::default(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::Serialization(format!("Failed to encode run request: {}", e)))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Deserialization(format!("Invalid run request: {}", e)))
    }
}

/// A message that travels on the host pipe.
pub trait Frame:
    Archive<Archived: Deserialize<Self, HighDeserializer<RkyvError>>>
    + for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, RkyvError>>
    + Sized
{
}

impl Frame for HostCommand {}
impl Frame for HostEvent {}

/// Write a message to a writer using length-prefixed rkyv encoding.
pub fn write_message<W: Write, M: Frame>(writer: &mut W, message: &M) -> Result<()> {
    let bytes = rkyv::to_bytes::<RkyvError>(message)
        .map_err(|e| Error::Serialization(format!("Failed to encode IPC message: {}", e)))?;

    let len = bytes.len() as u32;
    writer
        .write_all(&len.to_le_bytes())
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message length: {}", e)))?;
    writer
        .write_all(&bytes)
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message body: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Ipc(format!("Failed to flush IPC stream: {}", e)))?;

    Ok(())
}

/// Read a message from a reader using length-prefixed rkyv encoding.
///
/// # Safety
///
/// Uses unchecked deserialization. Only safe when reading from our own
/// host process or the IDE that spawned it.
pub fn read_message<R: Read, M: Frame>(reader: &mut R) -> Result<M> {
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message length: {}", e)))?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_MESSAGE_LEN {
        return Err(Error::Ipc(format!("IPC message too large: {} bytes", len)));
    }

    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message body: {}", e)))?;

    // SAFETY: both ends of the pipe are specrun processes.
    let message = unsafe { rkyv::from_bytes_unchecked::<M, RkyvError>(&bytes) }
        .map_err(|e| Error::Serialization(format!("Failed to decode IPC message: {}", e)))?;

    Ok(message)
}
