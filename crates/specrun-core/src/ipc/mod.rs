//! Inter-process communication between the IDE and specrun host processes.
//!
//! The IDE spawns `specrun-host serve`, sends it [`HostCommand`]s and reads
//! back a stream of [`HostEvent`]s, one per task notification.

mod host;
pub mod protocol;
mod stream_server;

pub use host::{HOST_PATH_ENV, HostHandle, RunOutcome};
pub use protocol::{Frame, HostCommand, HostEvent, RunRequest, read_message, write_message};
pub use stream_server::StreamTaskServer;
