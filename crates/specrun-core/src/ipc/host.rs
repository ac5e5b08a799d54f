//! IDE-side handle to a `specrun-host` process.
//!
//! Assemblies are loaded in the host, never in the IDE process, so a
//! crashing or misbehaving assembly only takes the host down.

use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::task::TaskResult;

use super::protocol::{HostCommand, HostEvent, RunRequest, read_message, write_message};

/// Environment variable overriding the host binary location.
pub const HOST_PATH_ENV: &str = "SPECRUN_HOST_PATH";

fn host_binary_name() -> &'static str {
    if cfg!(windows) {
        "specrun-host.exe"
    } else {
        "specrun-host"
    }
}

/// Outcome of one run on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: String,
    pub result: TaskResult,
}

/// Handle to a host process.
pub struct HostHandle {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    killed: bool,
}

impl HostHandle {
    /// Spawn `specrun-host serve` and check it answers a ping.
    pub fn spawn() -> Result<Self> {
        let host_path = Self::find_host_binary()?;
        Self::spawn_at(host_path)
    }

    /// Spawn the host binary at `host_path`.
    pub fn spawn_at(host_path: PathBuf) -> Result<Self> {
        let mut child = Command::new(&host_path)
            .arg("serve")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                Error::Ipc(format!(
                    "Failed to spawn host process '{}': {}",
                    host_path.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get host stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get host stdout".to_string()))?;

        let mut handle = Self {
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            killed: false,
        };

        handle.send_command(&HostCommand::Ping)?;
        match handle.recv_event()? {
            HostEvent::Pong => Ok(handle),
            other => Err(Error::Ipc(format!(
                "Unexpected response from host: {:?}",
                other
            ))),
        }
    }

    /// Find the specrun-host binary.
    ///
    /// Looks in order at `SPECRUN_HOST_PATH`, the directory of the current
    /// executable, `PATH`, then `target/{debug,release}` of this workspace.
    pub fn find_host_binary() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(HOST_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
            tracing::warn!("{} points at missing file {}", HOST_PATH_ENV, path.display());
        }

        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(PathBuf::from))
        {
            let host_path = exe_dir.join(host_binary_name());
            if host_path.exists() {
                return Ok(host_path);
            }
        }

        if let Ok(path) = which::which(host_binary_name()) {
            return Ok(path);
        }

        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        for profile in ["debug", "release"] {
            let path = manifest_dir
                .join("..")
                .join("..")
                .join("target")
                .join(profile)
                .join(host_binary_name());
            if path.exists() {
                return Ok(path.canonicalize().unwrap_or(path));
            }
        }

        Err(Error::Ipc(format!(
            "Could not find specrun-host binary. Set {} or ensure it's in PATH.",
            HOST_PATH_ENV
        )))
    }

    pub fn send_command(&mut self, cmd: &HostCommand) -> Result<()> {
        if self.killed {
            return Err(Error::Ipc("Host has been killed".to_string()));
        }
        write_message(&mut self.stdin, cmd)
    }

    pub fn recv_event(&mut self) -> Result<HostEvent> {
        if self.killed {
            return Err(Error::Ipc("Host has been killed".to_string()));
        }
        read_message(&mut self.stdout)
    }

    /// Run one request, passing every task event to `on_event`.
    ///
    /// Blocks until the host reports the run as completed.
    pub fn run(
        &mut self,
        request: &RunRequest,
        mut on_event: impl FnMut(&HostEvent),
    ) -> Result<RunOutcome> {
        self.send_command(&HostCommand::Run {
            request_json: request.to_json()?,
        })?;

        loop {
            match self.recv_event()? {
                HostEvent::RunCompleted { run_id, result } => {
                    return Ok(RunOutcome { run_id, result });
                }
                HostEvent::Error { message } => {
                    return Err(Error::Execution(format!("Host failed to run: {}", message)));
                }
                event @ (HostEvent::Pong | HostEvent::ShuttingDown) => {
                    return Err(Error::Ipc(format!(
                        "Unexpected event during run: {:?}",
                        event
                    )));
                }
                event => on_event(&event),
            }
        }
    }

    /// Kill the host process immediately.
    pub fn kill(&mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }
        self.killed = true;

        let _ = write_message(&mut self.stdin, &HostCommand::Shutdown);
        std::thread::sleep(Duration::from_millis(10));

        if let Err(e) = self.child.kill() {
            // Already exited
            if e.kind() != std::io::ErrorKind::InvalidInput {
                tracing::warn!("Failed to kill host: {}", e);
            }
        }
        let _ = self.child.wait();

        Ok(())
    }

    pub fn is_alive(&mut self) -> bool {
        if self.killed {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Ask the host to exit and wait for it.
    pub fn shutdown(mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }

        self.send_command(&HostCommand::Shutdown)?;
        match self.recv_event() {
            Ok(HostEvent::ShuttingDown) => {}
            Ok(other) => tracing::debug!("Ignoring {:?} during shutdown", other),
            Err(e) => tracing::debug!("Host closed before acknowledging shutdown: {}", e),
        }

        let status = self
            .child
            .wait()
            .map_err(|e| Error::Ipc(format!("Failed to wait for host: {}", e)))?;
        self.killed = true;

        if status.success() {
            Ok(())
        } else {
            Err(Error::Ipc(format!("Host exited with status: {}", status)))
        }
    }
}

impl Drop for HostHandle {
    fn drop(&mut self) {
        let _ = self.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{RemoteTask, TaskNode};

    #[test]
    fn test_missing_binary_is_reported() {
        let err = HostHandle::spawn_at(PathBuf::from("/nonexistent/specrun-host")).err();
        assert!(matches!(err, Some(Error::Ipc(_))));
    }

    // Needs the host binary: `cargo build -p specrun-host` first.
    #[test]
    #[ignore = "Requires specrun-host binary"]
    fn test_run_missing_assembly() {
        let mut host = HostHandle::spawn().unwrap();
        let request = RunRequest::new(TaskNode::new(RemoteTask::assembly(
            "asm",
            "/nonexistent/libspecs.so",
        )));

        let mut events = Vec::new();
        let outcome = host.run(&request, |event| events.push(event.clone())).unwrap();

        assert_eq!(outcome.result, TaskResult::Error);
        assert!(events.iter().any(|e| matches!(
            e,
            HostEvent::TaskError { message, .. } if message == "Could not load context assembly"
        )));
        host.shutdown().unwrap();
    }
}
