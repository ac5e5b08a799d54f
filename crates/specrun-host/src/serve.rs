//! `specrun-host serve`: answer IPC commands on stdin/stdout.

use std::io::{self, BufReader, BufWriter, Write};
use std::sync::{Arc, Mutex};

use specrun_core::ipc::{read_message, write_message};
use specrun_core::{
    HostCommand, HostEvent, RecursiveTaskRunner, RunRequest, StreamTaskServer, TaskResult,
};

/// Serve until `Shutdown` or until stdin closes.
pub fn execute() -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin.lock());
    let writer = Arc::new(Mutex::new(BufWriter::new(io::stdout())));

    serve(&mut reader, writer)
}

/// Command loop over any reader/writer pair.
pub fn serve<R, W>(reader: &mut R, writer: Arc<Mutex<W>>) -> anyhow::Result<()>
where
    R: io::Read,
    W: Write + Send + 'static,
{
    let events = StreamTaskServer::new(writer.clone());

    loop {
        let command: HostCommand = match read_message(reader) {
            Ok(command) => command,
            Err(e) => {
                // The IDE closing the pipe is the usual way out
                tracing::debug!("Stopping: {}", e);
                return Ok(());
            }
        };

        match command {
            HostCommand::Ping => events.send(&HostEvent::Pong),

            HostCommand::Run { request_json } => {
                let event = match run_request(&request_json, writer.clone()) {
                    Ok(result) => HostEvent::RunCompleted {
                        run_id: uuid::Uuid::new_v4().to_string(),
                        result,
                    },
                    Err(e) => {
                        tracing::error!("Run failed: {}", e);
                        HostEvent::Error {
                            message: e.with_hint(),
                        }
                    }
                };
                events.send(&event);
            }

            HostCommand::Shutdown => {
                let mut writer = match writer.lock() {
                    Ok(writer) => writer,
                    Err(poisoned) => poisoned.into_inner(),
                };
                write_message(&mut *writer, &HostEvent::ShuttingDown)?;
                return Ok(());
            }
        }
    }
}

fn run_request<W>(request_json: &[u8], writer: Arc<Mutex<W>>) -> specrun_core::Result<TaskResult>
where
    W: Write + Send + 'static,
{
    let request = RunRequest::from_json(request_json)?;
    let server = Arc::new(StreamTaskServer::new(writer));
    let mut runner = RecursiveTaskRunner::new(server).with_options(request.options);
    runner.run_to_completion(&request.tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use specrun_core::{RemoteTask, TaskNode};
    use std::io::Cursor;

    fn commands(commands: &[HostCommand]) -> Cursor<Vec<u8>> {
        let mut buf = Vec::new();
        for command in commands {
            write_message(&mut buf, command).unwrap();
        }
        Cursor::new(buf)
    }

    fn events(writer: &Arc<Mutex<Vec<u8>>>) -> Vec<HostEvent> {
        let mut cursor = Cursor::new(writer.lock().unwrap().clone());
        let mut events = Vec::new();
        while let Ok(event) = read_message::<_, HostEvent>(&mut cursor) {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_ping_and_shutdown() {
        let writer = Arc::new(Mutex::new(Vec::new()));
        let mut reader = commands(&[HostCommand::Ping, HostCommand::Shutdown, HostCommand::Ping]);

        serve(&mut reader, writer.clone()).unwrap();

        assert_eq!(events(&writer), vec![HostEvent::Pong, HostEvent::ShuttingDown]);
    }

    #[test]
    fn test_run_with_missing_assembly() {
        let request = RunRequest::new(TaskNode::new(RemoteTask::assembly(
            "asm",
            "/nonexistent/libspecs.so",
        )));
        let writer = Arc::new(Mutex::new(Vec::new()));
        let mut reader = commands(&[HostCommand::Run {
            request_json: request.to_json().unwrap(),
        }]);

        serve(&mut reader, writer.clone()).unwrap();

        let events = events(&writer);
        assert!(matches!(
            &events[0],
            HostEvent::TaskExplain { task_id, explanation }
                if task_id == "asm" && explanation.ends_with("File does not exist")
        ));
        assert!(matches!(
            events.last(),
            Some(HostEvent::RunCompleted { result: TaskResult::Error, .. })
        ));
    }

    #[test]
    fn test_malformed_request_is_an_error_event() {
        let writer = Arc::new(Mutex::new(Vec::new()));
        let mut reader = commands(&[HostCommand::Run {
            request_json: b"not json".to_vec(),
        }]);

        serve(&mut reader, writer.clone()).unwrap();

        assert!(matches!(
            events(&writer).as_slice(),
            [HostEvent::Error { message }] if message.contains("Invalid run request")
        ));
    }
}
