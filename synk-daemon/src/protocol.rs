use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use synk_core::{Task, TaskId};

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// JSON newline-delimited request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<NaiveDateTime>,
    #[serde(default)]
    pub repeat: bool,
    #[serde(default)]
    pub save: bool,
}

impl DaemonRequest {
    fn command(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            ..Self::default()
        }
    }

    /// Both paths, or a protocol error naming the command.
    pub fn paths(&self) -> Result<(PathBuf, PathBuf), DaemonError> {
        match (&self.source, &self.destination) {
            (Some(source), Some(destination)) => Ok((source.clone(), destination.clone())),
            _ => Err(DaemonError::Protocol(format!(
                "'{}' needs both source and destination",
                self.cmd
            ))),
        }
    }

    pub fn task_id(&self) -> Result<TaskId, DaemonError> {
        self.id
            .clone()
            .ok_or_else(|| DaemonError::Protocol(format!("'{}' needs a task id", self.cmd)))
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(
    data_dir: &Path,
    request: &DaemonRequest,
) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(data_dir);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    Ok(serde_json::from_str(line.trim_end())?)
}

/// Status payload; retries for half a second while the daemon binds.
pub fn request_status(data_dir: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::command("status");

    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(data_dir, &request) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_stop(data_dir: &Path) -> Result<(), DaemonError> {
    let response = send_request(data_dir, &DaemonRequest::command("stop"))?;
    response_into_data(response).map(|_| ())
}

/// Start an immediate sync; `save` also stores the pair as a template.
pub fn request_run(
    data_dir: &Path,
    source: &Path,
    destination: &Path,
    save: bool,
) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        source: Some(source.to_path_buf()),
        destination: Some(destination.to_path_buf()),
        save,
        ..DaemonRequest::command("run")
    };
    response_into_data(send_request(data_dir, &request)?)
}

/// Schedule a one-time or daily sync; returns the stored task.
pub fn request_schedule(
    data_dir: &Path,
    source: &Path,
    destination: &Path,
    at: NaiveDateTime,
    repeat: bool,
    save: bool,
) -> Result<Task, DaemonError> {
    let request = DaemonRequest {
        source: Some(source.to_path_buf()),
        destination: Some(destination.to_path_buf()),
        at: Some(at),
        repeat,
        save,
        ..DaemonRequest::command("schedule")
    };
    let data = response_into_data(send_request(data_dir, &request)?)?;
    Ok(serde_json::from_value(data)?)
}

pub fn request_run_saved(data_dir: &Path, id: &TaskId) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        id: Some(id.clone()),
        ..DaemonRequest::command("run_saved")
    };
    response_into_data(send_request(data_dir, &request)?)
}

pub fn request_list(data_dir: &Path) -> Result<Vec<Task>, DaemonError> {
    let data = response_into_data(send_request(data_dir, &DaemonRequest::command("list"))?)?;
    Ok(serde_json::from_value(data)?)
}

/// Returns whether a record was removed.
pub fn request_remove(data_dir: &Path, id: &TaskId) -> Result<bool, DaemonError> {
    let request = DaemonRequest {
        id: Some(id.clone()),
        ..DaemonRequest::command("remove")
    };
    let data = response_into_data(send_request(data_dir, &request)?)?;
    Ok(data
        .get("removed")
        .and_then(Value::as_bool)
        .unwrap_or(false))
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}
