use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use marklive_core::CommandError;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// JSON newline-delimited request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    /// `add`: file to track.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// `send`: memory key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// `send`: markdown content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// `remove` / `getid`: resource id, path or key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl DaemonRequest {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            ..Self::default()
        }
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
    /// Machine-readable error code (`bad_input`, `not_tracked`, `timeout`, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn rejected(err: &CommandError) -> Self {
        Self::error(err.to_string()).with_code(err.code())
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
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

    let response: DaemonResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new("status");

    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(home, &request) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

/// Privileged shutdown. Returns after the daemon's handlers drained.
pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    let response = send_request(home, &DaemonRequest::new("stop"))?;
    response_into_data(response).map(|_| ())
}

/// A resource the daemon now tracks, with the page that previews it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tracked {
    pub id: String,
    pub url: String,
}

/// Track `path`, which must already be canonical: the daemon resolves
/// relative paths against its own working directory.
pub fn request_add(home: &Path, path: &Path) -> Result<Tracked, DaemonError> {
    let request = DaemonRequest {
        path: Some(path.display().to_string()),
        ..DaemonRequest::new("add")
    };
    let data = response_into_data(send_request(home, &request)?)?;
    serde_json::from_value(data)
        .map_err(|err| DaemonError::Protocol(format!("unexpected add response: {err}")))
}

pub fn request_send(home: &Path, key: &str, data: String) -> Result<String, DaemonError> {
    let request = DaemonRequest {
        key: Some(key.to_string()),
        data: Some(data),
        ..DaemonRequest::new("send")
    };
    response_into_id(send_request(home, &request)?)
}

/// Untrack `id`. Returns `false` when the daemon was not tracking it.
pub fn request_remove(home: &Path, id: &str) -> Result<bool, DaemonError> {
    let request = DaemonRequest {
        id: Some(id.to_string()),
        ..DaemonRequest::new("remove")
    };
    let data = response_into_data(send_request(home, &request)?)?;
    data.get("removed")
        .and_then(Value::as_bool)
        .ok_or_else(|| DaemonError::Protocol("response is missing `removed`".to_string()))
}

pub fn request_get_id(home: &Path, raw: &str) -> Result<String, DaemonError> {
    let request = DaemonRequest {
        id: Some(raw.to_string()),
        ..DaemonRequest::new("getid")
    };
    response_into_id(send_request(home, &request)?)
}

fn response_into_id(response: DaemonResponse) -> Result<String, DaemonError> {
    let data = response_into_data(response)?;
    data.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DaemonError::Protocol("response is missing `id`".to_string()))
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        return Ok(response.data.unwrap_or(Value::Null));
    }
    let message = response
        .error
        .unwrap_or_else(|| "unknown daemon error".to_string());
    match response.code {
        Some(code) => Err(DaemonError::Rejected { code, message }),
        None => Err(DaemonError::Protocol(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_unset_fields() {
        let encoded = serde_json::to_string(&DaemonRequest::new("status")).unwrap();
        assert_eq!(encoded, r#"{"cmd":"status"}"#);
    }

    #[test]
    fn rejected_response_carries_code() {
        let response = DaemonResponse::rejected(&CommandError::not_tracked("m-1"));
        let err = response_into_data(response).unwrap_err();
        match err {
            DaemonError::Rejected { code, message } => {
                assert_eq!(code, "not_tracked");
                assert!(message.contains("m-1"));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn id_is_extracted_from_data() {
        let id = response_into_id(DaemonResponse::ok(json!({ "id": "m-abc" }))).unwrap();
        assert_eq!(id, "m-abc");
        assert!(response_into_id(DaemonResponse::ok(json!({}))).is_err());
    }

    #[test]
    fn missing_socket_means_not_running() {
        let home = tempfile::TempDir::new().unwrap();
        let err = send_request(home.path(), &DaemonRequest::new("status")).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }), "got: {err}");
    }
}
