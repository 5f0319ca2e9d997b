//! marklive daemon: resource handlers, the coordinator and its shutdown
//! barrier, the HTTP/WebSocket surface and the control socket.

pub mod api;
pub mod coordinator;
mod error;
pub mod handlers;
pub mod http;
pub mod paths;
pub mod protocol;
mod runtime;

pub use api::{Api, StatusReport};
pub use coordinator::Coordinator;
pub use error::DaemonError;
pub use protocol::{
    request_add, request_get_id, request_remove, request_send, request_status, request_stop,
    send_request, DaemonRequest, DaemonResponse, Tracked,
};
pub use runtime::{run, run_with_config, start_blocking, StartOptions};
