//! Background runtime: document watcher + cycle processor + socket server.

mod error;
pub mod log_rotation;
pub mod logging;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_apply, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking, CycleSummary, DaemonStats};
