//! Daemon runtime: socket server, one tracked task per push event, drain on
//! shutdown.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_push, request_status, request_stop, request_sync, send_request, DaemonRequest,
    DaemonResponse,
};
pub use runtime::{run, start_blocking, DaemonContext, InFlight, PassSummary};
