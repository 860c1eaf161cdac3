//! synk daemon: task scheduler, task manager and the collaborator socket.

pub mod active;
mod error;
pub mod log_rotation;
pub mod manager;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod scheduler;

pub use error::DaemonError;
pub use manager::{RunRecord, SavedRun, ScheduleRequest, SyncRun, TaskManager};
pub use protocol::{
    request_list, request_remove, request_run, request_run_saved, request_schedule,
    request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking};
