//! CLI command handlers.

mod forget;
mod status;
mod sync;

pub use forget::run_forget_command;
pub use status::run_status_command;
pub use sync::run_sync_command;
