//! CLI command handlers, one file per command.

mod add_video;
mod cancel;
mod completions;
mod delete;
mod enqueue;
mod recover;
mod retry;
mod status;
mod worker;

pub use add_video::run_add_video;
pub use cancel::run_cancel;
pub use completions::run_completions;
pub use delete::run_delete;
pub use enqueue::run_enqueue;
pub use recover::run_recover;
pub use retry::run_retry;
pub use status::run_status;
pub use worker::run_worker;
