//! Process layer
//!
//! - `command` - `CommandSpec`, what to run and where
//! - `launcher` - spawns into a new process group, merged output stream
//! - `output` - non-blocking drain of the merged stream
//! - `signal` - process-group signalling and exit-code helpers

pub mod command;
pub mod launcher;
pub mod output;
pub mod signal;

pub use command::CommandSpec;
pub use launcher::{launch, resolve_program, ProcessHandle};
pub use output::OutputStream;
pub use signal::{exit_code_of, group_exists, process_exists, signal_group};
