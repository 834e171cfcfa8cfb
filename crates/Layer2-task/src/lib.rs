//! # overseer-task
//!
//! Background task supervisor for Overseer.
//! Launches long-running external jobs, accumulates their output while they
//! run, and cancels them safely.
//!
//! ## Features
//!
//! - One running job per category, admission atomic with registration
//! - Own process group per job, merged stdout/stderr in emission order
//! - Non-blocking output draining driven by the caller's polls
//! - **SIGTERM -> grace period -> SIGKILL cancellation**
//! - One-shot commands with a deadline for work with no lifecycle
//!
//! State is in memory only; jobs do not survive a restart of the host.

pub mod error;
pub mod oneshot;
pub mod process;
pub mod registry;
pub mod state;
pub mod supervisor;
pub mod task;

pub use error::{StartErrorKind, SupervisorError, SupervisorResult};
pub use oneshot::{run_oneshot, OneShotOutput};
pub use process::{process_exists, CommandSpec, OutputStream, ProcessHandle};
pub use registry::{TaskEntry, TaskRegistry};
pub use state::TaskState;
pub use supervisor::Supervisor;
pub use task::{Task, TaskId, TaskSnapshot};
