//! Supervisor errors
//!
//! Only launch failures, admission conflicts and unknown ids reach the
//! caller. A nonzero exit is data in the task snapshot, not an error.

use crate::task::TaskId;
use thiserror::Error;

pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

/// Why a command could not be launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartErrorKind {
    /// Program or working directory does not exist
    NotFound,
    /// Program exists but is not executable
    PermissionDenied,
    /// The OS refused to create the process
    SpawnFailed,
}

impl std::fmt::Display for StartErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StartErrorKind::NotFound => "not found",
            StartErrorKind::PermissionDenied => "permission denied",
            StartErrorKind::SpawnFailed => "spawn failed",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to start command ({kind}): {message}")]
    Start {
        kind: StartErrorKind,
        message: String,
    },

    #[error("A task is already running in category '{category}' ({active})")]
    Conflict { category: String, active: TaskId },

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task {0} is still running")]
    StillRunning(TaskId),

    #[error("No command configured for category '{0}'")]
    UnknownCategory(String),

    #[error("Command timed out after {0:.1}s")]
    Timeout(f64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    pub fn start(kind: StartErrorKind, message: impl Into<String>) -> Self {
        SupervisorError::Start {
            kind,
            message: message.into(),
        }
    }

    /// Map a spawn-time I/O error onto the launch taxonomy
    pub fn from_spawn(err: std::io::Error, program: &str) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => StartErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => StartErrorKind::PermissionDenied,
            _ => StartErrorKind::SpawnFailed,
        };
        Self::start(kind, format!("{}: {}", program, err))
    }

    pub fn start_kind(&self) -> Option<StartErrorKind> {
        match self {
            SupervisorError::Start { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Errors caused by the caller rather than the environment
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            SupervisorError::Conflict { .. }
                | SupervisorError::NotFound(_)
                | SupervisorError::StillRunning(_)
                | SupervisorError::UnknownCategory(_)
        )
    }
}
