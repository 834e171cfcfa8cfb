//! Task state machine
//!
//! ```text
//! Running ──exit 0──▶ Completed
//!    │ └──exit≠0──▶ Failed
//!    └──cancel────▶ Cancelled
//! ```

use serde::{Deserialize, Serialize};

/// Possible states of a supervised task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Process is alive (as of the last poll)
    Running,

    /// Process exited with code 0
    Completed,

    /// Process exited with a nonzero code
    Failed,

    /// Process was terminated on request
    Cancelled,
}

impl TaskState {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        !self.is_running()
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }

    /// Only Running may move, and only into a terminal state
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        self.is_running() && next.is_terminal()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TaskState::Running => "Running",
            TaskState::Completed => "Completed",
            TaskState::Failed => "Failed",
            TaskState::Cancelled => "Cancelled",
        }
    }

    /// Get a symbol for the state (for terminal output)
    pub fn symbol(&self) -> &'static str {
        match self {
            TaskState::Running => "⟳",
            TaskState::Completed => "✓",
            TaskState::Failed => "✗",
            TaskState::Cancelled => "⊘",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
    }

    #[test]
    fn test_transitions_are_monotonic() {
        assert!(TaskState::Running.can_transition_to(TaskState::Completed));
        assert!(TaskState::Running.can_transition_to(TaskState::Cancelled));
        assert!(!TaskState::Running.can_transition_to(TaskState::Running));
        assert!(!TaskState::Completed.can_transition_to(TaskState::Cancelled));
        assert!(!TaskState::Cancelled.can_transition_to(TaskState::Failed));
    }

    #[test]
    fn test_serialized_names() {
        let json = serde_json::to_string(&TaskState::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }
}
