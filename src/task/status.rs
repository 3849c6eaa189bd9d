//! Task lifecycle status and its state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Lifecycle status of a simulation task.
///
/// # State Machine
///
/// ```text
/// Pending -> Running
/// Running -> Finished, Failed
/// Finished -> (terminal, no transitions)
/// Failed -> (terminal, no transitions)
/// ```
///
/// # Examples
///
/// ```
/// use cnc_sim::TaskStatus;
///
/// assert!(TaskStatus::Pending.can_transition_to(&TaskStatus::Running));
/// assert!(!TaskStatus::Pending.can_transition_to(&TaskStatus::Finished));
/// assert!(TaskStatus::Failed.is_terminal());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Submitted, waiting for a worker to pick it up.
    Pending,
    /// A worker is driving the controller.
    Running,
    /// The run completed and telemetry was persisted (terminal).
    Finished,
    /// The run failed, was cancelled, or timed out (terminal).
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl TaskStatus {
    /// Returns `true` for `Finished` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    /// Returns `true` if moving from this status to `next` is allowed.
    ///
    /// Transitions only move forward, one step at a time. Self-transitions
    /// are rejected.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running),
            Self::Running => matches!(next, Self::Finished | Self::Failed),
            Self::Finished | Self::Failed => false,
        }
    }

    /// Validates a transition, returning [`SimError::InvalidTransition`]
    /// when it is not allowed.
    pub fn validate_transition(&self, task_id: &str, next: &Self) -> Result<(), SimError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(SimError::InvalidTransition {
                task_id: task_id.to_string(),
                from: *self,
                to: *next,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Finished,
        TaskStatus::Failed,
    ];

    #[test]
    fn exactly_three_transitions_are_valid() {
        let valid: Vec<_> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(to))
            .collect();
        assert_eq!(
            valid,
            vec![
                (TaskStatus::Pending, TaskStatus::Running),
                (TaskStatus::Running, TaskStatus::Finished),
                (TaskStatus::Running, TaskStatus::Failed),
            ]
        );
    }

    #[test]
    fn terminal_states_reject_everything() {
        for to in ALL {
            assert!(TaskStatus::Finished.validate_transition("t", &to).is_err());
            assert!(TaskStatus::Failed.validate_transition("t", &to).is_err());
        }
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(TaskStatus::Finished).unwrap(),
            serde_json::json!("finished")
        );
        let parsed: TaskStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(parsed, TaskStatus::Pending);
    }

    #[test]
    fn rejection_carries_context() {
        let err = TaskStatus::Pending
            .validate_transition("abc", &TaskStatus::Finished)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid transition from pending to finished for task abc"
        );
    }
}
