//! Saga state machine states.

use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► Running ──┬──► Completed
///                       └──► Failed ──► Compensating ──┬──► Compensated
///                                                      └──► FatalError
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Saga has been persisted but no step has run yet.
    #[default]
    Created,

    /// Saga steps are being executed.
    Running,

    /// All steps completed successfully (terminal state).
    Completed,

    /// A step failed permanently; compensation has not started yet.
    Failed,

    /// Compensating transactions are in progress.
    Compensating,

    /// Every executed step was compensated (terminal state).
    Compensated,

    /// At least one compensation failed permanently; operator intervention
    /// is required (terminal state).
    FatalError,
}

impl SagaState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Completed | SagaState::Compensated | SagaState::FatalError
        )
    }

    /// Returns true for states on the forward path (no failure observed yet).
    pub fn is_forward(&self) -> bool {
        matches!(self, SagaState::Created | SagaState::Running)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Created => "Created",
            SagaState::Running => "Running",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
            SagaState::Compensating => "Compensating",
            SagaState::Compensated => "Compensated",
            SagaState::FatalError => "FatalError",
        }
    }

    /// Parses a stored state name. Returns None for unrecognized values;
    /// repositories rehydrate those as `Failed` so compensation can still
    /// be attempted.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Created" => Some(SagaState::Created),
            "Running" => Some(SagaState::Running),
            "Completed" => Some(SagaState::Completed),
            "Failed" => Some(SagaState::Failed),
            "Compensating" => Some(SagaState::Compensating),
            "Compensated" => Some(SagaState::Compensated),
            "FatalError" => Some(SagaState::FatalError),
            _ => None,
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
