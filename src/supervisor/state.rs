//! Project lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a preview project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl ProjectState {
    /// Whether the machine permits moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ProjectState::{Error, Running, Starting, Stopped, Stopping};

        matches!(
            (self, next),
            (Stopped | Error, Starting)
                | (Starting, Running | Error)
                | (Running, Stopping | Error | Stopped)
                | (Stopping, Stopped)
        )
    }

    /// Resting states are left only by an explicit start.
    #[must_use]
    pub fn is_resting(self) -> bool {
        matches!(self, Self::Stopped | Self::Error)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ProjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: ProjectState,
    pub to: ProjectState,
}

/// State holder that only applies legal transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectStateMachine {
    state: ProjectState,
}

impl ProjectStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> ProjectState {
        self.state
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` and leaves the state unchanged if the
    /// machine does not allow the move.
    pub fn transition(&mut self, next: ProjectState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = %self.state, to = %next, "Rejected state transition");
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(from = %self.state, to = %next, "State transition");
        self.state = next;
        Ok(())
    }
}
