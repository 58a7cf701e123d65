use crate::UpdateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a single container update invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStep {
    Pulling,
    Stopping,
    Removing,
    Recreating,
    Starting,
    Done,
    Failed,
}

impl UpdateStep {
    pub fn is_terminal(self) -> bool {
        matches!(self, UpdateStep::Done | UpdateStep::Failed)
    }

    /// Text of the spinner line shown while the step runs.
    pub(crate) fn action_label(self) -> &'static str {
        match self {
            UpdateStep::Pulling => "Pulling image",
            UpdateStep::Stopping => "Stopping container",
            UpdateStep::Removing => "Removing container",
            UpdateStep::Recreating => "Creating container",
            UpdateStep::Starting => "Starting container",
            UpdateStep::Done => "Updated",
            UpdateStep::Failed => "Failed",
        }
    }

    /// Short verb used in the terminal error line, e.g. `Error stop: ...`.
    pub(crate) fn error_verb(self) -> &'static str {
        match self {
            UpdateStep::Pulling => "pull image",
            UpdateStep::Stopping => "stop",
            UpdateStep::Removing => "remove",
            UpdateStep::Recreating => "create",
            UpdateStep::Starting => "start",
            UpdateStep::Done | UpdateStep::Failed => "update",
        }
    }
}

impl fmt::Display for UpdateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateStep::Pulling => "pulling",
            UpdateStep::Stopping => "stopping",
            UpdateStep::Removing => "removing",
            UpdateStep::Recreating => "recreating",
            UpdateStep::Starting => "starting",
            UpdateStep::Done => "done",
            UpdateStep::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub fn validate_transition(from: UpdateStep, to: UpdateStep) -> Result<(), UpdateError> {
    let valid = matches!(
        (from, to),
        (UpdateStep::Pulling, UpdateStep::Stopping)
            | (UpdateStep::Stopping, UpdateStep::Removing)
            | (UpdateStep::Removing, UpdateStep::Recreating)
            | (UpdateStep::Recreating, UpdateStep::Starting)
            | (UpdateStep::Starting, UpdateStep::Done)
    ) || (!from.is_terminal() && to == UpdateStep::Failed);

    if valid {
        Ok(())
    } else {
        Err(UpdateError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(UpdateStep::Pulling, UpdateStep::Stopping).is_ok());
        assert!(validate_transition(UpdateStep::Stopping, UpdateStep::Removing).is_ok());
        assert!(validate_transition(UpdateStep::Removing, UpdateStep::Recreating).is_ok());
        assert!(validate_transition(UpdateStep::Recreating, UpdateStep::Starting).is_ok());
        assert!(validate_transition(UpdateStep::Starting, UpdateStep::Done).is_ok());
        assert!(validate_transition(UpdateStep::Pulling, UpdateStep::Failed).is_ok());
        assert!(validate_transition(UpdateStep::Starting, UpdateStep::Failed).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(UpdateStep::Pulling, UpdateStep::Removing).is_err());
        assert!(validate_transition(UpdateStep::Stopping, UpdateStep::Pulling).is_err());
        assert!(validate_transition(UpdateStep::Done, UpdateStep::Failed).is_err());
        assert!(validate_transition(UpdateStep::Failed, UpdateStep::Pulling).is_err());
        assert!(validate_transition(UpdateStep::Done, UpdateStep::Done).is_err());
    }

    #[test]
    fn invalid_transition_error_names_both_states() {
        let err = validate_transition(UpdateStep::Removing, UpdateStep::Done).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid update transition: removing -> done"
        );
    }
}
