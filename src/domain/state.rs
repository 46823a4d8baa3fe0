use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionState {
    /// Structural checks passed
    Accepted,
    /// Safety gates passed, no funds moved yet
    Validated,
    /// Input pulled, per-source fills in progress
    Filling,
    /// Aggregate check passed and all movements committed
    Settled,
    /// Every movement of this trade unwound
    Reverted,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Accepted => "ACCEPTED",
            ExecutionState::Validated => "VALIDATED",
            ExecutionState::Filling => "FILLING",
            ExecutionState::Settled => "SETTLED",
            ExecutionState::Reverted => "REVERTED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: ExecutionState) -> bool {
        use ExecutionState::*;

        match (self, target) {
            (Accepted, Validated) => true,
            (Accepted, Reverted) => true,

            (Validated, Filling) => true,
            (Validated, Reverted) => true,

            // Once filling starts the trade always ends in one of these
            (Filling, Settled) => true,
            (Filling, Reverted) => true,

            _ => false,
        }
    }

    /// Get valid next states from current state
    pub fn valid_transitions(&self) -> Vec<ExecutionState> {
        use ExecutionState::*;

        match self {
            Accepted => vec![Validated, Reverted],
            Validated => vec![Filling, Reverted],
            Filling => vec![Settled, Reverted],
            Settled | Reverted => vec![],
        }
    }

    /// Has any balance been touched in this state?
    pub fn has_moved_funds(&self) -> bool {
        matches!(self, ExecutionState::Filling | ExecutionState::Settled)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Settled | ExecutionState::Reverted)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ExecutionState {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "ACCEPTED" => Ok(ExecutionState::Accepted),
            "VALIDATED" => Ok(ExecutionState::Validated),
            "FILLING" => Ok(ExecutionState::Filling),
            "SETTLED" => Ok(ExecutionState::Settled),
            "REVERTED" => Ok(ExecutionState::Reverted),
            _ => Err(format!("Unknown execution state: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        use ExecutionState::*;

        assert!(Accepted.can_transition_to(Validated));
        assert!(Validated.can_transition_to(Filling));
        assert!(Filling.can_transition_to(Settled));
        assert!(Filling.can_transition_to(Reverted));

        assert!(!Accepted.can_transition_to(Filling));
        assert!(!Settled.can_transition_to(Reverted));
        assert!(!Reverted.can_transition_to(Accepted));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for state in [ExecutionState::Settled, ExecutionState::Reverted] {
            assert!(state.is_terminal());
            assert!(state.valid_transitions().is_empty());
        }
    }

    #[test]
    fn test_round_trip_names() {
        for state in [
            ExecutionState::Accepted,
            ExecutionState::Validated,
            ExecutionState::Filling,
            ExecutionState::Settled,
            ExecutionState::Reverted,
        ] {
            assert_eq!(ExecutionState::try_from(state.as_str()), Ok(state));
        }
        assert!(ExecutionState::try_from("bogus").is_err());
    }
}
