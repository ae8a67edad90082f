use std::io;

use thiserror::Error;

use crate::config::ConfigError;

/// Every failure in this crate is a correctness bug or a bad invocation.
/// Nothing here is transient, so nothing is retried.
#[derive(Error, Debug)]
pub enum BakeryError {
    #[error("found concurrent access with {window:?} (last updated by {last_updated_by:?})")]
    InvariantViolation {
        window: Vec<usize>,
        last_updated_by: Option<usize>,
    },

    #[error("ticket state needs at least one participant")]
    EmptyParticipantSet,

    #[error("participant {id} belongs to a different lock")]
    ForeignParticipant { id: usize },

    #[error("participant {id} cannot take a ticket above {max}")]
    TicketOverflow { id: usize, max: u64 },

    #[error("worker {id} panicked before acknowledging shutdown")]
    WorkerPanicked { id: usize },

    #[error("failed to spawn worker {id}: {source}")]
    Spawn {
        id: usize,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BakeryError {
    pub fn invariant_violation(window: &[usize], last_updated_by: Option<usize>) -> Self {
        Self::InvariantViolation {
            window: window.to_vec(),
            last_updated_by,
        }
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        if self.is_invariant_violation() {
            2
        } else {
            1
        }
    }
}

pub type Result<T> = std::result::Result<T, BakeryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_violation_names_snapshot() {
        let err = BakeryError::invariant_violation(&[3, 1], Some(1));
        let msg = err.to_string();
        assert!(msg.contains("[3, 1]"));
        assert!(msg.contains("Some(1)"));
        assert!(err.is_invariant_violation());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_precondition_errors_exit_with_one() {
        let err = BakeryError::ForeignParticipant { id: 7 };
        assert_eq!(err.to_string(), "participant 7 belongs to a different lock");
        assert!(!err.is_invariant_violation());
        assert_eq!(err.exit_code(), 1);
        assert_eq!(BakeryError::EmptyParticipantSet.exit_code(), 1);
    }

    #[test]
    fn test_config_error_converts() {
        let err: BakeryError = ConfigError::UnknownFlag("bogus".into()).into();
        assert!(matches!(err, BakeryError::Config(_)));
        assert_eq!(err.to_string(), "unknown flag: -bogus");
    }
}
