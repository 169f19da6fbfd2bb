//! Errors raised when recorded history contradicts a new run.
//!
//! Every variant means data generation (or the test itself) is not a pure
//! function of the draws made so far. Once that happens nothing the tree
//! predicts can be trusted, so callers should abort the run rather than retry.

use thiserror::Error;

use crate::data::Conclusion;

/// Type alias for results of recording into the tree
pub type TreeResult<T> = Result<T, FlakyError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlakyError {
    #[error(
        "Inconsistent data generation! Draw {draw} asked for {actual} bits but an earlier \
         run asked for {expected} bits at the same point. Is your data generation depending \
         on external state?"
    )]
    BitWidthMismatch { draw: usize, expected: u32, actual: u32 },

    #[error(
        "Inconsistent data generation! The test finished after {draws} draws but an earlier \
         run with the same draws kept going. Is your data generation depending on external \
         state?"
    )]
    EndedEarly { draws: usize },

    #[error(
        "Inconsistent data generation! Draw {draw} was made after an earlier run with the \
         same draws had already finished as {previous}. Is your data generation depending \
         on external state?"
    )]
    DrewPastConclusion { draw: usize, previous: Conclusion },

    #[error("Inconsistent test results! Test case was {previous} on first run but {current} on second")]
    InconsistentConclusion {
        previous: Conclusion,
        current: Conclusion,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Status;

    #[test]
    fn test_inconsistent_conclusion_names_both_outcomes() {
        let err = FlakyError::InconsistentConclusion {
            previous: Conclusion::new(Status::Interesting, Some("bug1".to_string())),
            current: Status::Invalid.into(),
        };
        let message = err.to_string();
        assert!(message.contains("Interesting(bug1)"));
        assert!(message.contains("Invalid"));
    }

    #[test]
    fn test_bit_width_mismatch_reports_widths() {
        let err = FlakyError::BitWidthMismatch {
            draw: 2,
            expected: 8,
            actual: 16,
        };
        let message = err.to_string();
        assert!(message.contains("16 bits"));
        assert!(message.contains("8 bits"));
    }
}
