//! Numeric error type shared by the evaluation and refinement paths.

use std::error::Error;
use std::fmt;

use crate::flags::EvalFlags;
use crate::id::{CellId, FieldId};

/// Errors raised while sampling or evaluating field data.
///
/// Produced by evaluation collaborators and by refinement marking.
/// Never silently clamped: a non-finite sample is only tolerated when the
/// caller configured that explicitly.
#[derive(Clone, Debug, PartialEq)]
pub enum NumericError {
    /// A sampled or evaluated value was NaN or infinite.
    NonFinite {
        /// The field holding the value.
        field: FieldId,
        /// The cell it was sampled in, if known.
        cell: Option<CellId>,
        /// The offending value.
        value: f64,
    },
    /// A model asked for data that the compiled plan did not request.
    MissingEvaluation {
        /// The field asked for.
        field: FieldId,
        /// The flags the model needed.
        requested: EvalFlags,
        /// The flags actually evaluated.
        available: EvalFlags,
    },
    /// The evaluation collaborator failed.
    EvaluationFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl fmt::Display for NumericError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinite { field, cell, value } => {
                write!(f, "non-finite value {value} in field {field}")?;
                if let Some(cell) = cell {
                    write!(f, " at cell {cell}")?;
                }
                Ok(())
            }
            Self::MissingEvaluation {
                field,
                requested,
                available,
            } => write!(
                f,
                "field {field} needs {requested} but only {available} was evaluated"
            ),
            Self::EvaluationFailed { reason } => write!(f, "evaluation failed: {reason}"),
        }
    }
}

impl Error for NumericError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_mentions_cell() {
        let e = NumericError::NonFinite {
            field: FieldId(1),
            cell: Some(CellId(7)),
            value: f64::INFINITY,
        };
        assert_eq!(e.to_string(), "non-finite value inf in field 1 at cell 7");
    }

    #[test]
    fn missing_evaluation_lists_flags() {
        let e = NumericError::MissingEvaluation {
            field: FieldId(0),
            requested: EvalFlags::GRADIENT,
            available: EvalFlags::VALUE,
        };
        assert_eq!(
            e.to_string(),
            "field 0 needs gradient but only value was evaluated"
        );
    }
}
