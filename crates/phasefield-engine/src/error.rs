//! Runtime error types for refinement and partition agreement.

use std::error::Error;
use std::fmt;

use phasefield_core::{FieldId, MeshGeneration, NumericError};
use phasefield_mesh::MeshError;

// ── CollectiveError ────────────────────────────────────────────────

/// Failure of the partition group itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectiveError {
    /// A peer partition hung up before the collective completed.
    Disconnected {
        /// Rank of the peer.
        peer: usize,
    },
    /// Peers contributed to different collectives.
    OutOfStep {
        /// Rank of the peer.
        peer: usize,
    },
}

impl fmt::Display for CollectiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected { peer } => write!(f, "partition {peer} disconnected"),
            Self::OutOfStep { peer } => {
                write!(f, "partition {peer} contributed to a different collective")
            }
        }
    }
}

impl Error for CollectiveError {}

// ── RefinementStage ────────────────────────────────────────────────

/// Where in a refinement event a mesh operation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefinementStage {
    /// Reading levels or samples while classifying cells.
    Marking,
    /// Applying flags and building the new layout.
    Planning,
    /// Capturing or prolonging solution vectors.
    Transfer,
    /// Swapping the mesh to the new layout.
    Execute,
    /// Rebuilding or applying constraints on the new layout.
    Constraints,
}

impl fmt::Display for RefinementStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Marking => "marking",
            Self::Planning => "planning",
            Self::Transfer => "transfer",
            Self::Execute => "execute",
            Self::Constraints => "constraints",
        })
    }
}

// ── RefinementError ────────────────────────────────────────────────

/// Errors from a refinement event. All of them are fatal for the run.
#[derive(Clone, Debug, PartialEq)]
pub enum RefinementError {
    /// An earlier refinement event failed; the controller accepts no
    /// further events.
    Aborted,
    /// The mesh collaborator failed.
    Mesh {
        /// Stage that failed.
        stage: RefinementStage,
        /// Underlying mesh error.
        source: MeshError,
    },
    /// A sampled or re-initialised value was unusable.
    Numeric(NumericError),
    /// Another partition failed; this partition's state is unchanged.
    PartitionFailed {
        /// Rank that observed the failure.
        rank: usize,
    },
    /// The partition group broke down.
    Collective(CollectiveError),
    /// A transfer token was committed against another layout than the one
    /// it captured.
    StaleToken {
        /// Layout the token captured.
        captured: MeshGeneration,
        /// Layout the change starts from.
        found: MeshGeneration,
    },
    /// A field sampled for marking has no current solution vector.
    MissingVector {
        /// The field.
        field: FieldId,
    },
    /// The live vectors do not all belong to the mesh's current layout.
    VectorsOutOfSync {
        /// The mesh's current layout.
        mesh: MeshGeneration,
    },
}

impl RefinementError {
    pub(crate) fn mesh(stage: RefinementStage) -> impl FnOnce(MeshError) -> Self {
        move |source| Self::Mesh { stage, source }
    }
}

impl fmt::Display for RefinementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted => write!(f, "refinement aborted by an earlier failure"),
            Self::Mesh { stage, source } => write!(f, "mesh failed during {stage}: {source}"),
            Self::Numeric(e) => write!(f, "numeric: {e}"),
            Self::PartitionFailed { rank } => {
                write!(f, "refinement failed on another partition (seen by rank {rank})")
            }
            Self::Collective(e) => write!(f, "collective: {e}"),
            Self::StaleToken { captured, found } => write!(
                f,
                "transfer token captured generation {captured}, change starts from {found}"
            ),
            Self::MissingVector { field } => {
                write!(f, "field {field} has no current solution vector")
            }
            Self::VectorsOutOfSync { mesh } => {
                write!(f, "solution vectors do not all belong to generation {mesh}")
            }
        }
    }
}

impl Error for RefinementError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Mesh { source, .. } => Some(source),
            Self::Numeric(e) => Some(e),
            Self::Collective(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NumericError> for RefinementError {
    fn from(e: NumericError) -> Self {
        Self::Numeric(e)
    }
}

impl From<CollectiveError> for RefinementError {
    fn from(e: CollectiveError) -> Self {
        Self::Collective(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasefield_core::CellId;

    #[test]
    fn mesh_failure_names_stage_and_chains() {
        let e = RefinementError::mesh(RefinementStage::Planning)(MeshError::CapacityExceeded {
            requested: 10,
            capacity: 8,
        });
        assert_eq!(
            e.to_string(),
            "mesh failed during planning: refinement needs 10 cells, store capacity is 8"
        );
        assert!(e.source().is_some());
    }

    #[test]
    fn numeric_converts() {
        let e: RefinementError = NumericError::NonFinite {
            field: FieldId(1),
            cell: Some(CellId(3)),
            value: f64::NAN,
        }
        .into();
        assert!(matches!(e, RefinementError::Numeric(_)));
        assert!(e.to_string().contains("cell 3"));
    }

    #[test]
    fn aborted_has_no_source() {
        assert!(RefinementError::Aborted.source().is_none());
    }
}
