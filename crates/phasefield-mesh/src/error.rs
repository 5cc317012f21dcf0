//! Error types for mesh operations.

use phasefield_core::{CellId, MeshGeneration};
use std::fmt;

/// Errors arising from mesh construction, queries, or layout changes.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshError {
    /// The domain or coarse cell count is invalid.
    InvalidDomain {
        /// What went wrong.
        reason: String,
    },
    /// A cell handle does not exist in the cell store.
    UnknownCell {
        /// The offending handle.
        cell: CellId,
    },
    /// A cell handle refers to a cell that is not part of the current layout.
    InactiveCell {
        /// The offending handle.
        cell: CellId,
    },
    /// Data or a planned change refers to a layout that no longer exists.
    StaleGeneration {
        /// The current layout.
        expected: MeshGeneration,
        /// The layout the data was built for.
        found: MeshGeneration,
    },
    /// Executing the change would exceed the cell store's capacity.
    CapacityExceeded {
        /// Cells the new layout needs.
        requested: usize,
        /// Cells the store can hold.
        capacity: usize,
    },
    /// Constraints were applied before they were built for any layout.
    ConstraintsNotBuilt,
    /// A vector's length does not match the layout it claims to belong to.
    LayoutMismatch {
        /// Length the layout implies.
        expected: usize,
        /// Length found.
        actual: usize,
    },
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDomain { reason } => write!(f, "invalid domain: {reason}"),
            Self::UnknownCell { cell } => write!(f, "cell {cell} does not exist"),
            Self::InactiveCell { cell } => {
                write!(f, "cell {cell} is not part of the current layout")
            }
            Self::StaleGeneration { expected, found } => write!(
                f,
                "data belongs to mesh generation {found}, current generation is {expected}"
            ),
            Self::CapacityExceeded {
                requested,
                capacity,
            } => write!(
                f,
                "refinement needs {requested} cells, store capacity is {capacity}"
            ),
            Self::ConstraintsNotBuilt => write!(f, "constraints have not been built"),
            Self::LayoutMismatch { expected, actual } => write!(
                f,
                "vector has {actual} entries, layout requires {expected}"
            ),
        }
    }
}

impl std::error::Error for MeshError {}
