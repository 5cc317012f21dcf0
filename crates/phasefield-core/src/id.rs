//! Strongly-typed identifiers and the [`Point`] type alias.

use smallvec::SmallVec;
use std::fmt;

/// Identifies a declared field.
///
/// `FieldId(n)` is the n-th field in declaration order. Solution fields and
/// postprocessing fields are numbered independently, each starting at zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

impl FieldId {
    /// The id as a `usize` index into per-field tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for FieldId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Handle of a cell inside a mesh's cell store.
///
/// Cells are owned by the mesh; consumers only ever hold these handles.
/// A handle is meaningful only for the [`MeshGeneration`] it was obtained in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub u32);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CellId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Monotonically increasing time-step counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub u64);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StepId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Tracks the mesh layout a piece of data belongs to.
///
/// Incremented by the mesh every time a refinement is executed, enabling
/// O(1) detection of vectors, cell handles, and transfer tokens that refer
/// to a layout which no longer exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshGeneration(pub u64);

impl MeshGeneration {
    /// The generation that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for MeshGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MeshGeneration {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// A point in physical space.
///
/// Uses `SmallVec<[f64; 3]>` so points of up to three dimensions never
/// touch the heap.
pub type Point = SmallVec<[f64; 3]>;
