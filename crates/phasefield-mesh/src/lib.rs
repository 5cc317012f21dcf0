//! Mesh collaborator interface for phasefield simulations.
//!
//! This crate defines the [`Mesh`] trait through which the refinement
//! controller reads cell levels and samples, sets refinement flags, and
//! plans and executes layout changes, along with the [`ConstraintSet`]
//! trait for mesh-dependent constraints.
//!
//! # Reference implementation
//!
//! - [`IntervalMesh`]: 1D binary-tree interval mesh with two DoFs per cell
//! - [`BoundaryConstraints`]: Dirichlet values at the interval ends

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod constraints;
pub mod error;
pub mod interval;
pub mod mesh;

#[cfg(test)]
pub(crate) mod compliance;

pub use constraints::{BoundaryConstraints, BoundaryValues, ConstraintSet, Unconstrained};
pub use error::MeshError;
pub use interval::{IntervalChange, IntervalMesh, DOFS_PER_CELL};
pub use mesh::{CellPoints, CellSamples, LayoutChange, Mesh, RefinementFlag};
