//! Core types for the phasefield simulation framework.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! vocabulary shared by the dependency resolver, the mesh collaborator, and
//! the refinement engine: identifiers, field declarations, evaluation
//! flags, solution vectors, and the numeric error type.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod field;
pub mod flags;
pub mod id;
pub mod solution;

pub use error::NumericError;
pub use field::{
    validate_field_name, FieldKind, FieldRank, FieldRef, FieldSpec, FieldTable, FieldTableError,
    NameError, PdeType,
};
pub use flags::EvalFlags;
pub use id::{CellId, FieldId, MeshGeneration, Point, StepId};
pub use solution::{SolutionVector, SolutionVectorSet, VectorRole};
