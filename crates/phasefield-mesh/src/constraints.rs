//! Mesh-dependent constraints on solution vectors.

use indexmap::IndexMap;
use phasefield_core::{FieldId, MeshGeneration, SolutionVector};

use crate::error::MeshError;
use crate::interval::IntervalMesh;
use crate::mesh::Mesh;

/// Constraints that must hold on every solution vector, rebuilt whenever
/// the layout changes.
pub trait ConstraintSet<M: Mesh + ?Sized> {
    /// Recompute the constraints for the current layout of `mesh`.
    ///
    /// Runs after the new layout has replaced the old one. An error aborts
    /// the refinement event on every partition and the new layout stays.
    fn rebuild(&mut self, mesh: &M) -> Result<(), MeshError>;

    /// The layout the constraints were last built for.
    fn generation(&self) -> Option<MeshGeneration>;

    /// Overwrite the constrained entries of `vector`.
    ///
    /// Fails with [`MeshError::StaleGeneration`] if the constraints were
    /// built for another layout than the vector's.
    fn distribute(&self, vector: &mut SolutionVector) -> Result<(), MeshError>;
}

/// No constraints at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unconstrained;

impl<M: Mesh + ?Sized> ConstraintSet<M> for Unconstrained {
    fn rebuild(&mut self, _mesh: &M) -> Result<(), MeshError> {
        Ok(())
    }

    fn generation(&self) -> Option<MeshGeneration> {
        None
    }

    fn distribute(&self, _vector: &mut SolutionVector) -> Result<(), MeshError> {
        Ok(())
    }
}

/// Fixed values at the two domain ends of a 1D layout.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundaryValues {
    /// Value imposed on the first degree of freedom.
    pub left: Option<f64>,
    /// Value imposed on the last degree of freedom.
    pub right: Option<f64>,
}

/// Dirichlet values on the first and last degree of freedom of each
/// constrained field of an [`IntervalMesh`], applied to every component.
#[derive(Clone, Debug, Default)]
pub struct BoundaryConstraints {
    values: IndexMap<FieldId, BoundaryValues>,
    built: Option<(MeshGeneration, usize)>,
}

impl BoundaryConstraints {
    /// No constrained fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrain `field`.
    pub fn with(mut self, field: FieldId, values: BoundaryValues) -> Self {
        self.values.insert(field, values);
        self
    }

    /// The values imposed on `field`, if constrained.
    pub fn values(&self, field: FieldId) -> Option<BoundaryValues> {
        self.values.get(&field).copied()
    }
}

impl ConstraintSet<IntervalMesh> for BoundaryConstraints {
    fn rebuild(&mut self, mesh: &IntervalMesh) -> Result<(), MeshError> {
        self.built = Some((mesh.generation(), mesh.n_dofs()));
        Ok(())
    }

    fn generation(&self) -> Option<MeshGeneration> {
        self.built.map(|(g, _)| g)
    }

    fn distribute(&self, vector: &mut SolutionVector) -> Result<(), MeshError> {
        let Some(values) = self.values.get(&vector.field()).copied() else {
            return Ok(());
        };
        let Some((generation, dofs)) = self.built else {
            return Err(MeshError::ConstraintsNotBuilt);
        };
        if vector.generation() != generation {
            return Err(MeshError::StaleGeneration {
                expected: vector.generation(),
                found: generation,
            });
        }
        let components = vector.components();
        let expected = dofs * components;
        if vector.data().len() != expected {
            return Err(MeshError::LayoutMismatch {
                expected,
                actual: vector.data().len(),
            });
        }
        if dofs == 0 {
            return Ok(());
        }
        let data = vector.data_mut();
        if let Some(left) = values.left {
            data[..components].fill(left);
        }
        if let Some(right) = values.right {
            data[expected - components..].fill(right);
        }
        Ok(())
    }
}
