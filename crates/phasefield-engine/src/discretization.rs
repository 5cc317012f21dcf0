//! The mesh, its constraints, and the solution vectors living on it.

use phasefield_core::{FieldTable, SolutionVector, SolutionVectorSet, VectorRole};
use phasefield_mesh::{ConstraintSet, Mesh, MeshError};

use crate::error::{RefinementError, RefinementStage};

/// A mesh paired with the vectors laid out on it.
///
/// Only the refinement controller swaps the layout, and it replaces the
/// vectors and rebuilds the constraints in the same step, so the three
/// always agree on the layout.
#[derive(Debug)]
pub struct Discretization<M, K> {
    pub(crate) mesh: M,
    pub(crate) constraints: K,
    pub(crate) vectors: SolutionVectorSet,
}

impl<M: Mesh, K: ConstraintSet<M>> Discretization<M, K> {
    /// Pair `mesh` with existing vectors. Constraints are built for the
    /// current layout.
    pub fn new(mesh: M, mut constraints: K, vectors: SolutionVectorSet) -> Result<Self, MeshError> {
        for v in &vectors {
            if v.generation() != mesh.generation() {
                return Err(MeshError::StaleGeneration {
                    expected: mesh.generation(),
                    found: v.generation(),
                });
            }
            let expected = mesh.n_dofs() * v.components();
            if v.data().len() != expected {
                return Err(MeshError::LayoutMismatch {
                    expected,
                    actual: v.data().len(),
                });
            }
        }
        constraints.rebuild(&mesh)?;
        Ok(Self {
            mesh,
            constraints,
            vectors,
        })
    }

    /// Zero vectors for every solution field of `table`: one current
    /// vector per field, plus a previous vector for fields solved with an
    /// LHS.
    pub fn allocate(mesh: M, constraints: K, table: &FieldTable) -> Result<Self, MeshError> {
        let dofs = mesh.n_dofs();
        let generation = mesh.generation();
        let mut vectors = SolutionVectorSet::new();
        for spec in table.solution_fields() {
            let components = spec.rank.components();
            vectors.push(SolutionVector::zeros(
                spec.index,
                VectorRole::Current,
                components,
                generation,
                dofs,
            ));
            if spec.pde_type.has_lhs() {
                vectors.push(SolutionVector::zeros(
                    spec.index,
                    VectorRole::Previous,
                    components,
                    generation,
                    dofs,
                ));
            }
        }
        Self::new(mesh, constraints, vectors)
    }

    /// The mesh.
    pub fn mesh(&self) -> &M {
        &self.mesh
    }

    /// The constraints.
    pub fn constraints(&self) -> &K {
        &self.constraints
    }

    /// The live solution vectors.
    pub fn vectors(&self) -> &SolutionVectorSet {
        &self.vectors
    }

    /// Mutable access to the vector data. The set must stay on the
    /// current layout.
    pub fn vectors_mut(&mut self) -> &mut SolutionVectorSet {
        &mut self.vectors
    }

    /// Apply the constraints to every vector.
    pub fn distribute_constraints(&mut self) -> Result<(), RefinementError> {
        for v in self.vectors.iter_mut() {
            self.constraints
                .distribute(v)
                .map_err(RefinementError::mesh(RefinementStage::Constraints))?;
        }
        Ok(())
    }

    /// Split into parts.
    pub fn into_parts(self) -> (M, K, SolutionVectorSet) {
        (self.mesh, self.constraints, self.vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasefield_core::{FieldId, FieldRank, FieldSpec, MeshGeneration, PdeType};
    use phasefield_mesh::{BoundaryConstraints, BoundaryValues, IntervalMesh, Unconstrained};

    fn table() -> FieldTable {
        let mut n = FieldSpec::new(FieldId(1), "n");
        n.pde_type = PdeType::ImplicitTimeDependent;
        let mut u = FieldSpec::new(FieldId(2), "u");
        u.rank = FieldRank::Vector { dims: 2 };
        FieldTable::new(vec![FieldSpec::new(FieldId(0), "c"), n, u], Vec::new()).unwrap()
    }

    #[test]
    fn allocate_sizes_by_rank_and_scheme() {
        let mesh = IntervalMesh::new(0.0, 1.0, 3).unwrap();
        let d = Discretization::allocate(mesh, Unconstrained, &table()).unwrap();
        let layout: Vec<_> = d
            .vectors()
            .iter()
            .map(|v| (v.field().0, v.role(), v.data().len()))
            .collect();
        assert_eq!(
            layout,
            vec![
                (0, VectorRole::Current, 6),
                (1, VectorRole::Current, 6),
                (1, VectorRole::Previous, 6),
                (2, VectorRole::Current, 12),
            ]
        );
    }

    #[test]
    fn foreign_vectors_rejected() {
        let mesh = IntervalMesh::new(0.0, 1.0, 3).unwrap();
        let stale: SolutionVectorSet = [SolutionVector::zeros(
            FieldId(0),
            VectorRole::Current,
            1,
            MeshGeneration(4),
            6,
        )]
        .into_iter()
        .collect();
        assert!(matches!(
            Discretization::new(mesh, Unconstrained, stale),
            Err(MeshError::StaleGeneration { .. })
        ));
    }

    #[test]
    fn constraints_built_and_applied() {
        let mesh = IntervalMesh::new(0.0, 1.0, 2).unwrap();
        let bc = BoundaryConstraints::new().with(
            FieldId(0),
            BoundaryValues {
                left: Some(-1.0),
                right: Some(1.0),
            },
        );
        let mut d = Discretization::allocate(mesh, bc, &table()).unwrap();
        d.distribute_constraints().unwrap();
        assert_eq!(d.vectors().current(FieldId(0)).unwrap().data(), &[-1.0, 0.0, 0.0, 1.0]);
        assert!(d.vectors().current(FieldId(1)).unwrap().data().iter().all(|&x| x == 0.0));
    }
}
