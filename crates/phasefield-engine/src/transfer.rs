//! Moving solution vectors across a layout change.
//!
//! [`SolutionTransferCoordinator::prepare`] captures every live vector while
//! the old layout is still valid; [`commit`](SolutionTransferCoordinator::commit)
//! builds the complete replacement set for the new layout. Neither touches
//! the mesh or the live vectors, so a failure at any point leaves the
//! previous state intact.

use phasefield_core::{FieldId, MeshGeneration, SolutionVector, SolutionVectorSet, VectorRole};
use phasefield_mesh::{LayoutChange, Mesh, MeshError};

use crate::error::{RefinementError, RefinementStage};

#[derive(Clone, Debug)]
struct Captured {
    field: FieldId,
    role: VectorRole,
    components: usize,
    data: Vec<f64>,
}

/// Data of every live vector, captured on one layout.
#[derive(Clone, Debug)]
#[must_use]
pub struct TransferToken {
    generation: MeshGeneration,
    dofs: usize,
    vectors: Vec<Captured>,
}

impl TransferToken {
    /// The layout the data was captured on.
    pub fn generation(&self) -> MeshGeneration {
        self.generation
    }

    /// Number of captured vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether no vector was captured.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Prepares and commits solution transfers.
#[derive(Clone, Copy, Debug, Default)]
pub struct SolutionTransferCoordinator;

impl SolutionTransferCoordinator {
    /// A coordinator.
    pub fn new() -> Self {
        Self
    }

    /// Capture `vectors`, which must all live on the current layout of
    /// `mesh`.
    pub fn prepare<M: Mesh + ?Sized>(
        &self,
        mesh: &M,
        vectors: &SolutionVectorSet,
    ) -> Result<TransferToken, RefinementError> {
        let generation = mesh.generation();
        let dofs = mesh.n_dofs();
        let mut captured = Vec::with_capacity(vectors.len());
        for v in vectors {
            if v.generation() != generation {
                return Err(RefinementError::VectorsOutOfSync { mesh: generation });
            }
            let expected = dofs * v.components();
            if v.data().len() != expected {
                return Err(RefinementError::Mesh {
                    stage: RefinementStage::Transfer,
                    source: MeshError::LayoutMismatch {
                        expected,
                        actual: v.data().len(),
                    },
                });
            }
            captured.push(Captured {
                field: v.field(),
                role: v.role(),
                components: v.components(),
                data: v.data().to_vec(),
            });
        }
        Ok(TransferToken {
            generation,
            dofs,
            vectors: captured,
        })
    }

    /// Prolong every captured vector onto the layout `change` produces,
    /// preserving order.
    ///
    /// The returned set is complete: every vector fully populated and
    /// sized for the new layout.
    pub fn commit<C: LayoutChange + ?Sized>(
        &self,
        token: TransferToken,
        change: &C,
    ) -> Result<SolutionVectorSet, RefinementError> {
        if change.old_generation() != token.generation || change.old_dof_count() != token.dofs {
            return Err(RefinementError::StaleToken {
                captured: token.generation,
                found: change.old_generation(),
            });
        }
        let generation = change.new_generation();
        let dofs = change.new_dof_count();
        let mut out = SolutionVectorSet::new();
        for v in token.vectors {
            let data = change
                .prolong(&v.data, v.components)
                .map_err(RefinementError::mesh(RefinementStage::Transfer))?;
            let expected = dofs * v.components;
            if data.len() != expected {
                return Err(RefinementError::Mesh {
                    stage: RefinementStage::Transfer,
                    source: MeshError::LayoutMismatch {
                        expected,
                        actual: data.len(),
                    },
                });
            }
            out.push(SolutionVector::new(
                v.field,
                v.role,
                v.components,
                generation,
                data,
            ));
        }
        Ok(out)
    }
}
