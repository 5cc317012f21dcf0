//! The [`Mesh`] collaborator trait and the [`LayoutChange`] it plans.

use crate::error::MeshError;
use phasefield_core::{CellId, MeshGeneration, Point, SolutionVector};
use smallvec::SmallVec;

/// What the next layout change should do to a cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RefinementFlag {
    /// Keep the cell.
    #[default]
    None,
    /// Split the cell into its children.
    Refine,
    /// Merge the cell with its siblings into their parent.
    Coarsen,
}

/// Sample values of one vector at one cell, point-major, components
/// interleaved.
pub type CellSamples = SmallVec<[f64; 6]>;

/// Representative points of one cell.
pub type CellPoints = SmallVec<[Point; 4]>;

/// A planned transition from the current layout to a new one.
///
/// Built by [`Mesh::plan_refinement`] without touching the mesh. Holds
/// everything needed to map data from the old layout onto the new one, so
/// all vectors can be transferred before the mesh is swapped.
pub trait LayoutChange {
    /// The layout this change starts from.
    fn old_generation(&self) -> MeshGeneration;

    /// The layout this change produces.
    fn new_generation(&self) -> MeshGeneration {
        self.old_generation().next()
    }

    /// Degrees of freedom per component before the change.
    fn old_dof_count(&self) -> usize;

    /// Degrees of freedom per component after the change.
    fn new_dof_count(&self) -> usize;

    /// Cells split by this change.
    fn refined_cells(&self) -> usize;

    /// Parent cells restored by this change.
    fn coarsened_cells(&self) -> usize;

    /// Whether the change leaves the layout as it is.
    fn is_identity(&self) -> bool {
        self.refined_cells() == 0 && self.coarsened_cells() == 0
    }

    /// Map `old`, laid out for the old layout with `components` values
    /// per degree of freedom, onto the new layout.
    ///
    /// The result is fully populated and has exactly
    /// `new_dof_count() * components` entries.
    fn prolong(&self, old: &[f64], components: usize) -> Result<Vec<f64>, MeshError>;
}

/// Adaptive mesh collaborator.
///
/// The mesh owns every cell; callers only hold [`CellId`] handles, which are
/// valid for the [`MeshGeneration`] they were obtained in. Each partition
/// sees the cells it owns through
/// [`locally_owned_cells`](Self::locally_owned_cells).
pub trait Mesh: Send {
    /// The layout change this mesh plans.
    type Change: LayoutChange;

    /// Number of spatial dimensions.
    fn dim(&self) -> usize;

    /// The current layout.
    fn generation(&self) -> MeshGeneration;

    /// Degrees of freedom per component in the current layout.
    fn n_dofs(&self) -> usize;

    /// Cells owned by this partition, in layout order.
    fn locally_owned_cells(&self) -> Vec<CellId>;

    /// Refinement level of a cell (coarse cells are level 0).
    fn level(&self, cell: CellId) -> Result<u32, MeshError>;

    /// Points at which a cell is sampled.
    fn sample_points(&self, cell: CellId) -> Result<CellPoints, MeshError>;

    /// Values of `vector` at [`sample_points`](Self::sample_points).
    ///
    /// Fails with [`MeshError::StaleGeneration`] if the vector belongs to
    /// another layout and [`MeshError::LayoutMismatch`] if its length does
    /// not match this one.
    fn sample(&self, cell: CellId, vector: &SolutionVector) -> Result<CellSamples, MeshError>;

    /// Set the flag of a cell for the next layout change.
    fn set_flag(&mut self, cell: CellId, flag: RefinementFlag) -> Result<(), MeshError>;

    /// The flag currently set on a cell.
    fn flag(&self, cell: CellId) -> Result<RefinementFlag, MeshError>;

    /// Reset every flag to [`RefinementFlag::None`].
    fn clear_flags(&mut self);

    /// Build the layout the current flags describe, without mutating
    /// the mesh. Flags the mesh cannot honour are dropped.
    fn plan_refinement(&self) -> Result<Self::Change, MeshError>;

    /// Switch to the planned layout. Clears every flag.
    ///
    /// Fails with [`MeshError::StaleGeneration`] if `change` was planned
    /// from another layout; the mesh is left untouched on failure.
    fn execute_refinement(&mut self, change: Self::Change) -> Result<(), MeshError>;
}
