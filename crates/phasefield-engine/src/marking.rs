//! Cell classification for one marking pass.
//!
//! Each partition samples its locally owned cells, asks the predicate
//! whether they need resolution, and turns the answer into a refinement
//! flag bounded by the criterion's levels. No communication happens here.

use indexmap::IndexMap;
use phasefield_core::{CellId, FieldId, NumericError, SolutionVectorSet};
use phasefield_mesh::{Mesh, RefinementFlag};

use crate::config::{NonFinitePolicy, RefinementCriterion};
use crate::error::{RefinementError, RefinementStage};
use crate::predicate::{CellView, PointSamples, RefinementPredicate};

/// What a marking pass does to one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellAction {
    /// Split the cell.
    Refine,
    /// Merge the cell into its parent.
    Coarsen,
    /// Leave the cell as it is.
    Keep,
}

impl CellAction {
    /// The mesh flag carrying this action.
    pub fn flag(self) -> RefinementFlag {
        match self {
            Self::Refine => RefinementFlag::Refine,
            Self::Coarsen => RefinementFlag::Coarsen,
            Self::Keep => RefinementFlag::None,
        }
    }
}

/// Decide the action for a cell at `level` that the predicate did or did
/// not mark.
///
/// Cells at or above `max_level` are never refined. Unmarked cells are
/// coarsened only while strictly above `min_level`.
pub fn classify(level: u32, marked: bool, min_level: u32, max_level: u32) -> CellAction {
    if marked {
        if level < max_level {
            CellAction::Refine
        } else {
            CellAction::Keep
        }
    } else if level > min_level {
        CellAction::Coarsen
    } else {
        CellAction::Keep
    }
}

/// Result of classifying the locally owned cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Marking {
    /// Cells with a non-trivial action, in layout order.
    pub flags: Vec<(CellId, RefinementFlag)>,
    /// Cells the predicate held for.
    pub marked: usize,
    /// Cells classified [`CellAction::Refine`].
    pub refine: usize,
    /// Cells classified [`CellAction::Coarsen`].
    pub coarsen: usize,
}

/// Classify every locally owned cell of `mesh`.
///
/// Every field the predicate reads is sampled from its current vector at
/// the cell's representative points; vector fields are reduced to their
/// Euclidean magnitude per point.
pub fn mark_cells<M: Mesh + ?Sized>(
    mesh: &M,
    vectors: &SolutionVectorSet,
    predicate: &dyn RefinementPredicate,
    criterion: &RefinementCriterion,
) -> Result<Marking, RefinementError> {
    let fields = predicate.fields();
    let mut sources = Vec::with_capacity(fields.len());
    for &field in &fields {
        let vector = vectors
            .current(field)
            .ok_or(RefinementError::MissingVector { field })?;
        sources.push(vector);
    }

    let mut marking = Marking::default();
    let mut samples: IndexMap<FieldId, PointSamples> = IndexMap::with_capacity(fields.len());
    let stage = RefinementStage::Marking;
    for cell in mesh.locally_owned_cells() {
        let level = mesh.level(cell).map_err(RefinementError::mesh(stage))?;
        let points = mesh
            .sample_points(cell)
            .map_err(RefinementError::mesh(stage))?;

        samples.clear();
        for vector in &sources {
            let raw = mesh
                .sample(cell, vector)
                .map_err(RefinementError::mesh(stage))?;
            let reduced = magnitudes(&raw, vector.components());
            if criterion.non_finite == NonFinitePolicy::Error {
                if let Some(&value) = reduced.iter().find(|v| !v.is_finite()) {
                    return Err(NumericError::NonFinite {
                        field: vector.field(),
                        cell: Some(cell),
                        value,
                    }
                    .into());
                }
            }
            samples.insert(vector.field(), reduced);
        }

        let marked = predicate.marks(&CellView::new(cell, level, &points, &samples));
        if marked {
            marking.marked += 1;
        }
        match classify(level, marked, criterion.min_level, criterion.max_level) {
            CellAction::Keep => {}
            action => {
                if action == CellAction::Refine {
                    marking.refine += 1;
                } else {
                    marking.coarsen += 1;
                }
                marking.flags.push((cell, action.flag()));
            }
        }
    }

    log::debug!(
        "marked {} cell(s): {} to refine, {} to coarsen",
        marking.marked,
        marking.refine,
        marking.coarsen
    );
    Ok(marking)
}

fn magnitudes(raw: &[f64], components: usize) -> PointSamples {
    if components <= 1 {
        return PointSamples::from_slice(raw);
    }
    raw.chunks_exact(components)
        .map(|c| c.iter().map(|x| x * x).sum::<f64>().sqrt())
        .collect()
}
