//! Pluggable refinement predicates.
//!
//! A [`RefinementPredicate`] decides from a [`CellView`] whether a cell
//! lies in a region that needs resolution. Predicates combine with union
//! semantics through [`AnyOf`]: a cell is marked when any member holds.

use indexmap::IndexMap;
use phasefield_core::{CellId, FieldId, Point};
use smallvec::SmallVec;

use crate::config::RefinementCriterion;

/// Per-point samples of one field, reduced to one value per point.
pub type PointSamples = SmallVec<[f64; 4]>;

/// What a predicate sees of one cell.
#[derive(Clone, Copy, Debug)]
pub struct CellView<'a> {
    cell: CellId,
    level: u32,
    points: &'a [Point],
    samples: &'a IndexMap<FieldId, PointSamples>,
}

impl<'a> CellView<'a> {
    /// Assemble a view. `samples` holds one entry per point for every
    /// sampled field.
    pub fn new(
        cell: CellId,
        level: u32,
        points: &'a [Point],
        samples: &'a IndexMap<FieldId, PointSamples>,
    ) -> Self {
        Self {
            cell,
            level,
            points,
            samples,
        }
    }

    /// The cell.
    pub fn cell(&self) -> CellId {
        self.cell
    }

    /// Its refinement level.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Its representative points.
    pub fn points(&self) -> &'a [Point] {
        self.points
    }

    /// Samples of `field` at [`points`](Self::points). Vector fields are
    /// sampled by magnitude. Empty if the field was not sampled.
    pub fn samples(&self, field: FieldId) -> &'a [f64] {
        self.samples
            .get(&field)
            .map(|s| s.as_slice())
            .unwrap_or_default()
    }
}

/// Decides whether a cell should be refined.
pub trait RefinementPredicate: Send + Sync {
    /// Fields this predicate reads through [`CellView::samples`].
    fn fields(&self) -> Vec<FieldId> {
        Vec::new()
    }

    /// Whether `view` describes a cell that needs resolution.
    fn marks(&self, view: &CellView<'_>) -> bool;
}

impl<F> RefinementPredicate for F
where
    F: Fn(&CellView<'_>) -> bool + Send + Sync,
{
    fn marks(&self, view: &CellView<'_>) -> bool {
        self(view)
    }
}

// ── WindowPredicate ────────────────────────────────────────────────

/// Marks cells where any field has a sample strictly inside its window.
///
/// NaN samples never lie inside a window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WindowPredicate {
    windows: Vec<(FieldId, f64, f64)>,
}

impl WindowPredicate {
    /// No windows; marks nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a window `(min, max)` on `field`.
    pub fn with_window(mut self, field: FieldId, min: f64, max: f64) -> Self {
        self.windows.push((field, min, max));
        self
    }

    /// The windows of a criterion.
    pub fn from_criterion(criterion: &RefinementCriterion) -> Self {
        Self {
            windows: criterion.windows().collect(),
        }
    }
}

impl RefinementPredicate for WindowPredicate {
    fn fields(&self) -> Vec<FieldId> {
        self.windows.iter().map(|&(field, _, _)| field).collect()
    }

    fn marks(&self, view: &CellView<'_>) -> bool {
        self.windows.iter().any(|&(field, min, max)| {
            view.samples(field)
                .iter()
                .any(|&sample| min < sample && sample < max)
        })
    }
}

// ── BandPredicate ──────────────────────────────────────────────────

/// Marks cells with a representative point strictly inside a fixed
/// coordinate band `lo < x[axis] < hi`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandPredicate {
    axis: usize,
    lo: f64,
    hi: f64,
}

impl BandPredicate {
    /// A band along `axis`.
    pub fn new(axis: usize, lo: f64, hi: f64) -> Self {
        Self { axis, lo, hi }
    }
}

impl RefinementPredicate for BandPredicate {
    fn marks(&self, view: &CellView<'_>) -> bool {
        view.points()
            .iter()
            .filter_map(|p| p.get(self.axis))
            .any(|&x| self.lo < x && x < self.hi)
    }
}

// ── AnyOf ──────────────────────────────────────────────────────────

/// Union of predicates.
#[derive(Default)]
pub struct AnyOf {
    members: Vec<Box<dyn RefinementPredicate>>,
}

impl AnyOf {
    /// No members; marks nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member.
    pub fn push(&mut self, predicate: impl RefinementPredicate + 'static) {
        self.members.push(Box::new(predicate));
    }

    /// Add a member, builder style.
    pub fn with(mut self, predicate: impl RefinementPredicate + 'static) -> Self {
        self.push(predicate);
        self
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl RefinementPredicate for AnyOf {
    fn fields(&self) -> Vec<FieldId> {
        let mut fields = Vec::new();
        for field in self.members.iter().flat_map(|m| m.fields()) {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        fields
    }

    fn marks(&self, view: &CellView<'_>) -> bool {
        self.members.iter().any(|m| m.marks(view))
    }
}

impl std::fmt::Debug for AnyOf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyOf")
            .field("members", &self.members.len())
            .finish()
    }
}
