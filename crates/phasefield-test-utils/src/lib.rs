//! Test utilities and mock types for phasefield development.
//!
//! Provides a recording [`CellEvaluator`] ([`RecordingEvaluator`]), a
//! fault-injecting [`Mesh`] wrapper ([`FailingMesh`]), seeded data
//! generators, and the declaration and model fixtures in [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use phasefield_core::{
    CellId, EvalFlags, FieldId, FieldRef, MeshGeneration, NumericError, SolutionVector,
    VectorRole,
};
use phasefield_deps::{
    CellEvaluator, CellInputs, DependencyKind, EquationSide, EvaluatedField, ResidualTerms,
};
use phasefield_mesh::{
    CellPoints, CellSamples, IntervalMesh, LayoutChange, Mesh, MeshError, RefinementFlag,
};
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

// ── RecordingEvaluator ─────────────────────────────────────────────

/// One call to [`CellEvaluator::evaluate`].
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluateCall {
    pub cell: CellId,
    pub side: EquationSide,
    pub requests: Vec<(FieldId, EvalFlags)>,
}

/// One call to [`CellEvaluator::submit`].
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    pub cell: CellId,
    pub owner: FieldRef,
    pub side: EquationSide,
    pub terms: EvalFlags,
}

/// Evaluator that answers every request with constant data and records
/// what it was asked for.
///
/// Flags passed to [`withholding`](RecordingEvaluator::withholding) are
/// never evaluated, to exercise missing-data paths.
#[derive(Clone, Debug)]
pub struct RecordingEvaluator {
    pub calls: Vec<EvaluateCall>,
    pub submissions: Vec<Submission>,
    points: usize,
    fill: f64,
    withheld: EvalFlags,
}

impl RecordingEvaluator {
    /// Two quadrature points, every value `1.0`.
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            submissions: Vec::new(),
            points: 2,
            fill: 1.0,
            withheld: EvalFlags::empty(),
        }
    }

    pub fn with_points(mut self, points: usize) -> Self {
        self.points = points;
        self
    }

    pub fn with_fill(mut self, fill: f64) -> Self {
        self.fill = fill;
        self
    }

    pub fn withholding(mut self, flags: EvalFlags) -> Self {
        self.withheld = flags;
        self
    }

    /// Union of the flags requested for `field` over every recorded call
    /// on `side`.
    pub fn requested(&self, field: FieldId, side: EquationSide) -> EvalFlags {
        self.calls
            .iter()
            .filter(|c| c.side == side)
            .flat_map(|c| c.requests.iter())
            .filter(|(f, _)| *f == field)
            .map(|&(_, flags)| flags)
            .collect()
    }
}

impl Default for RecordingEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl CellEvaluator for RecordingEvaluator {
    fn evaluate(
        &mut self,
        cell: CellId,
        side: EquationSide,
        requests: &IndexMap<FieldId, EvalFlags>,
    ) -> Result<CellInputs, NumericError> {
        self.calls.push(EvaluateCall {
            cell,
            side,
            requests: requests.iter().map(|(&f, &flags)| (f, flags)).collect(),
        });
        let mut inputs = CellInputs::new(cell);
        for (&field, &flags) in requests {
            let mut data = EvaluatedField::new();
            for kind in DependencyKind::ALL {
                if flags.contains(kind.flag()) && !self.withheld.contains(kind.flag()) {
                    data.set(kind, vec![self.fill; self.points]);
                }
            }
            inputs.insert(field, data);
        }
        Ok(inputs)
    }

    fn submit(
        &mut self,
        cell: CellId,
        owner: FieldRef,
        side: EquationSide,
        residual: ResidualTerms,
    ) -> Result<(), NumericError> {
        self.submissions.push(Submission {
            cell,
            owner,
            side,
            terms: residual.flags(),
        });
        Ok(())
    }
}

// ── FailingMesh ────────────────────────────────────────────────────

/// Which mesh operation a [`FailingMesh`] breaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshFault {
    /// [`Mesh::plan_refinement`].
    Plan,
    /// [`LayoutChange::prolong`] on a planned change.
    Prolong,
    /// [`Mesh::execute_refinement`].
    Execute,
}

/// Wraps a mesh and fails one operation after a number of successful
/// calls to it.
///
/// For [`MeshFault::Prolong`] the count is of planned changes: the change
/// planned by call `succeed_count + 1` fails to prolong.
#[derive(Debug)]
pub struct FailingMesh<M> {
    inner: M,
    fault: MeshFault,
    error: MeshError,
    succeed_count: usize,
    call_count: AtomicUsize,
}

impl<M: Mesh> FailingMesh<M> {
    pub fn new(inner: M, fault: MeshFault, error: MeshError, succeed_count: usize) -> Self {
        Self {
            inner,
            fault,
            error,
            succeed_count,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// How many times the faulted operation has been called.
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    fn trips(&self, op: MeshFault) -> bool {
        if op != self.fault {
            return false;
        }
        self.call_count.fetch_add(1, Ordering::Relaxed) >= self.succeed_count
    }
}

/// A planned change that may fail to prolong.
#[derive(Debug)]
pub struct FailingChange<C> {
    inner: C,
    error: Option<MeshError>,
}

impl<C: LayoutChange> LayoutChange for FailingChange<C> {
    fn old_generation(&self) -> MeshGeneration {
        self.inner.old_generation()
    }

    fn new_generation(&self) -> MeshGeneration {
        self.inner.new_generation()
    }

    fn old_dof_count(&self) -> usize {
        self.inner.old_dof_count()
    }

    fn new_dof_count(&self) -> usize {
        self.inner.new_dof_count()
    }

    fn refined_cells(&self) -> usize {
        self.inner.refined_cells()
    }

    fn coarsened_cells(&self) -> usize {
        self.inner.coarsened_cells()
    }

    fn is_identity(&self) -> bool {
        self.inner.is_identity()
    }

    fn prolong(&self, old: &[f64], components: usize) -> Result<Vec<f64>, MeshError> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => self.inner.prolong(old, components),
        }
    }
}

impl<M: Mesh> Mesh for FailingMesh<M> {
    type Change = FailingChange<M::Change>;

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn generation(&self) -> MeshGeneration {
        self.inner.generation()
    }

    fn n_dofs(&self) -> usize {
        self.inner.n_dofs()
    }

    fn locally_owned_cells(&self) -> Vec<CellId> {
        self.inner.locally_owned_cells()
    }

    fn level(&self, cell: CellId) -> Result<u32, MeshError> {
        self.inner.level(cell)
    }

    fn sample_points(&self, cell: CellId) -> Result<CellPoints, MeshError> {
        self.inner.sample_points(cell)
    }

    fn sample(&self, cell: CellId, vector: &SolutionVector) -> Result<CellSamples, MeshError> {
        self.inner.sample(cell, vector)
    }

    fn set_flag(&mut self, cell: CellId, flag: RefinementFlag) -> Result<(), MeshError> {
        self.inner.set_flag(cell, flag)
    }

    fn flag(&self, cell: CellId) -> Result<RefinementFlag, MeshError> {
        self.inner.flag(cell)
    }

    fn clear_flags(&mut self) {
        self.inner.clear_flags()
    }

    fn plan_refinement(&self) -> Result<Self::Change, MeshError> {
        if self.trips(MeshFault::Plan) {
            return Err(self.error.clone());
        }
        let error = self.trips(MeshFault::Prolong).then(|| self.error.clone());
        Ok(FailingChange {
            inner: self.inner.plan_refinement()?,
            error,
        })
    }

    fn execute_refinement(&mut self, change: Self::Change) -> Result<(), MeshError> {
        if self.trips(MeshFault::Execute) {
            return Err(self.error.clone());
        }
        self.inner.execute_refinement(change.inner)
    }
}

// ── Seeded data ────────────────────────────────────────────────────

/// `len` values drawn uniformly from `[lo, hi)`, reproducible per `seed`.
pub fn seeded_values(seed: u64, len: usize, lo: f64, hi: f64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len)
        .map(|_| lo + (hi - lo) * unit_interval(&mut rng))
        .collect()
}

fn unit_interval(rng: &mut impl RngCore) -> f64 {
    (rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64
}

/// A current vector of seeded noise in `[-1, 1)` on the current layout of
/// `mesh`.
pub fn seeded_vector(
    seed: u64,
    mesh: &IntervalMesh,
    field: FieldId,
    components: usize,
) -> SolutionVector {
    SolutionVector::new(
        field,
        VectorRole::Current,
        components,
        mesh.generation(),
        seeded_values(seed, mesh.n_dofs() * components, -1.0, 1.0),
    )
}

/// `tanh((x - center) / width)` in every component of every field.
pub fn interface_profile(center: f64, width: f64) -> impl Fn(FieldId, f64, usize) -> f64 {
    move |_, x, _| ((x - center) / width).tanh()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_values_reproducible_and_bounded() {
        let a = seeded_values(7, 64, -1.0, 1.0);
        assert_eq!(a, seeded_values(7, 64, -1.0, 1.0));
        assert_ne!(a, seeded_values(8, 64, -1.0, 1.0));
        assert!(a.iter().all(|x| (-1.0..1.0).contains(x)));
    }

    #[test]
    fn failing_mesh_trips_after_successes() {
        let inner = IntervalMesh::new(0.0, 1.0, 2).unwrap();
        let mesh = FailingMesh::new(inner, MeshFault::Plan, MeshError::ConstraintsNotBuilt, 1);
        assert!(mesh.plan_refinement().is_ok());
        assert_eq!(mesh.plan_refinement().err(), Some(MeshError::ConstraintsNotBuilt));
        assert_eq!(mesh.calls(), 2);
    }

    #[test]
    fn failing_change_rejects_prolong() {
        let inner = IntervalMesh::new(0.0, 1.0, 2).unwrap();
        let mesh = FailingMesh::new(inner, MeshFault::Prolong, MeshError::ConstraintsNotBuilt, 0);
        let change = mesh.plan_refinement().unwrap();
        assert!(change.prolong(&[0.0; 4], 1).is_err());
    }

    #[test]
    fn recorder_withholds() {
        let mut rec = RecordingEvaluator::new().withholding(EvalFlags::GRADIENT);
        let requests: IndexMap<_, _> =
            [(FieldId(0), EvalFlags::VALUE | EvalFlags::GRADIENT)].into_iter().collect();
        let inputs = rec.evaluate(CellId(0), EquationSide::Rhs, &requests).unwrap();
        assert_eq!(inputs.field(FieldId(0)).unwrap().flags(), EvalFlags::VALUE);
        assert_eq!(
            rec.requested(FieldId(0), EquationSide::Rhs),
            EvalFlags::VALUE | EvalFlags::GRADIENT
        );
    }
}
