//! Integration test: refinement decisions end to end.
//!
//! Drives a [`Simulation`] of the coupled `c`/`n` model through refinement
//! steps and checks the resulting layout, the carried-over solution, and
//! that the compiled plan and the evaluator requests stay fixed.

use std::sync::Arc;

use phasefield_core::{EvalFlags, VectorRole};
use phasefield_deps::{EquationSide, ModelCapabilities};
use phasefield_engine::{
    IntervalProfile, RefinementCriterion, RefinementOutcome, RefinementState, Simulation,
};
use phasefield_mesh::{IntervalMesh, Mesh, Unconstrained};
use phasefield_test_utils::fixtures::{CoupledLoader, CoupledModel, C, N};
use phasefield_test_utils::{interface_profile, RecordingEvaluator};

type Sim = Simulation<IntervalMesh, Unconstrained>;

/// `n` inside `(-0.99999, 0.99999)` needs resolution between levels 1
/// and 7, checked every 500 steps.
fn interface_criterion() -> RefinementCriterion {
    RefinementCriterion::new(1, 7, 500).with_window(N, -0.99999, 0.99999)
}

fn uniform(levels: u32, n: f64) -> Sim {
    let mut mesh = IntervalMesh::new(0.0, 1.0, 2).unwrap();
    mesh.refine_global(levels).unwrap();
    let mut sim = Simulation::init(
        &CoupledLoader::new(),
        ModelCapabilities::new(CoupledModel),
        interface_criterion(),
        mesh,
        Unconstrained,
    )
    .unwrap();
    sim.solution_mut()
        .get_mut(N, VectorRole::Current)
        .unwrap()
        .data_mut()
        .fill(n);
    sim
}

fn levels(sim: &Sim) -> Vec<u32> {
    let mesh = sim.mesh();
    mesh.active_cells()
        .iter()
        .map(|&cell| mesh.level(cell).unwrap())
        .collect()
}

// ── Window and level caps ────────────────────────────────────────────

#[test]
fn interior_value_below_max_level_refines() {
    let mut sim = uniform(4, 0.5);
    assert_eq!(sim.maybe_refine(250).unwrap(), RefinementOutcome::Skipped);

    match sim.maybe_refine(500).unwrap() {
        RefinementOutcome::Changed { passes, .. } => assert_eq!(passes, 1),
        other => panic!("expected Changed, got {other:?}"),
    }
    assert!(levels(&sim).iter().all(|&l| l == 5));
    assert_eq!(sim.last_metrics().cells_refined, 32);

    // a constant stays exactly constant through prolongation
    let n = sim.solution().current(N).unwrap();
    assert_eq!(n.data().len(), sim.mesh().n_dofs());
    assert!(n.data().iter().all(|&x| x == 0.5));
}

#[test]
fn interior_value_at_max_level_is_kept() {
    let mut sim = uniform(7, 0.5);
    let generation = sim.mesh().generation();
    assert_eq!(sim.maybe_refine(1000).unwrap(), RefinementOutcome::Unchanged);
    assert_eq!(sim.mesh().generation(), generation);
    assert!(levels(&sim).iter().all(|&l| l == 7));
    assert_eq!(sim.state(), RefinementState::Stable);
}

#[test]
fn value_outside_window_coarsens_toward_min_level() {
    let mut sim = uniform(2, 1.0);
    sim.maybe_refine(500).unwrap();
    assert!(levels(&sim).iter().all(|&l| l == 1));

    // at the minimum level nothing more happens
    assert_eq!(sim.maybe_refine(1000).unwrap(), RefinementOutcome::Unchanged);
    assert!(levels(&sim).iter().all(|&l| l == 1));
}

// ── Initial refinement ───────────────────────────────────────────────

#[test]
fn initial_passes_resolve_the_interface() {
    let mesh = IntervalMesh::new(0.0, 1.0, 8).unwrap();
    let mut sim = Simulation::init(
        &CoupledLoader::new(),
        ModelCapabilities::new(CoupledModel),
        RefinementCriterion::new(0, 5, 100).with_window(N, -0.9, 0.9),
        mesh,
        Unconstrained,
    )
    .unwrap()
    .with_initial_conditions(IntervalProfile::new(interface_profile(0.3, 0.05)))
    .unwrap();

    match sim.maybe_refine(0).unwrap() {
        RefinementOutcome::Changed { passes, .. } => assert!(passes <= 5),
        other => panic!("expected Changed, got {other:?}"),
    }

    let mesh = sim.mesh();
    let finest: Vec<_> = mesh
        .active_cells()
        .iter()
        .copied()
        .filter(|&cell| mesh.level(cell).unwrap() == 5)
        .collect();
    assert!(!finest.is_empty());
    for cell in finest {
        let (lo, hi) = mesh.bounds(cell).unwrap();
        assert!((lo - 0.3).abs() < 0.1 || (hi - 0.3).abs() < 0.1, "[{lo}, {hi}]");
    }

    // the initial state was re-sampled on the final layout
    let exact = mesh.interpolate(1, |x, _| ((x - 0.3) / 0.05).tanh());
    assert_eq!(sim.solution().current(C).unwrap().data(), exact.as_slice());
}

// ── Plan reuse ───────────────────────────────────────────────────────

#[test]
fn evaluator_sees_the_same_flags_on_every_layout() {
    let mut sim = uniform(3, 0.5);
    let plan = Arc::clone(sim.plan());

    let mut before = RecordingEvaluator::new();
    sim.assemble(EquationSide::Rhs, &mut before).unwrap();
    sim.assemble(EquationSide::Lhs, &mut before).unwrap();

    sim.maybe_refine(500).unwrap();
    assert!(Arc::ptr_eq(&plan, sim.plan()));

    let mut after = RecordingEvaluator::new();
    sim.assemble(EquationSide::Rhs, &mut after).unwrap();
    sim.assemble(EquationSide::Lhs, &mut after).unwrap();
    assert_eq!(after.calls.len(), 2 * before.calls.len());

    for rec in [&before, &after] {
        assert_eq!(
            rec.requested(N, EquationSide::Rhs),
            EvalFlags::VALUE | EvalFlags::GRADIENT
        );
        assert_eq!(
            rec.requested(N, EquationSide::Lhs),
            EvalFlags::VALUE | EvalFlags::CHANGE
        );
        assert_eq!(rec.requested(C, EquationSide::Rhs), EvalFlags::VALUE);
        assert_eq!(rec.requested(C, EquationSide::Lhs), EvalFlags::empty());
    }
}
