//! Phasefield Quickstart: an adaptive Allen–Cahn run from scratch.
//!
//! Demonstrates:
//!   1. Declaring a field and its dependencies with an `AttributeLoader`
//!   2. Implementing a `PdeModel` against the compiled plan
//!   3. Implementing a `CellEvaluator` for the interval mesh
//!   4. Building a `Simulation` with a refinement criterion
//!   5. Stepping, refining, and reading the solution and metrics
//!
//! Run with:
//!   cargo run --example quickstart

use indexmap::IndexMap;
use phasefield_core::{CellId, EvalFlags, FieldId, FieldRef, NumericError, VectorRole};
use phasefield_deps::{
    AttributeBuilder, AttributeLoader, CellEvaluator, CellInputs, DependencyKind, EquationSide,
    EvaluatedField, ModelCapabilities, PdeModel, ResidualTerm, ResidualTerms,
};
use phasefield_engine::{IntervalProfile, RefinementCriterion, RefinementOutcome, Simulation};
use phasefield_mesh::{IntervalMesh, Mesh, Unconstrained};

// ─── Field IDs ──────────────────────────────────────────────────

const PHI: FieldId = FieldId(0);

// ─── Model parameters ───────────────────────────────────────────

const DT: f64 = 0.05;
const KAPPA: f64 = 1e-4;
const STEPS: u64 = 400;

// ─── Declarations ───────────────────────────────────────────────

struct AllenCahn;

impl AttributeLoader for AllenCahn {
    fn load_variable_attributes(&self, vars: &mut AttributeBuilder<'_>) {
        vars.set_variable_name(0, "phi")
            .set_dependencies_value_term_rhs(0, "phi")
            .set_dependencies_gradient_term_rhs(0, "grad(phi)");
    }
}

// ─── Model: explicit Euler step of phi_t = phi - phi^3 + kappa phi_xx ──

struct AllenCahnModel;

impl PdeModel for AllenCahnModel {
    fn compute_rhs(
        &self,
        _owner: FieldId,
        inputs: &CellInputs,
        residual: &mut ResidualTerms,
    ) -> Result<(), NumericError> {
        let phi = inputs.value(PHI)?;
        let grad = inputs.gradient(PHI)?;
        residual.set(
            ResidualTerm::Value,
            phi.iter().map(|p| p + DT * (p - p * p * p)).collect(),
        );
        residual.set(
            ResidualTerm::Gradient,
            grad.iter().map(|g| -DT * KAPPA * g).collect(),
        );
        Ok(())
    }
}

// ─── Evaluator: end-point values of a linear function per cell ──
//
// Reads a frozen copy of the solution and writes the next one, with a
// lumped mass matrix inside each cell.

struct EndPointEvaluator {
    cells: IndexMap<CellId, (usize, f64)>,
    data: Vec<f64>,
    next: Vec<f64>,
}

impl EndPointEvaluator {
    fn new(sim: &Simulation<IntervalMesh, Unconstrained>) -> Result<Self, NumericError> {
        let mesh = sim.mesh();
        let mut cells = IndexMap::new();
        for (k, &cell) in mesh.active_cells().iter().enumerate() {
            let (lo, hi) = mesh.bounds(cell).map_err(|e| NumericError::EvaluationFailed {
                reason: e.to_string(),
            })?;
            cells.insert(cell, (k, hi - lo));
        }
        let data = sim
            .solution()
            .current(PHI)
            .map(|v| v.data().to_vec())
            .unwrap_or_default();
        Ok(Self {
            cells,
            next: data.clone(),
            data,
        })
    }

    fn locate(&self, cell: CellId) -> Result<(usize, f64), NumericError> {
        self.cells
            .get(&cell)
            .copied()
            .ok_or_else(|| NumericError::EvaluationFailed {
                reason: format!("cell {cell} is not active"),
            })
    }
}

impl CellEvaluator for EndPointEvaluator {
    fn evaluate(
        &mut self,
        cell: CellId,
        _side: EquationSide,
        requests: &IndexMap<FieldId, EvalFlags>,
    ) -> Result<CellInputs, NumericError> {
        let (k, h) = self.locate(cell)?;
        let (a, b) = (self.data[2 * k], self.data[2 * k + 1]);
        let mut inputs = CellInputs::new(cell);
        for (&field, &flags) in requests {
            let mut out = EvaluatedField::new();
            if flags.contains(EvalFlags::VALUE) {
                out.set(DependencyKind::Value, vec![a, b]);
            }
            if flags.contains(EvalFlags::GRADIENT) {
                out.set(DependencyKind::Grad, vec![(b - a) / h; 2]);
            }
            inputs.insert(field, out);
        }
        Ok(inputs)
    }

    fn submit(
        &mut self,
        cell: CellId,
        _owner: FieldRef,
        _side: EquationSide,
        residual: ResidualTerms,
    ) -> Result<(), NumericError> {
        let (k, h) = self.locate(cell)?;
        let value = residual.get(ResidualTerm::Value).unwrap_or_default();
        let flux = residual
            .get(ResidualTerm::Gradient)
            .and_then(|g| g.first().copied())
            .unwrap_or(0.0);
        if let [left, right] = value {
            self.next[2 * k] = left - 2.0 / h * flux;
            self.next[2 * k + 1] = right + 2.0 / h * flux;
        }
        Ok(())
    }
}

// ─── Main ───────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Phasefield Quickstart ===\n");

    // 1. Refine wherever phi is strictly between -0.95 and 0.95, up to
    //    level 6, checking every 20 steps.
    let criterion = RefinementCriterion::new(0, 6, 20).with_window(PHI, -0.95, 0.95);

    // 2. Create the simulation on [0, 1] with 8 coarse cells.
    let mesh = IntervalMesh::new(0.0, 1.0, 8)?;
    let mut sim = Simulation::init(
        &AllenCahn,
        ModelCapabilities::new(AllenCahnModel),
        criterion,
        mesh,
        Unconstrained,
    )?
    .with_initial_conditions(IntervalProfile::new(|_: FieldId, x: f64, _: usize| {
        ((x - 0.37) / 0.04).tanh()
    }))?;
    println!("Plan: phi needs {}", sim.plan().flags_for(PHI, EquationSide::Rhs));

    // 3. Step.
    for step in 0..=STEPS {
        if let RefinementOutcome::Changed { generation, passes } = sim.maybe_refine(step)? {
            let m = sim.last_metrics();
            println!(
                "  step {step:>3}: generation {generation} after {passes} pass(es), \
                 {} -> {} dofs, time={}μs",
                m.dofs_before, m.dofs_after, m.total_us,
            );
        }

        let mut evaluator = EndPointEvaluator::new(&sim)?;
        sim.assemble(EquationSide::Rhs, &mut evaluator)?;
        if let Some(phi) = sim.solution_mut().get_mut(PHI, VectorRole::Current) {
            phi.data_mut().copy_from_slice(&evaluator.next);
        }
    }

    // 4. Print the interface cells.
    let mesh = sim.mesh();
    let phi = sim.solution().current(PHI).ok_or("phi missing")?;
    println!("\nFinest cells after {STEPS} steps:");
    for &cell in mesh.active_cells() {
        if mesh.level(cell)? == 6 {
            let (lo, hi) = mesh.bounds(cell)?;
            let samples = mesh.sample(cell, phi)?;
            println!("  [{lo:.4}, {hi:.4}]  phi = {:+.3} .. {:+.3}", samples[0], samples[1]);
        }
    }

    println!("Done.");
    Ok(())
}
