//! The simulation driver.
//!
//! [`Simulation`] is the user-facing entry point. [`init`](Simulation::init)
//! runs every configuration check before any vector is allocated, so a bad
//! declaration or criterion fails fast with a [`ConfigurationError`]. After
//! that the caller owns the time loop: assemble residuals with
//! [`assemble`](Simulation::assemble) and call
//! [`maybe_refine`](Simulation::maybe_refine) once per step.
//!
//! The compiled plan does not depend on the mesh, so it is shared
//! unchanged across every layout change.

use std::sync::Arc;

use phasefield_core::{CellId, FieldId, FieldTable, NumericError, SolutionVectorSet, StepId};
use phasefield_deps::{
    AttributeLoader, AttributeSet, CellEvaluator, CompiledEvalPlan, DependencyResolver,
    EquationSide, ModelCapabilities,
};
use phasefield_mesh::{ConstraintSet, Mesh};

use crate::assembly::{self, AssemblyStats};
use crate::collective::{Collective, SerialCollective};
use crate::config::{ConfigurationError, RefinementCriterion};
use crate::controller::{AdaptiveRefinementController, RefinementOutcome, RefinementState};
use crate::discretization::Discretization;
use crate::error::RefinementError;
use crate::initial::InitialConditions;
use crate::metrics::RefinementMetrics;
use crate::predicate::RefinementPredicate;

/// A validated model on an adaptive mesh.
pub struct Simulation<M, K> {
    resolver: DependencyResolver,
    capabilities: ModelCapabilities,
    controller: AdaptiveRefinementController,
    discretization: Discretization<M, K>,
    initial: Option<Box<dyn InitialConditions<M>>>,
    collective: Box<dyn Collective>,
}

impl<M: Mesh, K: ConstraintSet<M>> Simulation<M, K> {
    /// Validate the model and allocate its solution vectors on `mesh`.
    ///
    /// Checks run in order and the first failure is returned:
    /// 1. the declarations of `loader` compile into a plan,
    /// 2. `capabilities` covers everything the plan needs,
    /// 3. `criterion` is consistent with the declared fields,
    /// 4. the mesh accepts the constraints.
    pub fn init(
        loader: &dyn AttributeLoader,
        capabilities: ModelCapabilities,
        criterion: RefinementCriterion,
        mesh: M,
        constraints: K,
    ) -> Result<Self, ConfigurationError> {
        let resolver = DependencyResolver::from_loader(loader).inspect_err(|e| {
            log::error!("dependency validation failed: {e}");
        })?;
        if let Some(capability) = capabilities.missing_for(resolver.plan()) {
            log::error!("model does not provide a {capability}");
            return Err(ConfigurationError::MissingCapability { capability });
        }
        criterion.validate(resolver.table())?;
        let discretization = Discretization::allocate(mesh, constraints, resolver.table())?;
        log::info!(
            "initialised {} solution field(s), {} postprocessing field(s) on {} dofs",
            resolver.table().solution_count(),
            resolver.table().postprocess_count(),
            discretization.mesh().n_dofs()
        );

        Ok(Self {
            resolver,
            capabilities,
            controller: AdaptiveRefinementController::new(criterion),
            discretization,
            initial: None,
            collective: Box::new(SerialCollective),
        })
    }

    /// Run collectives over `collective` instead of a single partition.
    pub fn with_collective(mut self, collective: impl Collective + 'static) -> Self {
        self.collective = Box::new(collective);
        self
    }

    /// Mark cells for which `predicate` holds as well as those in the
    /// criterion windows.
    pub fn with_predicate(mut self, predicate: impl RefinementPredicate + 'static) -> Self {
        self.controller = self.controller.with_predicate(predicate);
        self
    }

    /// Sample `initial` on the current layout, apply the constraints, and
    /// keep `initial` for re-sampling after the initial refinement passes.
    pub fn with_initial_conditions(
        mut self,
        initial: impl InitialConditions<M> + 'static,
    ) -> Result<Self, RefinementError> {
        initial.resample(&self.discretization.mesh, &mut self.discretization.vectors)?;
        self.discretization.distribute_constraints()?;
        self.initial = Some(Box::new(initial));
        Ok(self)
    }

    // ── Time loop ──────────────────────────────────────────────

    /// Adapt the mesh if `step` is a refinement step.
    ///
    /// See [`AdaptiveRefinementController::maybe_refine`].
    pub fn maybe_refine(&mut self, step: u64) -> Result<RefinementOutcome, RefinementError> {
        let initial = self
            .initial
            .as_ref()
            .map(|i| &**i as &dyn InitialConditions<M>);
        self.controller.maybe_refine(
            StepId(step),
            &mut self.discretization,
            initial,
            &*self.collective,
        )
    }

    /// Assemble one side of every solution field's equation.
    pub fn assemble<E: CellEvaluator + ?Sized>(
        &self,
        side: EquationSide,
        evaluator: &mut E,
    ) -> Result<AssemblyStats, NumericError> {
        assembly::assemble(
            self.resolver.plan(),
            &self.capabilities,
            self.discretization.mesh(),
            side,
            evaluator,
        )
    }

    /// Assemble every postprocessing field.
    pub fn postprocess<E: CellEvaluator + ?Sized>(
        &self,
        evaluator: &mut E,
    ) -> Result<AssemblyStats, NumericError> {
        assembly::assemble_postprocess(
            self.resolver.plan(),
            &self.capabilities,
            self.discretization.mesh(),
            evaluator,
        )
    }

    /// Nucleation probability per locally owned cell and nucleating field.
    pub fn nucleation_probabilities<E: CellEvaluator + ?Sized>(
        &self,
        evaluator: &mut E,
        volume: f64,
    ) -> Result<Vec<(CellId, FieldId, f64)>, NumericError> {
        assembly::nucleation_probabilities(
            self.resolver.plan(),
            &self.capabilities,
            self.discretization.mesh(),
            evaluator,
            volume,
        )
    }

    // ── Accessors ──────────────────────────────────────────────

    /// The compiled evaluation plan.
    pub fn plan(&self) -> &Arc<CompiledEvalPlan> {
        self.resolver.plan()
    }

    /// The declarations the plan was compiled from.
    pub fn attributes(&self) -> &Arc<AttributeSet> {
        self.resolver.attributes()
    }

    /// The declared fields.
    pub fn table(&self) -> &FieldTable {
        self.resolver.table()
    }

    /// The live solution vectors.
    pub fn solution(&self) -> &SolutionVectorSet {
        self.discretization.vectors()
    }

    /// Mutable access to the solution data, for the time integrator.
    pub fn solution_mut(&mut self) -> &mut SolutionVectorSet {
        self.discretization.vectors_mut()
    }

    /// The mesh.
    pub fn mesh(&self) -> &M {
        self.discretization.mesh()
    }

    /// The constraints.
    pub fn constraints(&self) -> &K {
        self.discretization.constraints()
    }

    /// The refinement criterion.
    pub fn criterion(&self) -> &RefinementCriterion {
        self.controller.criterion()
    }

    /// Refinement state.
    pub fn state(&self) -> RefinementState {
        self.controller.state()
    }

    /// Metrics of the last refinement step that ran.
    pub fn last_metrics(&self) -> &RefinementMetrics {
        self.controller.last_metrics()
    }

    /// This partition's rank.
    pub fn rank(&self) -> usize {
        self.collective.rank()
    }
}

impl<M, K> std::fmt::Debug for Simulation<M, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("fields", &self.resolver.table().solution_count())
            .field("capabilities", &self.capabilities)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}
