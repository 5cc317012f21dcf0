//! Adaptive refinement state machine.
//!
//! [`AdaptiveRefinementController::maybe_refine`] runs once per time step.
//! On refinement steps it classifies the locally owned cells, exchanges the
//! resulting flags with the other partitions, plans the new layout, moves
//! every solution vector onto it, and only then swaps the mesh. Any failure
//! before the swap leaves mesh and vectors as they were; any failure at all
//! moves the controller to [`RefinementState::Aborted`].

use std::time::Instant;

use phasefield_core::{MeshGeneration, StepId};
use phasefield_mesh::{ConstraintSet, LayoutChange, Mesh};

use crate::collective::Collective;
use crate::config::RefinementCriterion;
use crate::discretization::Discretization;
use crate::error::{RefinementError, RefinementStage};
use crate::initial::InitialConditions;
use crate::marking::mark_cells;
use crate::metrics::RefinementMetrics;
use crate::predicate::{AnyOf, RefinementPredicate, WindowPredicate};
use crate::transfer::SolutionTransferCoordinator;

/// Where the controller is in its refinement cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefinementState {
    /// No refinement in progress.
    #[default]
    Stable,
    /// Cells are being classified.
    Marking,
    /// The new layout is being built and vectors moved onto it.
    Transferring,
    /// A refinement event failed. Terminal.
    Aborted,
}

/// What a call to [`maybe_refine`](AdaptiveRefinementController::maybe_refine) did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefinementOutcome {
    /// The step is not a refinement step.
    Skipped,
    /// Marking ran on every partition but no cell changed.
    Unchanged,
    /// The layout changed.
    Changed {
        /// The new layout.
        generation: MeshGeneration,
        /// Marking passes that ran.
        passes: u32,
    },
}

/// Drives marking, transfer and the mesh swap on refinement steps.
#[derive(Debug)]
pub struct AdaptiveRefinementController {
    criterion: RefinementCriterion,
    predicate: AnyOf,
    transfer: SolutionTransferCoordinator,
    state: RefinementState,
    last_metrics: RefinementMetrics,
}

impl AdaptiveRefinementController {
    /// A controller marking cells by the windows of `criterion`.
    ///
    /// The criterion is assumed validated.
    pub fn new(criterion: RefinementCriterion) -> Self {
        let predicate = AnyOf::new().with(WindowPredicate::from_criterion(&criterion));
        Self {
            criterion,
            predicate,
            transfer: SolutionTransferCoordinator::new(),
            state: RefinementState::Stable,
            last_metrics: RefinementMetrics::default(),
        }
    }

    /// Also mark cells where `predicate` holds.
    pub fn with_predicate(mut self, predicate: impl RefinementPredicate + 'static) -> Self {
        self.predicate.push(predicate);
        self
    }

    /// The criterion.
    pub fn criterion(&self) -> &RefinementCriterion {
        &self.criterion
    }

    /// The combined marking predicate.
    pub fn predicate(&self) -> &AnyOf {
        &self.predicate
    }

    /// Current state.
    pub fn state(&self) -> RefinementState {
        self.state
    }

    /// Whether a refinement event has failed.
    pub fn is_aborted(&self) -> bool {
        self.state == RefinementState::Aborted
    }

    /// Metrics from the most recent event that ran marking.
    pub fn last_metrics(&self) -> &RefinementMetrics {
        &self.last_metrics
    }

    /// Run the refinement cycle if `step` is a refinement step.
    ///
    /// At step 0 up to `max_level - min_level` passes run, stopping at the
    /// first pass that changes nothing; after each changing pass the
    /// initial conditions, if given, are re-sampled on the new layout.
    /// Constraints are rebuilt and re-applied after every layout change.
    ///
    /// Every partition of `collective` must call this with the same step.
    pub fn maybe_refine<M, K>(
        &mut self,
        step: StepId,
        discretization: &mut Discretization<M, K>,
        initial: Option<&dyn InitialConditions<M>>,
        collective: &dyn Collective,
    ) -> Result<RefinementOutcome, RefinementError>
    where
        M: Mesh,
        K: ConstraintSet<M>,
    {
        if self.is_aborted() {
            return Err(RefinementError::Aborted);
        }
        if !self.criterion.fires_at(step.0) {
            return Ok(RefinementOutcome::Skipped);
        }

        let start = Instant::now();
        let mut metrics = RefinementMetrics {
            dofs_before: discretization.mesh.n_dofs(),
            layout_changes: self.last_metrics.layout_changes,
            aborts: self.last_metrics.aborts,
            ..Default::default()
        };
        let passes = if step.0 == 0 {
            self.criterion.initial_passes().max(1)
        } else {
            1
        };

        let result = self.run(step, passes, discretization, initial, collective, &mut metrics);
        metrics.dofs_after = discretization.mesh.n_dofs();
        metrics.total_us = start.elapsed().as_micros() as u64;

        match result {
            Ok(outcome) => {
                if let RefinementOutcome::Changed { generation, passes } = outcome {
                    metrics.layout_changes += 1;
                    log::info!(
                        "step {step}: generation {generation} after {passes} pass(es), \
                         {} refined, {} coarsened, {} -> {} dofs",
                        metrics.cells_refined,
                        metrics.cells_coarsened,
                        metrics.dofs_before,
                        metrics.dofs_after
                    );
                }
                self.state = RefinementState::Stable;
                self.last_metrics = metrics;
                Ok(outcome)
            }
            Err(e) => {
                self.state = RefinementState::Aborted;
                metrics.aborts += 1;
                self.last_metrics = metrics;
                log::error!(
                    "step {step}: refinement aborted on rank {}: {e}",
                    collective.rank()
                );
                Err(e)
            }
        }
    }

    fn run<M, K>(
        &mut self,
        step: StepId,
        passes: u32,
        discretization: &mut Discretization<M, K>,
        initial: Option<&dyn InitialConditions<M>>,
        collective: &dyn Collective,
        metrics: &mut RefinementMetrics,
    ) -> Result<RefinementOutcome, RefinementError>
    where
        M: Mesh,
        K: ConstraintSet<M>,
    {
        let mut changed = false;
        for pass in 0..passes {
            metrics.passes += 1;
            let pass_changed = self.pass(discretization, collective, metrics)?;
            changed |= pass_changed;
            if pass_changed && step.0 == 0 {
                if let Some(initial) = initial {
                    initial.resample(&discretization.mesh, &mut discretization.vectors)?;
                }
            }
            // At step 0 the first pass re-applies constraints even when the
            // layout is kept.
            if pass_changed || (step.0 == 0 && pass == 0) {
                discretization.distribute_constraints()?;
            }
            if !pass_changed {
                break;
            }
        }
        Ok(if changed {
            RefinementOutcome::Changed {
                generation: discretization.mesh.generation(),
                passes: metrics.passes,
            }
        } else {
            RefinementOutcome::Unchanged
        })
    }

    /// One mark-transfer-swap cycle. Returns whether the layout changed.
    fn pass<M, K>(
        &mut self,
        d: &mut Discretization<M, K>,
        collective: &dyn Collective,
        metrics: &mut RefinementMetrics,
    ) -> Result<bool, RefinementError>
    where
        M: Mesh,
        K: ConstraintSet<M>,
    {
        // 1. Classify owned cells, then make sure every partition managed to.
        self.state = RefinementState::Marking;
        let marking_start = Instant::now();
        let local = mark_cells(&d.mesh, &d.vectors, &self.predicate, &self.criterion);
        let local = agree(collective, local)?;
        metrics.cells_marked += local.marked;

        // 2. Every replica applies every partition's flags.
        let flags = collective.all_gather_flags(local.flags)?;
        d.mesh.clear_flags();
        let applied = flags
            .into_iter()
            .try_for_each(|(cell, flag)| d.mesh.set_flag(cell, flag))
            .map_err(RefinementError::mesh(RefinementStage::Planning));
        metrics.marking_us += marking_start.elapsed().as_micros() as u64;

        // 3. Plan and transfer without touching the live state.
        self.state = RefinementState::Transferring;
        let transfer_start = Instant::now();
        let transfer = self.transfer;
        let staged = applied.and_then(|()| {
            let change = d
                .mesh
                .plan_refinement()
                .map_err(RefinementError::mesh(RefinementStage::Planning))?;
            if change.is_identity() {
                return Ok(None);
            }
            let token = transfer.prepare(&d.mesh, &d.vectors)?;
            let vectors = transfer.commit(token, &change)?;
            Ok(Some((change, vectors)))
        });
        let staged = match agree(collective, staged) {
            Ok(staged) => staged,
            Err(e) => {
                d.mesh.clear_flags();
                return Err(e);
            }
        };
        let Some((change, vectors)) = staged else {
            d.mesh.clear_flags();
            metrics.transfer_us += transfer_start.elapsed().as_micros() as u64;
            return Ok(false);
        };

        // 4. Swap. The vectors are replaced only once the mesh accepted
        //    the change. A failure past this point cannot be rolled back,
        //    but every partition still hears of it.
        let (refined, coarsened) = (change.refined_cells(), change.coarsened_cells());
        let swapped = d
            .mesh
            .execute_refinement(change)
            .map_err(RefinementError::mesh(RefinementStage::Execute))
            .and_then(|()| {
                d.vectors = vectors;
                d.constraints
                    .rebuild(&d.mesh)
                    .map_err(RefinementError::mesh(RefinementStage::Constraints))
            });
        agree(collective, swapped)?;

        metrics.cells_refined += refined;
        metrics.cells_coarsened += coarsened;
        metrics.transfer_us += transfer_start.elapsed().as_micros() as u64;
        Ok(true)
    }
}

/// Succeed only if every partition's `local` result succeeded.
///
/// A local failure is reported to the peers and returned as is; a peer's
/// failure becomes [`RefinementError::PartitionFailed`].
fn agree<T>(
    collective: &dyn Collective,
    local: Result<T, RefinementError>,
) -> Result<T, RefinementError> {
    match local {
        Ok(value) => {
            if collective.all_agree(true)? {
                Ok(value)
            } else {
                Err(RefinementError::PartitionFailed {
                    rank: collective.rank(),
                })
            }
        }
        Err(e) => {
            if let Err(ce) = collective.all_agree(false) {
                log::warn!(
                    "rank {}: could not report failure to peers: {ce}",
                    collective.rank()
                );
            }
            Err(e)
        }
    }
}
