//! Phasefield: dependency resolution and adaptive mesh refinement for
//! phase-field PDE models.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! phasefield sub-crates. For most users, adding `phasefield` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use phasefield::prelude::*;
//!
//! // One field `u` whose residual reads its value and gradient.
//! struct Heat;
//! impl AttributeLoader for Heat {
//!     fn load_variable_attributes(&self, vars: &mut AttributeBuilder<'_>) {
//!         vars.set_variable_name(0, "u")
//!             .set_dependencies_value_term_rhs(0, "u")
//!             .set_dependencies_gradient_term_rhs(0, "grad(u)");
//!     }
//! }
//!
//! struct HeatModel;
//! impl PdeModel for HeatModel {
//!     fn compute_rhs(
//!         &self,
//!         owner: FieldId,
//!         inputs: &CellInputs,
//!         residual: &mut ResidualTerms,
//!     ) -> Result<(), NumericError> {
//!         residual.set(ResidualTerm::Value, inputs.value(owner)?.to_vec());
//!         let flux = inputs.gradient(owner)?.iter().map(|g| -0.1 * g).collect();
//!         residual.set(ResidualTerm::Gradient, flux);
//!         Ok(())
//!     }
//! }
//!
//! // Refine wherever u lies in (-0.9, 0.9), up to level 3, every 10 steps.
//! let criterion = RefinementCriterion::new(0, 3, 10).with_window(FieldId(0), -0.9, 0.9);
//! let mesh = IntervalMesh::new(0.0, 1.0, 4).unwrap();
//! let mut sim = Simulation::init(
//!     &Heat,
//!     ModelCapabilities::new(HeatModel),
//!     criterion,
//!     mesh,
//!     Unconstrained,
//! )
//! .unwrap();
//! assert_eq!(
//!     sim.plan().flags_for(FieldId(0), EquationSide::Rhs),
//!     EvalFlags::VALUE | EvalFlags::GRADIENT
//! );
//!
//! // The zero initial state lies inside the window everywhere.
//! let outcome = sim.maybe_refine(10).unwrap();
//! assert!(matches!(outcome, RefinementOutcome::Changed { passes: 1, .. }));
//! assert_eq!(sim.mesh().n_dofs(), 16);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `phasefield-core` | IDs, field table, evaluation flags, solution vectors |
//! | [`deps`] | `phasefield-deps` | Attribute declarations, dependency resolver, model traits |
//! | [`mesh`] | `phasefield-mesh` | Mesh and constraint traits, interval mesh |
//! | [`engine`] | `phasefield-engine` | Refinement controller, solution transfer, simulation driver |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and IDs (`phasefield-core`).
///
/// Contains field specifications and the [`types::FieldTable`],
/// [`types::EvalFlags`], and [`types::SolutionVectorSet`].
pub use phasefield_core as types;

/// Attribute declarations and dependency resolution (`phasefield-deps`).
///
/// Declare fields through an [`deps::AttributeLoader`] and compile them
/// into a [`deps::CompiledEvalPlan`] with [`deps::DependencyResolver`].
pub use phasefield_deps as deps;

/// Mesh collaborator interface (`phasefield-mesh`).
///
/// Provides the [`mesh::Mesh`] and [`mesh::ConstraintSet`] traits and the
/// reference [`mesh::IntervalMesh`].
pub use phasefield_mesh as mesh;

/// Refinement, transfer, and the simulation driver (`phasefield-engine`).
///
/// [`engine::Simulation`] wires a resolved plan to an
/// [`engine::AdaptiveRefinementController`].
pub use phasefield_engine as engine;

/// Common imports for typical phasefield usage.
///
/// ```rust
/// use phasefield::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use phasefield_core::{
        CellId, EvalFlags, FieldId, FieldRef, MeshGeneration, NumericError, PdeType,
        SolutionVector, SolutionVectorSet, VectorRole,
    };

    // Declarations and models
    pub use phasefield_deps::{
        AttributeBuilder, AttributeLoader, CellEvaluator, CellInputs, CompiledEvalPlan,
        DependencyError, EquationSide, EvaluatedField, ModelCapabilities, PdeModel,
        ResidualTerm, ResidualTerms,
    };

    // Mesh
    pub use phasefield_mesh::{IntervalMesh, Mesh, RefinementFlag, Unconstrained};

    // Engine
    pub use phasefield_engine::{
        RefinementCriterion, RefinementError, RefinementOutcome, RefinementState, Simulation,
    };
}
