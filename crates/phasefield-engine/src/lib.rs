//! Adaptive refinement and simulation driver for phasefield models.
//!
//! Provides the [`Simulation`] that validates a model at startup, runs the
//! plan-driven cell loops, and adapts the mesh through the
//! [`AdaptiveRefinementController`]. Solution vectors are carried across
//! every layout change by the [`SolutionTransferCoordinator`], and
//! partitions agree on every refinement decision through a [`Collective`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod assembly;
pub mod collective;
pub mod config;
pub mod controller;
pub mod discretization;
pub mod error;
pub mod initial;
pub mod marking;
pub mod metrics;
pub mod predicate;
pub mod simulation;
pub mod transfer;

pub use assembly::AssemblyStats;
pub use collective::{ChannelCollective, Collective, FlagList, SerialCollective};
pub use config::{ConfigurationError, NonFinitePolicy, RefinementCriterion};
pub use controller::{AdaptiveRefinementController, RefinementOutcome, RefinementState};
pub use discretization::Discretization;
pub use error::{CollectiveError, RefinementError, RefinementStage};
pub use initial::{InitialConditions, IntervalProfile};
pub use marking::{mark_cells, CellAction, Marking};
pub use metrics::RefinementMetrics;
pub use predicate::{AnyOf, BandPredicate, CellView, RefinementPredicate, WindowPredicate};
pub use simulation::Simulation;
pub use transfer::{SolutionTransferCoordinator, TransferToken};
