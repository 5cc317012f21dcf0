//! Dependency resolution for phasefield models.
//!
//! Field declarations are collected into an [`AttributeSet`] through the
//! [`AttributeLoader`] hooks, validated once by [`validate`], and compiled
//! into a [`CompiledEvalPlan`]: the exact evaluation flags every residual
//! needs. The plan is mesh-independent and shared read-only for the run.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod attributes;
pub mod model;
pub mod plan;
pub mod resolver;
pub mod token;

pub use attributes::{
    AttributeBuilder, AttributeLoader, AttributeSet, DependencyContext, DependencyDeclaration,
    VariableAttributes,
};
pub use model::{
    Capability, CellEvaluator, CellInputs, EvaluatedField, ModelCapabilities, NucleationModel,
    PdeModel, Postprocessor, ResidualTerms,
};
pub use plan::{CompiledEvalPlan, EquationSide, FieldPlan, ResidualTerm, SidePlan};
pub use resolver::{validate, DependencyError, DependencyResolver, TokenSite};
pub use token::{tokenize, Dependency, DependencyKind, MalformedToken, Token};
