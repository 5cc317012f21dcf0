//! Benchmark profiles and utilities for phasefield.
//!
//! Provides pre-built inputs for benchmarking:
//!
//! - [`chain_attributes`]: `n` coupled fields, alternating explicit and
//!   implicit, each reading its neighbours
//! - [`interface_discretization`]: one noisy interface on an interval mesh
//! - [`interface_criterion`]: the window that tracks that interface

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use phasefield_core::{FieldId, PdeType, SolutionVector, SolutionVectorSet, VectorRole};
use phasefield_deps::AttributeSet;
use phasefield_engine::{Discretization, RefinementCriterion};
use phasefield_mesh::{IntervalMesh, Mesh, Unconstrained};
use phasefield_test_utils::seeded_values;

/// Declare `fields` coupled fields `f0, f1, ...`.
///
/// Field `i` has RHS value dependencies on itself and `f{i-1}` and an RHS
/// gradient dependency on `f{i+1}`. Odd fields are implicit with LHS
/// `f{i}, change(f{i})`.
pub fn chain_attributes(fields: u32) -> AttributeSet {
    let mut set = AttributeSet::new();
    let mut vars = set.solution_builder();
    for i in 0..fields {
        let name = format!("f{i}");
        let value = match i {
            0 => name.clone(),
            _ => format!("{name}, f{}", i - 1),
        };
        vars.set_variable_name(i, &name)
            .set_dependencies_value_term_rhs(i, &value);
        if i + 1 < fields {
            vars.set_dependencies_gradient_term_rhs(i, &format!("grad(f{})", i + 1));
        }
        if i % 2 == 1 {
            vars.set_variable_equation_type(i, PdeType::ImplicitTimeDependent)
                .set_dependencies_value_term_lhs(i, &format!("{name}, change({name})"));
        }
    }
    set
}

/// `tanh((x - 0.5) / 0.02)` plus seeded noise of amplitude `1e-3`, as
/// field 0 on `cells` coarse cells of `[0, 1]`.
///
/// # Panics
///
/// Panics if `cells` is zero.
pub fn interface_discretization(
    cells: u32,
    seed: u64,
) -> Discretization<IntervalMesh, Unconstrained> {
    let mesh = IntervalMesh::new(0.0, 1.0, cells).unwrap();
    let noise = seeded_values(seed, mesh.n_dofs(), -1e-3, 1e-3);
    let data = mesh
        .interpolate(1, |x, _| ((x - 0.5) / 0.02).tanh())
        .iter()
        .zip(&noise)
        .map(|(u, n)| u + n)
        .collect();
    let vectors: SolutionVectorSet = [SolutionVector::new(
        FieldId(0),
        VectorRole::Current,
        1,
        mesh.generation(),
        data,
    )]
    .into_iter()
    .collect();
    Discretization::new(mesh, Unconstrained, vectors).unwrap()
}

/// Refine field 0 inside `(-0.99, 0.99)` up to `max_level`, every step.
pub fn interface_criterion(max_level: u32) -> RefinementCriterion {
    RefinementCriterion::new(0, max_level, 1).with_window(FieldId(0), -0.99, 0.99)
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasefield_core::{EvalFlags, FieldSpec, FieldTable};
    use phasefield_deps::{validate, EquationSide};

    #[test]
    fn chain_attributes_validate() {
        let plan = validate(&chain_attributes(16)).unwrap();
        assert_eq!(plan.solution_count(), 16);
        assert_eq!(plan.lhs_fields().count(), 8);
        assert_eq!(
            plan.flags_for(FieldId(3), EquationSide::Rhs),
            EvalFlags::VALUE | EvalFlags::GRADIENT
        );
    }

    #[test]
    fn interface_discretization_is_deterministic() {
        let a = interface_discretization(64, 42);
        let b = interface_discretization(64, 42);
        assert_eq!(a.vectors(), b.vectors());
        assert_eq!(a.mesh().n_dofs(), 128);
    }

    #[test]
    fn interface_criterion_names_field_zero() {
        let table = FieldTable::new(vec![FieldSpec::new(FieldId(0), "u")], Vec::new()).unwrap();
        interface_criterion(6).validate(&table).unwrap();
    }
}
