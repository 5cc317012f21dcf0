//! Reusable declaration and model fixtures.
//!
//! - [`CoupledLoader`]: explicit `c` coupled to implicit `n`, with optional
//!   postprocessing and nucleation sections.
//! - [`CoupledModel`]: residuals for [`CoupledLoader`] that read exactly
//!   the declared dependencies.
//! - [`SumPostprocessor`]: `f_tot = c + n`.
//! - [`ConstantNucleation`]: a fixed nucleation probability.

use phasefield_core::{FieldId, FieldRank, NumericError, PdeType};
use phasefield_deps::{
    AttributeBuilder, AttributeLoader, CellInputs, NucleationModel, PdeModel, Postprocessor,
    ResidualTerm, ResidualTerms,
};

/// Index of `c` in [`CoupledLoader`].
pub const C: FieldId = FieldId(0);
/// Index of `n` in [`CoupledLoader`].
pub const N: FieldId = FieldId(1);
/// Index of `f_tot` in [`CoupledLoader::with_postprocessing`].
pub const F_TOT: FieldId = FieldId(0);

/// Declares `c` (explicit, RHS value `c, n`, RHS gradient `grad(n)`) and
/// `n` (implicit, RHS value `n`, LHS value `n, change(n)`).
#[derive(Clone, Copy, Debug, Default)]
pub struct CoupledLoader {
    pub postprocess: bool,
    pub nucleation: bool,
}

impl CoupledLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also declare `f_tot` with value dependencies `c, n` and an
    /// integral output.
    pub fn with_postprocessing(mut self) -> Self {
        self.postprocess = true;
        self
    }

    /// Let `n` nucleate, with the probability reading the value of `c`.
    pub fn with_nucleation(mut self) -> Self {
        self.nucleation = true;
        self
    }
}

impl AttributeLoader for CoupledLoader {
    fn load_variable_attributes(&self, vars: &mut AttributeBuilder<'_>) {
        vars.set_variable_name(0, "c")
            .set_variable_type(0, FieldRank::Scalar)
            .set_variable_equation_type(0, PdeType::ExplicitTimeDependent)
            .set_dependencies_value_term_rhs(0, "c, n")
            .set_dependencies_gradient_term_rhs(0, "grad(n)");
        vars.set_variable_name(1, "n")
            .set_variable_type(1, FieldRank::Scalar)
            .set_variable_equation_type(1, PdeType::ImplicitTimeDependent)
            .set_dependencies_value_term_rhs(1, "n")
            .set_dependencies_value_term_lhs(1, "n, change(n)");
        if self.nucleation {
            vars.set_need_value_nucleation(0, true)
                .set_allowed_to_nucleate(1, true);
        }
    }

    fn load_postprocessor_variable_attributes(&self, pp: &mut AttributeBuilder<'_>) {
        if self.postprocess {
            pp.set_variable_name(0, "f_tot")
                .set_dependencies_value_term_rhs(0, "c, n")
                .set_output_integral(0, true);
        }
    }
}

/// Residuals of the [`CoupledLoader`] system.
///
/// Every input the declarations name is read, so an evaluator that skips
/// a requested flag makes the model fail.
#[derive(Clone, Copy, Debug, Default)]
pub struct CoupledModel;

impl PdeModel for CoupledModel {
    fn compute_rhs(
        &self,
        owner: FieldId,
        inputs: &CellInputs,
        residual: &mut ResidualTerms,
    ) -> Result<(), NumericError> {
        match owner {
            C => {
                let c = inputs.value(C)?;
                let n = inputs.value(N)?;
                let value = c.iter().zip(n).map(|(c, n)| c - n).collect();
                residual.set(ResidualTerm::Value, value);
                residual.set(ResidualTerm::Gradient, inputs.gradient(N)?.to_vec());
            }
            N => residual.set(ResidualTerm::Value, inputs.value(N)?.to_vec()),
            other => return Err(unknown(other)),
        }
        Ok(())
    }

    fn compute_lhs(
        &self,
        owner: FieldId,
        inputs: &CellInputs,
        residual: &mut ResidualTerms,
    ) -> Result<(), NumericError> {
        if owner != N {
            return Err(unknown(owner));
        }
        let n = inputs.value(N)?;
        let dn = inputs.change(N)?;
        residual.set(
            ResidualTerm::Value,
            n.iter().zip(dn).map(|(n, dn)| n * dn).collect(),
        );
        Ok(())
    }
}

fn unknown(owner: FieldId) -> NumericError {
    NumericError::EvaluationFailed {
        reason: format!("no equation for field {owner}"),
    }
}

/// `f_tot = c + n`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SumPostprocessor;

impl Postprocessor for SumPostprocessor {
    fn compute_postprocessed(
        &self,
        _pp: FieldId,
        inputs: &CellInputs,
        residual: &mut ResidualTerms,
    ) -> Result<(), NumericError> {
        let c = inputs.value(C)?;
        let n = inputs.value(N)?;
        residual.set(
            ResidualTerm::Value,
            c.iter().zip(n).map(|(c, n)| c + n).collect(),
        );
        Ok(())
    }
}

/// Nucleation with a fixed probability per unit volume.
///
/// Reads the value of `c` so the nucleation flags are exercised.
#[derive(Clone, Copy, Debug)]
pub struct ConstantNucleation {
    pub rate: f64,
}

impl NucleationModel for ConstantNucleation {
    fn probability(
        &self,
        _field: FieldId,
        inputs: &CellInputs,
        volume: f64,
    ) -> Result<f64, NumericError> {
        inputs.value(C)?;
        Ok((self.rate * volume).min(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasefield_core::EvalFlags;
    use phasefield_deps::{DependencyResolver, EquationSide};

    #[test]
    fn coupled_plan_flags() {
        let resolver = DependencyResolver::from_loader(&CoupledLoader::new()).unwrap();
        let plan = resolver.plan();
        assert_eq!(
            plan.flags_for(N, EquationSide::Rhs),
            EvalFlags::VALUE | EvalFlags::GRADIENT
        );
        assert_eq!(
            plan.flags_for(N, EquationSide::Lhs),
            EvalFlags::VALUE | EvalFlags::CHANGE
        );
        assert_eq!(plan.flags_for(C, EquationSide::Rhs), EvalFlags::VALUE);
        assert!(!plan.has_postprocessing());
        assert!(!plan.has_nucleation());
    }

    #[test]
    fn optional_sections() {
        let loader = CoupledLoader::new().with_postprocessing().with_nucleation();
        let resolver = DependencyResolver::from_loader(&loader).unwrap();
        let plan = resolver.plan();
        assert_eq!(plan.integral_fields().collect::<Vec<_>>(), vec![F_TOT]);
        assert_eq!(plan.nucleating_fields().collect::<Vec<_>>(), vec![N]);
        assert_eq!(plan.nucleation_flags_for(C), EvalFlags::VALUE);
    }
}
