//! Matrix-free cell loops driven by the compiled evaluation plan.
//!
//! For every locally owned cell and every residual, the evaluator is asked
//! for exactly the data the plan requests, the model computes the residual
//! from it, and the residual is handed back to the evaluator. The plan is
//! never recomputed here.

use indexmap::IndexMap;
use phasefield_core::{CellId, EvalFlags, FieldId, FieldKind, FieldRef, NumericError};
use phasefield_deps::{
    CellEvaluator, CellInputs, CompiledEvalPlan, EquationSide, ModelCapabilities, ResidualTerms,
};
use phasefield_mesh::Mesh;

/// Counts from one cell loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    /// Cells visited.
    pub cells: usize,
    /// Residuals submitted.
    pub residuals: usize,
}

/// Assemble one side of every solution field's equation over the locally
/// owned cells of `mesh`.
///
/// Fields without a plan for `side` are skipped (explicit fields have no
/// LHS).
pub fn assemble<M, E>(
    plan: &CompiledEvalPlan,
    capabilities: &ModelCapabilities,
    mesh: &M,
    side: EquationSide,
    evaluator: &mut E,
) -> Result<AssemblyStats, NumericError>
where
    M: Mesh + ?Sized,
    E: CellEvaluator + ?Sized,
{
    let residuals: Vec<(FieldId, IndexMap<FieldId, EvalFlags>, EvalFlags)> = plan
        .table()
        .solution_fields()
        .iter()
        .filter_map(|spec| {
            let sp = plan.side(spec.index, side)?;
            (!sp.is_empty()).then(|| (spec.index, sp.requests(), sp.residual_flags()))
        })
        .collect();

    let mut stats = AssemblyStats::default();
    for cell in mesh.locally_owned_cells() {
        stats.cells += 1;
        for (owner, requests, expected) in &residuals {
            let inputs = evaluate_checked(evaluator, cell, side, requests)?;
            let mut residual = ResidualTerms::new();
            match side {
                EquationSide::Rhs => {
                    capabilities.model.compute_rhs(*owner, &inputs, &mut residual)?
                }
                EquationSide::Lhs => {
                    capabilities.model.compute_lhs(*owner, &inputs, &mut residual)?
                }
            }
            check_residual(*owner, *expected, &residual)?;
            evaluator.submit(
                cell,
                FieldRef {
                    kind: FieldKind::Solution,
                    id: *owner,
                },
                side,
                residual,
            )?;
            stats.residuals += 1;
        }
    }
    Ok(stats)
}

/// Assemble every postprocessing field over the locally owned cells.
///
/// Does nothing when the plan has no postprocessing fields. Fails if it
/// has some but `capabilities` carries no postprocessor.
pub fn assemble_postprocess<M, E>(
    plan: &CompiledEvalPlan,
    capabilities: &ModelCapabilities,
    mesh: &M,
    evaluator: &mut E,
) -> Result<AssemblyStats, NumericError>
where
    M: Mesh + ?Sized,
    E: CellEvaluator + ?Sized,
{
    let mut stats = AssemblyStats::default();
    if !plan.has_postprocessing() {
        return Ok(stats);
    }
    let postprocessor =
        capabilities
            .postprocess
            .as_deref()
            .ok_or_else(|| NumericError::EvaluationFailed {
                reason: "no postprocessor configured".to_string(),
            })?;
    let fields: Vec<_> = plan
        .table()
        .postprocess_fields()
        .iter()
        .filter_map(|spec| {
            let sp = plan.postprocess(spec.index)?;
            Some((spec.index, sp.requests(), sp.residual_flags()))
        })
        .collect();

    for cell in mesh.locally_owned_cells() {
        stats.cells += 1;
        for (pp, requests, expected) in &fields {
            let inputs = evaluate_checked(evaluator, cell, EquationSide::Rhs, requests)?;
            let mut residual = ResidualTerms::new();
            postprocessor.compute_postprocessed(*pp, &inputs, &mut residual)?;
            check_residual(*pp, *expected, &residual)?;
            evaluator.submit(
                cell,
                FieldRef {
                    kind: FieldKind::Postprocess,
                    id: *pp,
                },
                EquationSide::Rhs,
                residual,
            )?;
            stats.residuals += 1;
        }
    }
    Ok(stats)
}

/// Nucleation probability of every nucleating field in every locally
/// owned cell, for a nucleus region of `volume`.
pub fn nucleation_probabilities<M, E>(
    plan: &CompiledEvalPlan,
    capabilities: &ModelCapabilities,
    mesh: &M,
    evaluator: &mut E,
    volume: f64,
) -> Result<Vec<(CellId, FieldId, f64)>, NumericError>
where
    M: Mesh + ?Sized,
    E: CellEvaluator + ?Sized,
{
    if !plan.has_nucleation() {
        return Ok(Vec::new());
    }
    let model = capabilities
        .nucleation
        .as_deref()
        .ok_or_else(|| NumericError::EvaluationFailed {
            reason: "no nucleation model configured".to_string(),
        })?;
    let requests: IndexMap<FieldId, EvalFlags> = plan
        .table()
        .solution_fields()
        .iter()
        .map(|spec| (spec.index, plan.nucleation_flags_for(spec.index)))
        .filter(|(_, flags)| !flags.is_empty())
        .collect();
    let nucleating: Vec<FieldId> = plan.nucleating_fields().collect();

    let mut out = Vec::new();
    for cell in mesh.locally_owned_cells() {
        let inputs = evaluate_checked(evaluator, cell, EquationSide::Rhs, &requests)?;
        for &field in &nucleating {
            let p = model.probability(field, &inputs, volume)?;
            if !p.is_finite() {
                return Err(NumericError::NonFinite {
                    field,
                    cell: Some(cell),
                    value: p,
                });
            }
            out.push((cell, field, p));
        }
    }
    Ok(out)
}

fn evaluate_checked<E: CellEvaluator + ?Sized>(
    evaluator: &mut E,
    cell: CellId,
    side: EquationSide,
    requests: &IndexMap<FieldId, EvalFlags>,
) -> Result<CellInputs, NumericError> {
    let inputs = evaluator.evaluate(cell, side, requests)?;
    for (&field, &requested) in requests {
        let available = inputs
            .field(field)
            .map(|f| f.flags())
            .unwrap_or_default();
        if !available.contains(requested) {
            return Err(NumericError::MissingEvaluation {
                field,
                requested,
                available,
            });
        }
    }
    Ok(inputs)
}

fn check_residual(
    owner: FieldId,
    expected: EvalFlags,
    residual: &ResidualTerms,
) -> Result<(), NumericError> {
    let produced = residual.flags();
    if produced == expected {
        Ok(())
    } else {
        Err(NumericError::EvaluationFailed {
            reason: format!("residual of field {owner} produced {produced}, plan declares {expected}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasefield_core::{FieldRank, PdeType};
    use phasefield_deps::{
        AttributeSet, DependencyContext, DependencyKind, EvaluatedField, PdeModel, ResidualTerm,
    };
    use phasefield_mesh::IntervalMesh;

    /// Evaluates every requested flag with one zero per component and
    /// records what it was asked.
    #[derive(Default)]
    struct Recorder {
        evaluated: Vec<(CellId, EquationSide, Vec<(FieldId, EvalFlags)>)>,
        submitted: Vec<(CellId, FieldRef, EquationSide, EvalFlags)>,
        withhold: EvalFlags,
    }

    impl CellEvaluator for Recorder {
        fn evaluate(
            &mut self,
            cell: CellId,
            side: EquationSide,
            requests: &IndexMap<FieldId, EvalFlags>,
        ) -> Result<CellInputs, NumericError> {
            self.evaluated.push((
                cell,
                side,
                requests.iter().map(|(&f, &fl)| (f, fl)).collect(),
            ));
            let mut inputs = CellInputs::new(cell);
            for (&field, &flags) in requests {
                let mut data = EvaluatedField::new();
                for kind in DependencyKind::ALL {
                    if flags.contains(kind.flag()) && !self.withhold.contains(kind.flag()) {
                        data.set(kind, vec![0.0]);
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
            self.submitted.push((cell, owner, side, residual.flags()));
            Ok(())
        }
    }

    /// `c` explicit reading `n`; `n` implicit with an LHS.
    fn plan() -> CompiledEvalPlan {
        let mut set = AttributeSet::new();
        let mut vars = set.solution_builder();
        vars.set_variable_name(0, "c")
            .set_variable_type(0, FieldRank::Scalar)
            .set_variable_equation_type(0, PdeType::ExplicitTimeDependent)
            .set_dependencies(0, DependencyContext::ValueRhs, "n, grad(n)")
            .set_variable_name(1, "n")
            .set_variable_type(1, FieldRank::Scalar)
            .set_variable_equation_type(1, PdeType::ImplicitTimeDependent)
            .set_dependencies(1, DependencyContext::ValueRhs, "n")
            .set_dependencies(1, DependencyContext::ValueLhs, "n, change(n)");
        phasefield_deps::validate(&set).unwrap()
    }

    struct ValueOnly;

    impl PdeModel for ValueOnly {
        fn compute_rhs(
            &self,
            owner: FieldId,
            inputs: &CellInputs,
            residual: &mut ResidualTerms,
        ) -> Result<(), NumericError> {
            let n = inputs.value(FieldId(1))?;
            if owner == FieldId(0) {
                inputs.gradient(FieldId(1))?;
            }
            residual.set(ResidualTerm::Value, n.to_vec());
            Ok(())
        }

        fn compute_lhs(
            &self,
            _owner: FieldId,
            inputs: &CellInputs,
            residual: &mut ResidualTerms,
        ) -> Result<(), NumericError> {
            residual.set(ResidualTerm::Value, inputs.change(FieldId(1))?.to_vec());
            Ok(())
        }
    }

    #[test]
    fn rhs_requests_exactly_the_plan() {
        let plan = plan();
        let caps = ModelCapabilities::new(ValueOnly);
        let mesh = IntervalMesh::new(0.0, 1.0, 3).unwrap();
        let mut rec = Recorder::default();
        let stats = assemble(&plan, &caps, &mesh, EquationSide::Rhs, &mut rec).unwrap();
        assert_eq!(stats, AssemblyStats { cells: 3, residuals: 6 });
        assert_eq!(
            rec.evaluated[0].2,
            vec![(FieldId(1), EvalFlags::VALUE | EvalFlags::GRADIENT)]
        );
        assert_eq!(rec.evaluated[1].2, vec![(FieldId(1), EvalFlags::VALUE)]);
        assert!(rec
            .submitted
            .iter()
            .all(|&(_, _, side, flags)| side == EquationSide::Rhs && flags == EvalFlags::VALUE));
    }

    #[test]
    fn lhs_skips_explicit_fields() {
        let plan = plan();
        let caps = ModelCapabilities::new(ValueOnly);
        let mesh = IntervalMesh::new(0.0, 1.0, 2).unwrap();
        let mut rec = Recorder::default();
        let stats = assemble(&plan, &caps, &mesh, EquationSide::Lhs, &mut rec).unwrap();
        assert_eq!(stats.residuals, 2);
        assert!(rec.submitted.iter().all(|&(_, owner, _, _)| owner.id == FieldId(1)));
        assert_eq!(
            rec.evaluated[0].2,
            vec![(FieldId(1), EvalFlags::VALUE | EvalFlags::CHANGE)]
        );
    }

    #[test]
    fn evaluator_missing_data_rejected() {
        let plan = plan();
        let caps = ModelCapabilities::new(ValueOnly);
        let mesh = IntervalMesh::new(0.0, 1.0, 1).unwrap();
        let mut rec = Recorder {
            withhold: EvalFlags::GRADIENT,
            ..Default::default()
        };
        match assemble(&plan, &caps, &mesh, EquationSide::Rhs, &mut rec) {
            Err(NumericError::MissingEvaluation {
                field,
                requested,
                available,
            }) => {
                assert_eq!(field, FieldId(1));
                assert_eq!(requested, EvalFlags::VALUE | EvalFlags::GRADIENT);
                assert_eq!(available, EvalFlags::VALUE);
            }
            other => panic!("expected MissingEvaluation, got {other:?}"),
        }
        assert!(rec.submitted.is_empty());
    }

    struct NoResidual;

    impl PdeModel for NoResidual {
        fn compute_rhs(
            &self,
            _owner: FieldId,
            _inputs: &CellInputs,
            _residual: &mut ResidualTerms,
        ) -> Result<(), NumericError> {
            Ok(())
        }
    }

    #[test]
    fn residual_terms_must_match_plan() {
        let plan = plan();
        let caps = ModelCapabilities::new(NoResidual);
        let mesh = IntervalMesh::new(0.0, 1.0, 1).unwrap();
        let mut rec = Recorder::default();
        assert!(matches!(
            assemble(&plan, &caps, &mesh, EquationSide::Rhs, &mut rec),
            Err(NumericError::EvaluationFailed { .. })
        ));
    }

    #[test]
    fn no_postprocessing_is_a_no_op() {
        let plan = plan();
        let caps = ModelCapabilities::new(ValueOnly);
        let mesh = IntervalMesh::new(0.0, 1.0, 2).unwrap();
        let mut rec = Recorder::default();
        let stats = assemble_postprocess(&plan, &caps, &mesh, &mut rec).unwrap();
        assert_eq!(stats, AssemblyStats::default());
        assert!(nucleation_probabilities(&plan, &caps, &mesh, &mut rec, 1.0)
            .unwrap()
            .is_empty());
    }
}
