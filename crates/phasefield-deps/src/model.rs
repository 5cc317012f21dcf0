//! Model capability traits and the per-cell data they consume.
//!
//! A model is assembled from capabilities fixed at construction: the PDE
//! residuals are mandatory, postprocessing and nucleation are optional.
//! The per-cell evaluator hands each capability a [`CellInputs`] holding
//! exactly what the compiled plan requested, and nothing more.

use indexmap::IndexMap;
use phasefield_core::{CellId, EvalFlags, FieldId, FieldRef, NumericError};

use crate::plan::{CompiledEvalPlan, EquationSide, ResidualTerm};
use crate::token::DependencyKind;

// ── Per-cell data ──────────────────────────────────────────────────

/// Evaluated data of one field at the quadrature points of one cell.
///
/// Slots are laid out by the evaluator; the framework only tracks which
/// ones are present.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvaluatedField {
    value: Option<Vec<f64>>,
    gradient: Option<Vec<f64>>,
    hessian: Option<Vec<f64>>,
    change: Option<Vec<f64>>,
}

impl EvaluatedField {
    /// No data.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: DependencyKind) -> &Option<Vec<f64>> {
        match kind {
            DependencyKind::Value => &self.value,
            DependencyKind::Grad => &self.gradient,
            DependencyKind::Hess => &self.hessian,
            DependencyKind::Change => &self.change,
        }
    }

    /// Store the data for one operator.
    pub fn set(&mut self, kind: DependencyKind, data: Vec<f64>) {
        let slot = match kind {
            DependencyKind::Value => &mut self.value,
            DependencyKind::Grad => &mut self.gradient,
            DependencyKind::Hess => &mut self.hessian,
            DependencyKind::Change => &mut self.change,
        };
        *slot = Some(data);
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, kind: DependencyKind, data: Vec<f64>) -> Self {
        self.set(kind, data);
        self
    }

    /// The data for one operator, if evaluated.
    pub fn get(&self, kind: DependencyKind) -> Option<&[f64]> {
        self.slot(kind).as_deref()
    }

    /// Which operators were evaluated.
    pub fn flags(&self) -> EvalFlags {
        DependencyKind::ALL
            .into_iter()
            .filter(|&k| self.slot(k).is_some())
            .map(DependencyKind::flag)
            .collect()
    }
}

/// Everything evaluated for one cell.
#[derive(Clone, Debug, PartialEq)]
pub struct CellInputs {
    cell: CellId,
    fields: IndexMap<FieldId, EvaluatedField>,
}

impl CellInputs {
    /// Empty inputs for `cell`.
    pub fn new(cell: CellId) -> Self {
        Self {
            cell,
            fields: IndexMap::new(),
        }
    }

    /// The cell the data belongs to.
    pub fn cell(&self) -> CellId {
        self.cell
    }

    /// Add the data of one solution field.
    pub fn insert(&mut self, field: FieldId, data: EvaluatedField) {
        self.fields.insert(field, data);
    }

    /// The data of one field, if any was evaluated.
    pub fn field(&self, field: FieldId) -> Option<&EvaluatedField> {
        self.fields.get(&field)
    }

    /// Flags evaluated per field.
    pub fn evaluated(&self) -> impl Iterator<Item = (FieldId, EvalFlags)> + '_ {
        self.fields.iter().map(|(&id, f)| (id, f.flags()))
    }

    /// The data for `kind` applied to `field`.
    ///
    /// Fails with [`NumericError::MissingEvaluation`] when the plan did not
    /// request it; a model asking for undeclared data is a declaration bug.
    pub fn get(&self, field: FieldId, kind: DependencyKind) -> Result<&[f64], NumericError> {
        let entry = self.fields.get(&field);
        entry
            .and_then(|f| f.get(kind))
            .ok_or_else(|| NumericError::MissingEvaluation {
                field,
                requested: kind.flag(),
                available: entry.map(EvaluatedField::flags).unwrap_or_default(),
            })
    }

    /// `value(field)`.
    pub fn value(&self, field: FieldId) -> Result<&[f64], NumericError> {
        self.get(field, DependencyKind::Value)
    }

    /// `grad(field)`.
    pub fn gradient(&self, field: FieldId) -> Result<&[f64], NumericError> {
        self.get(field, DependencyKind::Grad)
    }

    /// `hess(field)`.
    pub fn hessian(&self, field: FieldId) -> Result<&[f64], NumericError> {
        self.get(field, DependencyKind::Hess)
    }

    /// `change(field)`.
    pub fn change(&self, field: FieldId) -> Result<&[f64], NumericError> {
        self.get(field, DependencyKind::Change)
    }
}

/// The residual terms a model produced for one cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResidualTerms {
    value: Option<Vec<f64>>,
    gradient: Option<Vec<f64>>,
}

impl ResidualTerms {
    /// No terms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one term.
    pub fn set(&mut self, term: ResidualTerm, data: Vec<f64>) {
        match term {
            ResidualTerm::Value => self.value = Some(data),
            ResidualTerm::Gradient => self.gradient = Some(data),
        }
    }

    /// One term, if produced.
    pub fn get(&self, term: ResidualTerm) -> Option<&[f64]> {
        match term {
            ResidualTerm::Value => self.value.as_deref(),
            ResidualTerm::Gradient => self.gradient.as_deref(),
        }
    }

    /// Which terms were produced.
    pub fn flags(&self) -> EvalFlags {
        let mut flags = EvalFlags::empty();
        if self.value.is_some() {
            flags |= ResidualTerm::Value.flag();
        }
        if self.gradient.is_some() {
            flags |= ResidualTerm::Gradient.flag();
        }
        flags
    }
}

// ── Capabilities ───────────────────────────────────────────────────

/// The governing equations of every solution field.
pub trait PdeModel: Send + Sync {
    /// Residual of `owner` (right-hand side).
    fn compute_rhs(
        &self,
        owner: FieldId,
        inputs: &CellInputs,
        residual: &mut ResidualTerms,
    ) -> Result<(), NumericError>;

    /// Linearised operator of `owner` applied to its Newton update.
    ///
    /// Only called for fields with an LHS. The default rejects the call.
    fn compute_lhs(
        &self,
        owner: FieldId,
        inputs: &CellInputs,
        residual: &mut ResidualTerms,
    ) -> Result<(), NumericError> {
        let _ = (inputs, residual);
        Err(NumericError::EvaluationFailed {
            reason: format!("model has no LHS for field {owner}"),
        })
    }
}

/// Computes postprocessing fields from solution fields.
pub trait Postprocessor: Send + Sync {
    /// Residual of the postprocessing field `pp`.
    fn compute_postprocessed(
        &self,
        pp: FieldId,
        inputs: &CellInputs,
        residual: &mut ResidualTerms,
    ) -> Result<(), NumericError>;
}

/// Nucleation probability for fields allowed to nucleate.
pub trait NucleationModel: Send + Sync {
    /// Probability that a nucleus of `field` appears in a region of
    /// `volume` around the cell during one step.
    fn probability(
        &self,
        field: FieldId,
        inputs: &CellInputs,
        volume: f64,
    ) -> Result<f64, NumericError>;
}

/// An optional capability a plan may require.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// A [`Postprocessor`].
    Postprocess,
    /// A [`NucleationModel`].
    Nucleation,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Postprocess => "postprocessor",
            Self::Nucleation => "nucleation model",
        })
    }
}

/// The capabilities a model provides, fixed at construction.
pub struct ModelCapabilities {
    /// Mandatory PDE residuals.
    pub model: Box<dyn PdeModel>,
    /// Postprocessing, if any field is postprocessed.
    pub postprocess: Option<Box<dyn Postprocessor>>,
    /// Nucleation, if any field may nucleate.
    pub nucleation: Option<Box<dyn NucleationModel>>,
}

impl ModelCapabilities {
    /// A model with only PDE residuals.
    pub fn new(model: impl PdeModel + 'static) -> Self {
        Self {
            model: Box::new(model),
            postprocess: None,
            nucleation: None,
        }
    }

    /// Add a postprocessor.
    pub fn with_postprocessor(mut self, pp: impl Postprocessor + 'static) -> Self {
        self.postprocess = Some(Box::new(pp));
        self
    }

    /// Add a nucleation model.
    pub fn with_nucleation(mut self, nucleation: impl NucleationModel + 'static) -> Self {
        self.nucleation = Some(Box::new(nucleation));
        self
    }

    /// The first capability `plan` needs that is not provided.
    pub fn missing_for(&self, plan: &CompiledEvalPlan) -> Option<Capability> {
        if plan.has_postprocessing() && self.postprocess.is_none() {
            return Some(Capability::Postprocess);
        }
        if plan.has_nucleation() && self.nucleation.is_none() {
            return Some(Capability::Nucleation);
        }
        None
    }
}

impl std::fmt::Debug for ModelCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCapabilities")
            .field("postprocess", &self.postprocess.is_some())
            .field("nucleation", &self.nucleation.is_some())
            .finish_non_exhaustive()
    }
}

// ── Evaluation collaborator ────────────────────────────────────────

/// Per-cell evaluation and residual submission.
///
/// Implemented by the finite-element backend. The cell loop calls
/// [`evaluate`](Self::evaluate) with exactly the flags the plan compiled
/// for the equation being assembled.
pub trait CellEvaluator {
    /// Evaluate the requested fields on `cell`.
    fn evaluate(
        &mut self,
        cell: CellId,
        side: EquationSide,
        requests: &IndexMap<FieldId, EvalFlags>,
    ) -> Result<CellInputs, NumericError>;

    /// Accept the residual of `owner` on `cell`.
    fn submit(
        &mut self,
        cell: CellId,
        owner: FieldRef,
        side: EquationSide,
        residual: ResidualTerms,
    ) -> Result<(), NumericError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluated_flags_track_slots() {
        let f = EvaluatedField::new()
            .with(DependencyKind::Value, vec![1.0])
            .with(DependencyKind::Change, vec![0.5]);
        assert_eq!(f.flags(), EvalFlags::VALUE | EvalFlags::CHANGE);
        assert_eq!(f.get(DependencyKind::Change), Some(&[0.5][..]));
        assert_eq!(f.get(DependencyKind::Grad), None);
    }

    #[test]
    fn missing_data_is_an_error() {
        let mut inputs = CellInputs::new(CellId(3));
        inputs.insert(
            FieldId(0),
            EvaluatedField::new().with(DependencyKind::Value, vec![2.0]),
        );
        assert_eq!(inputs.value(FieldId(0)).unwrap(), &[2.0]);
        match inputs.gradient(FieldId(0)) {
            Err(NumericError::MissingEvaluation {
                field,
                requested,
                available,
            }) => {
                assert_eq!(field, FieldId(0));
                assert_eq!(requested, EvalFlags::GRADIENT);
                assert_eq!(available, EvalFlags::VALUE);
            }
            other => panic!("expected MissingEvaluation, got {other:?}"),
        }
        assert!(matches!(
            inputs.value(FieldId(9)),
            Err(NumericError::MissingEvaluation { available, .. }) if available.is_empty()
        ));
    }

    #[test]
    fn residual_flags() {
        let mut r = ResidualTerms::new();
        assert!(r.flags().is_empty());
        r.set(ResidualTerm::Gradient, vec![0.0; 4]);
        assert_eq!(r.flags(), EvalFlags::GRADIENT);
        assert_eq!(r.get(ResidualTerm::Value), None);
    }

    struct NoLhs;
    impl PdeModel for NoLhs {
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
    fn default_lhs_rejects() {
        let inputs = CellInputs::new(CellId(0));
        let mut r = ResidualTerms::new();
        assert!(matches!(
            NoLhs.compute_lhs(FieldId(0), &inputs, &mut r),
            Err(NumericError::EvaluationFailed { .. })
        ));
        let caps = ModelCapabilities::new(NoLhs);
        assert!(format!("{caps:?}").contains("postprocess: false"));
    }
}
