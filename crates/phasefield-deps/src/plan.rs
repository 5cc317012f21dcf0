//! The compiled evaluation plan.
//!
//! [`CompiledEvalPlan`] is produced once by
//! [`validate`](crate::resolver::validate) and shared read-only for the rest
//! of the run. It depends only on the declarations, never on the mesh, so it
//! survives every refinement unchanged.

use std::fmt;

use indexmap::IndexMap;
use phasefield_core::{EvalFlags, FieldId, FieldTable};

/// Which side of the linearised system is being assembled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EquationSide {
    /// The residual (right-hand side).
    Rhs,
    /// The linearised operator applied to a Newton update (left-hand side).
    Lhs,
}

impl fmt::Display for EquationSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rhs => "RHS",
            Self::Lhs => "LHS",
        })
    }
}

/// A term of a residual: tested against basis values or basis gradients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResidualTerm {
    /// Multiplies the test function.
    Value,
    /// Multiplies the test-function gradient.
    Gradient,
}

impl ResidualTerm {
    /// The residual flag submitted for this term.
    pub fn flag(self) -> EvalFlags {
        match self {
            Self::Value => EvalFlags::VALUE,
            Self::Gradient => EvalFlags::GRADIENT,
        }
    }
}

// ── Per-equation plans ─────────────────────────────────────────────

/// Dependencies of one residual (one owner, one side).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SidePlan {
    value_term: IndexMap<FieldId, EvalFlags>,
    gradient_term: IndexMap<FieldId, EvalFlags>,
}

impl SidePlan {
    pub(crate) fn add(&mut self, term: ResidualTerm, field: FieldId, flags: EvalFlags) {
        let map = match term {
            ResidualTerm::Value => &mut self.value_term,
            ResidualTerm::Gradient => &mut self.gradient_term,
        };
        *map.entry(field).or_default() |= flags;
    }

    /// Solution fields read by one term, in declaration order of the tokens.
    pub fn term(&self, term: ResidualTerm) -> &IndexMap<FieldId, EvalFlags> {
        match term {
            ResidualTerm::Value => &self.value_term,
            ResidualTerm::Gradient => &self.gradient_term,
        }
    }

    /// Which residual terms exist: `VALUE` if the value term has
    /// dependencies, `GRADIENT` if the gradient term has.
    pub fn residual_flags(&self) -> EvalFlags {
        let mut flags = EvalFlags::empty();
        if !self.value_term.is_empty() {
            flags |= EvalFlags::VALUE;
        }
        if !self.gradient_term.is_empty() {
            flags |= EvalFlags::GRADIENT;
        }
        flags
    }

    /// Union of both terms: what must be evaluated per field to assemble
    /// this residual.
    pub fn requests(&self) -> IndexMap<FieldId, EvalFlags> {
        let mut out = self.value_term.clone();
        for (&field, &flags) in &self.gradient_term {
            *out.entry(field).or_default() |= flags;
        }
        out
    }

    /// Whether neither term has dependencies.
    pub fn is_empty(&self) -> bool {
        self.value_term.is_empty() && self.gradient_term.is_empty()
    }
}

/// The compiled equations of one solution field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldPlan {
    pub(crate) rhs: SidePlan,
    pub(crate) lhs: Option<SidePlan>,
}

impl FieldPlan {
    /// The plan for one side. `None` for the LHS of a field solved
    /// without a linearised system.
    pub fn side(&self, side: EquationSide) -> Option<&SidePlan> {
        match side {
            EquationSide::Rhs => Some(&self.rhs),
            EquationSide::Lhs => self.lhs.as_ref(),
        }
    }
}

// ── CompiledEvalPlan ───────────────────────────────────────────────

/// Immutable per-field evaluation flags and dependency maps.
#[derive(Clone, Debug, PartialEq)]
#[must_use]
pub struct CompiledEvalPlan {
    pub(crate) table: FieldTable,
    pub(crate) fields: Vec<FieldPlan>,
    pub(crate) rhs_flags: Vec<EvalFlags>,
    pub(crate) lhs_flags: Vec<EvalFlags>,
    pub(crate) postprocess: Vec<SidePlan>,
    pub(crate) postprocess_flags: Vec<EvalFlags>,
    pub(crate) nucleation_flags: Vec<EvalFlags>,
}

impl CompiledEvalPlan {
    /// The field table the plan was compiled against.
    pub fn table(&self) -> &FieldTable {
        &self.table
    }

    /// Number of solution fields.
    pub fn solution_count(&self) -> usize {
        self.fields.len()
    }

    /// Union of the flags needed for `field` while assembling `side`,
    /// over every owning field's equations.
    pub fn flags_for(&self, field: FieldId, side: EquationSide) -> EvalFlags {
        let flags = match side {
            EquationSide::Rhs => &self.rhs_flags,
            EquationSide::Lhs => &self.lhs_flags,
        };
        flags.get(field.index()).copied().unwrap_or_default()
    }

    /// The compiled equations of a solution field.
    pub fn field(&self, owner: FieldId) -> Option<&FieldPlan> {
        self.fields.get(owner.index())
    }

    /// The residual plan of `owner` on `side`.
    pub fn side(&self, owner: FieldId, side: EquationSide) -> Option<&SidePlan> {
        self.field(owner)?.side(side)
    }

    /// Fields with an LHS residual, in declaration order.
    pub fn lhs_fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.lhs.is_some())
            .map(|(i, _)| FieldId(i as u32))
    }

    /// Whether any field is solved with a linearised system.
    pub fn has_lhs(&self) -> bool {
        self.fields.iter().any(|f| f.lhs.is_some())
    }

    // ── Postprocessing ─────────────────────────────────────────

    /// Number of postprocessing fields.
    pub fn postprocess_count(&self) -> usize {
        self.postprocess.len()
    }

    /// The residual plan of a postprocessing field (RHS only).
    pub fn postprocess(&self, pp: FieldId) -> Option<&SidePlan> {
        self.postprocess.get(pp.index())
    }

    /// Flags of a solution field needed by the postprocessing pass.
    pub fn postprocess_flags_for(&self, field: FieldId) -> EvalFlags {
        self.postprocess_flags
            .get(field.index())
            .copied()
            .unwrap_or_default()
    }

    /// Whether postprocessing is declared at all.
    pub fn has_postprocessing(&self) -> bool {
        !self.postprocess.is_empty()
    }

    /// Postprocessing fields whose domain integral is output.
    pub fn integral_fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.table
            .postprocess_fields()
            .iter()
            .filter(|s| s.output_integral)
            .map(|s| s.index)
    }

    // ── Nucleation ─────────────────────────────────────────────

    /// Flags of a solution field needed to evaluate the nucleation
    /// probability.
    pub fn nucleation_flags_for(&self, field: FieldId) -> EvalFlags {
        self.nucleation_flags
            .get(field.index())
            .copied()
            .unwrap_or_default()
    }

    /// Fields that nucleation events may seed.
    pub fn nucleating_fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.table
            .solution_fields()
            .iter()
            .filter(|s| s.nucleating)
            .map(|s| s.index)
    }

    /// Whether any field is allowed to nucleate.
    pub fn has_nucleation(&self) -> bool {
        self.nucleating_fields().next().is_some()
    }
}
