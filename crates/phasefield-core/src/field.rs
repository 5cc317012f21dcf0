//! Field declarations and the [`FieldTable`] name index.

use std::error::Error;
use std::fmt;

use indexmap::IndexMap;

use crate::id::FieldId;

/// Tensor rank of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldRank {
    /// A single value per evaluation point.
    Scalar,
    /// A fixed-size vector per evaluation point.
    Vector {
        /// Number of components (the spatial dimension, 1 to 3).
        dims: u32,
    },
}

impl FieldRank {
    /// Number of `f64` slots per degree of freedom.
    pub fn components(&self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vector { dims } => *dims as usize,
        }
    }

    /// Whether Hessians can be evaluated for a field of this rank.
    pub fn supports_hessian(&self) -> bool {
        matches!(self, Self::Scalar)
    }
}

impl fmt::Display for FieldRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "SCALAR"),
            Self::Vector { dims } => write!(f, "VECTOR({dims})"),
        }
    }
}

/// Kind of governing equation a field is solved with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PdeType {
    /// Advanced with an explicit time integrator; RHS only.
    #[default]
    ExplicitTimeDependent,
    /// Advanced implicitly; requires an LHS for the linearised solve.
    ImplicitTimeDependent,
    /// Steady-state equation solved every step; requires an LHS.
    TimeIndependent,
    /// Derived every step from other fields; RHS only.
    Auxiliary,
}

impl PdeType {
    /// Whether the field is solved with a linearised (LHS) system and
    /// may therefore request `change(...)` of its own solution.
    pub fn has_lhs(&self) -> bool {
        matches!(self, Self::ImplicitTimeDependent | Self::TimeIndependent)
    }
}

impl fmt::Display for PdeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExplicitTimeDependent => write!(f, "EXPLICIT_TIME_DEPENDENT"),
            Self::ImplicitTimeDependent => write!(f, "IMPLICIT_TIME_DEPENDENT"),
            Self::TimeIndependent => write!(f, "TIME_INDEPENDENT"),
            Self::Auxiliary => write!(f, "AUXILIARY"),
        }
    }
}

/// Whether a field is part of the solved system or a postprocessing output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// A solution field with its own governing equation.
    Solution,
    /// A field computed from solution fields for output only.
    Postprocess,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solution => write!(f, "solution"),
            Self::Postprocess => write!(f, "postprocessing"),
        }
    }
}

/// Substrings that may never appear in a field name.
///
/// A name containing any of these could be confused with a dependency
/// token (`grad(c)`) or a token list separator.
pub const FORBIDDEN_NAME_SUBSTRINGS: &[&str] = &[
    "value(", "grad(", "hess(", "change(", "(", ")", ",",
];

/// Reasons a field name is rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameError {
    /// The name is empty.
    Empty,
    /// The name contains whitespace.
    Whitespace,
    /// The name contains a reserved substring.
    ForbiddenSubstring {
        /// The reserved substring found.
        substring: &'static str,
    },
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name is empty"),
            Self::Whitespace => write!(f, "name contains whitespace"),
            Self::ForbiddenSubstring { substring } => {
                write!(f, "name contains forbidden substring '{substring}'")
            }
        }
    }
}

impl Error for NameError {}

/// Check a field name against the naming rules.
pub fn validate_field_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.chars().any(char::is_whitespace) {
        return Err(NameError::Whitespace);
    }
    for &substring in FORBIDDEN_NAME_SUBSTRINGS {
        if name.contains(substring) {
            return Err(NameError::ForbiddenSubstring { substring });
        }
    }
    Ok(())
}

/// Declaration of a single field.
///
/// `index` is dense and 0-based within the field's [`FieldKind`]; `name` is
/// unique across solution and postprocessing fields.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    /// Position in declaration order.
    pub index: FieldId,
    /// Name referenced by dependency tokens.
    pub name: String,
    /// Scalar or vector.
    pub rank: FieldRank,
    /// Governing-equation kind.
    pub pde_type: PdeType,
    /// Whether nucleation events may seed this field.
    pub nucleating: bool,
    /// Whether the nucleation probability needs this field's value.
    pub needs_value_for_nucleation: bool,
    /// Whether the domain integral of this field is output (postprocessing only).
    pub output_integral: bool,
}

impl FieldSpec {
    /// A scalar, explicit, non-nucleating field.
    pub fn new(index: FieldId, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            rank: FieldRank::Scalar,
            pde_type: PdeType::ExplicitTimeDependent,
            nucleating: false,
            needs_value_for_nucleation: false,
            output_integral: false,
        }
    }
}

/// A resolved field reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Which index space `id` lives in.
    pub kind: FieldKind,
    /// Index of the field within its kind.
    pub id: FieldId,
}

/// Structural errors detected while building a [`FieldTable`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldTableError {
    /// No solution fields were declared.
    NoSolutionFields,
    /// Field indices are not `0, 1, 2, ...` in declaration order.
    NonDenseIndex {
        /// Which index space.
        kind: FieldKind,
        /// The index expected at this position.
        expected: FieldId,
        /// The index found.
        found: FieldId,
    },
    /// A field name breaks the naming rules.
    InvalidName {
        /// Which index space.
        kind: FieldKind,
        /// The offending field.
        index: FieldId,
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: NameError,
    },
    /// Two fields share a name.
    DuplicateName {
        /// The shared name.
        name: String,
        /// The field declared first.
        first: FieldRef,
        /// The field declared second.
        second: FieldRef,
    },
    /// A vector field declares an unsupported number of components.
    InvalidVectorDims {
        /// Which index space.
        kind: FieldKind,
        /// The offending field.
        index: FieldId,
        /// The declared component count.
        dims: u32,
    },
}

impl fmt::Display for FieldTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSolutionFields => write!(f, "no solution fields declared"),
            Self::NonDenseIndex {
                kind,
                expected,
                found,
            } => write!(
                f,
                "{kind} field indices must be dense and 0-based: expected {expected}, found {found}"
            ),
            Self::InvalidName {
                kind,
                index,
                name,
                reason,
            } => write!(f, "{kind} field {index} has invalid name '{name}': {reason}"),
            Self::DuplicateName {
                name,
                first,
                second,
            } => write!(
                f,
                "field name '{name}' used by {} field {} and {} field {}",
                first.kind, first.id, second.kind, second.id
            ),
            Self::InvalidVectorDims { kind, index, dims } => write!(
                f,
                "{kind} field {index} declares {dims} vector components (expected 1 to 3)"
            ),
        }
    }
}

impl Error for FieldTableError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidName { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Name-to-index resolution over all declared fields.
///
/// Built once from the declarations and passed by reference to every
/// component that needs to resolve a field name. Immutable afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldTable {
    solution: Vec<FieldSpec>,
    postprocess: Vec<FieldSpec>,
    by_name: IndexMap<String, FieldRef>,
}

impl FieldTable {
    /// Build a table, checking index density, names, and name uniqueness.
    ///
    /// Checks run in that order, solution fields before postprocessing
    /// fields, and the first violation is returned.
    pub fn new(
        solution: Vec<FieldSpec>,
        postprocess: Vec<FieldSpec>,
    ) -> Result<Self, FieldTableError> {
        if solution.is_empty() {
            return Err(FieldTableError::NoSolutionFields);
        }
        for (kind, specs) in [
            (FieldKind::Solution, &solution),
            (FieldKind::Postprocess, &postprocess),
        ] {
            for (i, spec) in specs.iter().enumerate() {
                let expected = FieldId(i as u32);
                if spec.index != expected {
                    return Err(FieldTableError::NonDenseIndex {
                        kind,
                        expected,
                        found: spec.index,
                    });
                }
            }
        }
        for (kind, specs) in [
            (FieldKind::Solution, &solution),
            (FieldKind::Postprocess, &postprocess),
        ] {
            for spec in specs {
                validate_field_name(&spec.name).map_err(|reason| {
                    FieldTableError::InvalidName {
                        kind,
                        index: spec.index,
                        name: spec.name.clone(),
                        reason,
                    }
                })?;
                if let FieldRank::Vector { dims } = spec.rank {
                    if !(1..=3).contains(&dims) {
                        return Err(FieldTableError::InvalidVectorDims {
                            kind,
                            index: spec.index,
                            dims,
                        });
                    }
                }
            }
        }

        let mut by_name = IndexMap::with_capacity(solution.len() + postprocess.len());
        for (kind, specs) in [
            (FieldKind::Solution, &solution),
            (FieldKind::Postprocess, &postprocess),
        ] {
            for spec in specs {
                let field = FieldRef {
                    kind,
                    id: spec.index,
                };
                if let Some(&first) = by_name.get(&spec.name) {
                    return Err(FieldTableError::DuplicateName {
                        name: spec.name.clone(),
                        first,
                        second: field,
                    });
                }
                by_name.insert(spec.name.clone(), field);
            }
        }

        Ok(Self {
            solution,
            postprocess,
            by_name,
        })
    }

    /// Resolve a name to a field reference.
    pub fn lookup(&self, name: &str) -> Option<FieldRef> {
        self.by_name.get(name).copied()
    }

    /// The declaration of a solution field.
    pub fn solution(&self, id: FieldId) -> Option<&FieldSpec> {
        self.solution.get(id.index())
    }

    /// The declaration of a postprocessing field.
    pub fn postprocess(&self, id: FieldId) -> Option<&FieldSpec> {
        self.postprocess.get(id.index())
    }

    /// The declaration behind a field reference.
    pub fn spec(&self, field: FieldRef) -> Option<&FieldSpec> {
        match field.kind {
            FieldKind::Solution => self.solution(field.id),
            FieldKind::Postprocess => self.postprocess(field.id),
        }
    }

    /// All solution fields in declaration order.
    pub fn solution_fields(&self) -> &[FieldSpec] {
        &self.solution
    }

    /// All postprocessing fields in declaration order.
    pub fn postprocess_fields(&self) -> &[FieldSpec] {
        &self.postprocess
    }

    /// Number of solution fields.
    pub fn solution_count(&self) -> usize {
        self.solution.len()
    }

    /// Number of postprocessing fields.
    pub fn postprocess_count(&self) -> usize {
        self.postprocess.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(i: u32, name: &str) -> FieldSpec {
        FieldSpec::new(FieldId(i), name)
    }

    #[test]
    fn lookup_resolves_both_kinds() {
        let table = FieldTable::new(vec![spec(0, "c"), spec(1, "n")], vec![spec(0, "f_tot")])
            .unwrap();
        assert_eq!(
            table.lookup("n"),
            Some(FieldRef {
                kind: FieldKind::Solution,
                id: FieldId(1)
            })
        );
        assert_eq!(
            table.lookup("f_tot"),
            Some(FieldRef {
                kind: FieldKind::Postprocess,
                id: FieldId(0)
            })
        );
        assert_eq!(table.lookup("missing"), None);
    }

    #[test]
    fn empty_solution_rejected() {
        assert_eq!(
            FieldTable::new(vec![], vec![]),
            Err(FieldTableError::NoSolutionFields)
        );
    }

    #[test]
    fn gap_in_indices_rejected() {
        let err = FieldTable::new(vec![spec(0, "c"), spec(2, "n")], vec![]).unwrap_err();
        assert_eq!(
            err,
            FieldTableError::NonDenseIndex {
                kind: FieldKind::Solution,
                expected: FieldId(1),
                found: FieldId(2),
            }
        );
    }

    #[test]
    fn duplicate_across_kinds_rejected() {
        let err = FieldTable::new(vec![spec(0, "c")], vec![spec(0, "c")]).unwrap_err();
        match err {
            FieldTableError::DuplicateName { name, first, second } => {
                assert_eq!(name, "c");
                assert_eq!(first.kind, FieldKind::Solution);
                assert_eq!(second.kind, FieldKind::Postprocess);
            }
            other => panic!("expected DuplicateName, got {other:?}"),
        }
    }

    #[test]
    fn forbidden_names_rejected() {
        assert_eq!(validate_field_name(""), Err(NameError::Empty));
        assert_eq!(validate_field_name("a b"), Err(NameError::Whitespace));
        assert_eq!(
            validate_field_name("grad(c)"),
            Err(NameError::ForbiddenSubstring { substring: "grad(" })
        );
        assert_eq!(
            validate_field_name("c,n"),
            Err(NameError::ForbiddenSubstring { substring: "," })
        );
        assert!(validate_field_name("grad_c").is_ok());
        assert!(validate_field_name("mu").is_ok());
    }

    #[test]
    fn vector_dims_bounded() {
        let mut u = spec(0, "u");
        u.rank = FieldRank::Vector { dims: 4 };
        assert!(matches!(
            FieldTable::new(vec![u], vec![]),
            Err(FieldTableError::InvalidVectorDims { dims: 4, .. })
        ));
    }

    #[test]
    fn rank_components_and_hessian_support() {
        assert_eq!(FieldRank::Scalar.components(), 1);
        assert_eq!(FieldRank::Vector { dims: 2 }.components(), 2);
        assert!(FieldRank::Scalar.supports_hessian());
        assert!(!FieldRank::Vector { dims: 3 }.supports_hessian());
    }
}
