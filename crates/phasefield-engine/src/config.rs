//! Refinement configuration, validation, and startup error types.
//!
//! [`RefinementCriterion`] is plain data describing when and where the mesh
//! adapts. [`validate()`](RefinementCriterion::validate) checks it against
//! the field table at startup, before any numerics run.

use std::error::Error;
use std::fmt;

use phasefield_core::{FieldId, FieldTable};
use phasefield_deps::{Capability, DependencyError};
use phasefield_mesh::MeshError;

// ── NonFinitePolicy ────────────────────────────────────────────────

/// What marking does with a NaN or infinite sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NonFinitePolicy {
    /// Abort the refinement event with a numeric error.
    #[default]
    Error,
    /// Treat the sample as lying outside every window.
    TreatAsOutside,
}

// ── ConfigurationError ─────────────────────────────────────────────

/// Errors detected while initialising a simulation.
#[derive(Debug, PartialEq)]
pub enum ConfigurationError {
    /// Dependency declarations failed validation.
    Dependency(DependencyError),
    /// The plan needs a model capability that was not provided.
    MissingCapability {
        /// The capability required.
        capability: Capability,
    },
    /// `fields`, `window_min` and `window_max` differ in length.
    CriterionLengthMismatch {
        /// Length of `fields`.
        fields: usize,
        /// Length of `window_min`.
        window_min: usize,
        /// Length of `window_max`.
        window_max: usize,
    },
    /// A criterion field is not a declared solution field.
    UnknownCriterionField {
        /// The offending index.
        field: FieldId,
        /// Number of declared solution fields.
        solution_count: usize,
    },
    /// `min_level` exceeds `max_level`.
    LevelBoundsInverted {
        /// Configured minimum level.
        min_level: u32,
        /// Configured maximum level.
        max_level: u32,
    },
    /// `skip_steps` is zero.
    ZeroSkipSteps,
    /// A window is empty or not finite.
    InvalidWindow {
        /// The field the window applies to.
        field: FieldId,
        /// Configured lower bound.
        min: f64,
        /// Configured upper bound.
        max: f64,
    },
    /// The mesh collaborator rejected the initial layout.
    Mesh(MeshError),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dependency(e) => write!(f, "dependencies: {e}"),
            Self::MissingCapability { capability } => {
                write!(f, "the declared fields need a {capability}, none was provided")
            }
            Self::CriterionLengthMismatch {
                fields,
                window_min,
                window_max,
            } => write!(
                f,
                "criterion has {fields} field(s) but {window_min} window_min and {window_max} window_max entries"
            ),
            Self::UnknownCriterionField {
                field,
                solution_count,
            } => write!(
                f,
                "criterion field {field} out of range, {solution_count} solution field(s) declared"
            ),
            Self::LevelBoundsInverted {
                min_level,
                max_level,
            } => write!(f, "min_level {min_level} exceeds max_level {max_level}"),
            Self::ZeroSkipSteps => write!(f, "skip_steps must be at least 1"),
            Self::InvalidWindow { field, min, max } => write!(
                f,
                "window ({min}, {max}) of field {field} must be finite with min < max"
            ),
            Self::Mesh(e) => write!(f, "initial layout: {e}"),
        }
    }
}

impl Error for ConfigurationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Dependency(e) => Some(e),
            Self::Mesh(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DependencyError> for ConfigurationError {
    fn from(e: DependencyError) -> Self {
        Self::Dependency(e)
    }
}

impl From<MeshError> for ConfigurationError {
    fn from(e: MeshError) -> Self {
        Self::Mesh(e)
    }
}

// ── RefinementCriterion ────────────────────────────────────────────

/// When and where the mesh adapts.
///
/// A cell is marked when any criterion field has a sample strictly inside
/// its `(window_min, window_max)` window. Marked cells below `max_level`
/// are refined; unmarked cells above `min_level` are coarsened. Events
/// fire at step 0 and every `skip_steps` steps.
#[derive(Clone, Debug, PartialEq)]
pub struct RefinementCriterion {
    /// Solution fields sampled for marking.
    pub fields: Vec<FieldId>,
    /// Lower window bound per field (exclusive).
    pub window_min: Vec<f64>,
    /// Upper window bound per field (exclusive).
    pub window_max: Vec<f64>,
    /// Cells at this level are never refined.
    pub max_level: u32,
    /// Cells at or below this level are never coarsened.
    pub min_level: u32,
    /// Refinement cadence in steps. Default: 1.
    pub skip_steps: u64,
    /// Handling of non-finite samples. Default: [`NonFinitePolicy::Error`].
    pub non_finite: NonFinitePolicy,
}

impl Default for RefinementCriterion {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            window_min: Vec::new(),
            window_max: Vec::new(),
            max_level: 0,
            min_level: 0,
            skip_steps: 1,
            non_finite: NonFinitePolicy::Error,
        }
    }
}

impl RefinementCriterion {
    /// A criterion with no windows and the given level bounds.
    pub fn new(min_level: u32, max_level: u32, skip_steps: u64) -> Self {
        Self {
            min_level,
            max_level,
            skip_steps,
            ..Self::default()
        }
    }

    /// Add a window on `field`.
    pub fn with_window(mut self, field: FieldId, min: f64, max: f64) -> Self {
        self.fields.push(field);
        self.window_min.push(min);
        self.window_max.push(max);
        self
    }

    /// Set the non-finite policy.
    pub fn with_non_finite(mut self, policy: NonFinitePolicy) -> Self {
        self.non_finite = policy;
        self
    }

    /// The configured windows as `(field, min, max)`.
    pub fn windows(&self) -> impl Iterator<Item = (FieldId, f64, f64)> + '_ {
        self.fields
            .iter()
            .zip(&self.window_min)
            .zip(&self.window_max)
            .map(|((&field, &min), &max)| (field, min, max))
    }

    /// Whether marking fires at `step`.
    pub fn fires_at(&self, step: u64) -> bool {
        step == 0 || (self.skip_steps > 0 && step % self.skip_steps == 0)
    }

    /// Number of successive marking passes run at step 0.
    pub fn initial_passes(&self) -> u32 {
        self.max_level.saturating_sub(self.min_level)
    }

    /// Validate all invariants against the declared fields.
    pub fn validate(&self, table: &FieldTable) -> Result<(), ConfigurationError> {
        // 1. One window per field.
        if self.fields.len() != self.window_min.len() || self.fields.len() != self.window_max.len()
        {
            return Err(ConfigurationError::CriterionLengthMismatch {
                fields: self.fields.len(),
                window_min: self.window_min.len(),
                window_max: self.window_max.len(),
            });
        }
        // 2. Level bounds ordered.
        if self.min_level > self.max_level {
            return Err(ConfigurationError::LevelBoundsInverted {
                min_level: self.min_level,
                max_level: self.max_level,
            });
        }
        // 3. Cadence.
        if self.skip_steps == 0 {
            return Err(ConfigurationError::ZeroSkipSteps);
        }
        // 4. Fields declared, windows usable.
        for (field, min, max) in self.windows() {
            if table.solution(field).is_none() {
                return Err(ConfigurationError::UnknownCriterionField {
                    field,
                    solution_count: table.solution_count(),
                });
            }
            if !min.is_finite() || !max.is_finite() || min >= max {
                return Err(ConfigurationError::InvalidWindow { field, min, max });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasefield_core::{FieldSpec, FieldTableError};

    fn table() -> FieldTable {
        FieldTable::new(
            vec![
                FieldSpec::new(FieldId(0), "c"),
                FieldSpec::new(FieldId(1), "n"),
            ],
            Vec::new(),
        )
        .unwrap()
    }

    fn valid_criterion() -> RefinementCriterion {
        RefinementCriterion::new(1, 7, 500).with_window(FieldId(1), -0.99999, 0.99999)
    }

    #[test]
    fn validate_valid_criterion_succeeds() {
        assert!(valid_criterion().validate(&table()).is_ok());
    }

    #[test]
    fn validate_no_windows_succeeds() {
        assert!(RefinementCriterion::new(0, 3, 1).validate(&table()).is_ok());
    }

    #[test]
    fn validate_length_mismatch_fails() {
        let mut c = valid_criterion();
        c.window_max.push(2.0);
        match c.validate(&table()) {
            Err(ConfigurationError::CriterionLengthMismatch {
                fields: 1,
                window_min: 1,
                window_max: 2,
            }) => {}
            other => panic!("expected CriterionLengthMismatch, got {other:?}"),
        }
    }

    #[test]
    fn validate_unknown_field_fails() {
        let c = valid_criterion().with_window(FieldId(2), 0.0, 1.0);
        match c.validate(&table()) {
            Err(ConfigurationError::UnknownCriterionField {
                field: FieldId(2),
                solution_count: 2,
            }) => {}
            other => panic!("expected UnknownCriterionField, got {other:?}"),
        }
    }

    #[test]
    fn validate_inverted_levels_fails() {
        let mut c = valid_criterion();
        c.min_level = 8;
        match c.validate(&table()) {
            Err(ConfigurationError::LevelBoundsInverted {
                min_level: 8,
                max_level: 7,
            }) => {}
            other => panic!("expected LevelBoundsInverted, got {other:?}"),
        }
    }

    #[test]
    fn validate_zero_skip_fails() {
        let mut c = valid_criterion();
        c.skip_steps = 0;
        assert_eq!(c.validate(&table()), Err(ConfigurationError::ZeroSkipSteps));
    }

    #[test]
    fn validate_bad_windows_fail() {
        for (min, max) in [(1.0, 1.0), (2.0, 1.0), (f64::NEG_INFINITY, 0.0), (0.0, f64::NAN)] {
            let c = RefinementCriterion::new(0, 1, 1).with_window(FieldId(0), min, max);
            assert!(
                matches!(
                    c.validate(&table()),
                    Err(ConfigurationError::InvalidWindow { .. })
                ),
                "({min}, {max}) accepted"
            );
        }
    }

    #[test]
    fn cadence_includes_step_zero() {
        let c = valid_criterion();
        assert!(c.fires_at(0));
        assert!(!c.fires_at(1));
        assert!(!c.fires_at(499));
        assert!(c.fires_at(500));
        assert!(c.fires_at(1000));
        assert_eq!(c.initial_passes(), 6);
    }

    #[test]
    fn dependency_error_chains() {
        let e: ConfigurationError = DependencyError::Field(FieldTableError::NoSolutionFields).into();
        assert!(e.source().is_some());
        assert!(e.to_string().starts_with("dependencies: "));
    }
}
