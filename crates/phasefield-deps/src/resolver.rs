//! Dependency validation and plan compilation.
//!
//! [`validate`] runs once at startup. It checks the declarations for
//! structural errors, resolves every dependency token against the
//! [`FieldTable`], and compiles the [`CompiledEvalPlan`] used by every
//! residual assembly afterwards.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use phasefield_core::{
    EvalFlags, FieldId, FieldKind, FieldRank, FieldRef, FieldTable, FieldTableError, PdeType,
};

use crate::attributes::{AttributeLoader, AttributeSet, DependencyContext, VariableAttributes};
use crate::plan::{CompiledEvalPlan, EquationSide, FieldPlan, SidePlan};
use crate::token::{tokenize, Dependency, DependencyKind, Token};

// ── Errors ─────────────────────────────────────────────────────────

/// Where an offending dependency token was declared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenSite {
    /// Kind of the declaring field.
    pub kind: FieldKind,
    /// Index of the declaring field.
    pub index: FieldId,
    /// Name of the declaring field.
    pub name: String,
    /// Which dependency list the token is in.
    pub context: DependencyContext,
    /// The token as written.
    pub token: String,
}

impl fmt::Display for TokenSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} field {} '{}', {} token '{}'",
            self.kind, self.index, self.name, self.context, self.token
        )
    }
}

/// Errors from dependency validation (startup-time, unrecoverable).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DependencyError {
    /// The field declarations are structurally invalid.
    Field(FieldTableError),

    /// A field sets a flag that is not legal for its kind.
    InvalidAttribute {
        /// Kind of the field.
        kind: FieldKind,
        /// Index of the field.
        index: FieldId,
        /// Name of the field.
        name: String,
        /// The rule broken.
        reason: &'static str,
    },

    /// A field solved with a linearised system declares no LHS.
    MissingLhs {
        /// Index of the field.
        index: FieldId,
        /// Name of the field.
        name: String,
        /// Its equation type.
        pde_type: PdeType,
    },

    /// A token does not match the dependency grammar.
    MalformedToken {
        /// Where the token was declared.
        site: TokenSite,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A token references a name no field declares.
    UnknownField {
        /// Where the token was declared.
        site: TokenSite,
        /// The unresolved name.
        field_name: String,
        /// Tokens legal in this context.
        expected: Vec<String>,
    },

    /// A token applies an operator the referenced field does not support.
    UnsupportedOperator {
        /// Where the token was declared.
        site: TokenSite,
        /// Rank of the referenced field.
        rank: FieldRank,
        /// Tokens legal for the referenced field in this context.
        expected: Vec<String>,
    },

    /// A valid token used where it is not allowed.
    IllegalContext {
        /// Where the token was declared.
        site: TokenSite,
        /// The rule broken.
        reason: &'static str,
        /// Tokens legal in this context.
        expected: Vec<String>,
    },
}

fn write_expected(f: &mut fmt::Formatter<'_>, expected: &[String]) -> fmt::Result {
    if expected.is_empty() {
        write!(f, "; no dependencies are legal here")
    } else {
        write!(f, "; expected one of: {}", expected.join(", "))
    }
}

impl fmt::Display for DependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(e) => write!(f, "invalid field declarations: {e}"),
            Self::InvalidAttribute {
                kind,
                index,
                name,
                reason,
            } => write!(f, "{kind} field {index} '{name}': {reason}"),
            Self::MissingLhs {
                index,
                name,
                pde_type,
            } => write!(
                f,
                "solution field {index} '{name}' is {pde_type} but declares no LHS dependencies"
            ),
            Self::MalformedToken { site, reason } => {
                write!(f, "{site}: malformed token ({reason})")
            }
            Self::UnknownField {
                site,
                field_name,
                expected,
            } => {
                write!(f, "{site}: unknown field '{field_name}'")?;
                write_expected(f, expected)
            }
            Self::UnsupportedOperator {
                site,
                rank,
                expected,
            } => {
                write!(f, "{site}: operator not supported for {rank} field")?;
                write_expected(f, expected)
            }
            Self::IllegalContext {
                site,
                reason,
                expected,
            } => {
                write!(f, "{site}: {reason}")?;
                write_expected(f, expected)
            }
        }
    }
}

impl Error for DependencyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Field(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FieldTableError> for DependencyError {
    fn from(e: FieldTableError) -> Self {
        Self::Field(e)
    }
}

// ── Token classification ───────────────────────────────────────────

/// A token problem, ranked so the lowest rank is reported.
enum Finding {
    Unknown,
    Unsupported(FieldRank),
    Illegal(&'static str),
}

impl Finding {
    fn rank(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Unsupported(_) => 1,
            Self::Illegal(_) => 2,
        }
    }
}

fn classify(
    table: &FieldTable,
    owner: FieldRef,
    owner_pde: PdeType,
    context: DependencyContext,
    token: &Token<'_>,
) -> Result<Dependency, Finding> {
    let field = table.lookup(token.name).ok_or(Finding::Unknown)?;
    let spec = table.spec(field).ok_or(Finding::Unknown)?;

    if token.kind == DependencyKind::Hess && !spec.rank.supports_hessian() {
        return Err(Finding::Unsupported(spec.rank));
    }
    if field.kind == FieldKind::Postprocess {
        return Err(Finding::Illegal(match owner.kind {
            FieldKind::Solution => "solution fields cannot depend on postprocessing fields",
            FieldKind::Postprocess => {
                "postprocessing fields cannot depend on other postprocessing fields"
            }
        }));
    }
    if context.side() == EquationSide::Lhs {
        if owner.kind == FieldKind::Postprocess {
            return Err(Finding::Illegal("postprocessing fields are RHS-only"));
        }
        if !owner_pde.has_lhs() {
            return Err(Finding::Illegal(
                "LHS dependencies require an IMPLICIT_TIME_DEPENDENT or TIME_INDEPENDENT field",
            ));
        }
    }
    if token.kind == DependencyKind::Change {
        if owner.kind == FieldKind::Postprocess {
            return Err(Finding::Illegal(
                "postprocessing fields cannot use change(...)",
            ));
        }
        if context.side() != EquationSide::Lhs {
            return Err(Finding::Illegal(
                "change(...) is only legal in LHS dependencies",
            ));
        }
        if field != owner {
            return Err(Finding::Illegal(
                "change(...) may only reference the declaring field",
            ));
        }
        if !spec.pde_type.has_lhs() {
            return Err(Finding::Illegal(
                "change(...) requires an IMPLICIT_TIME_DEPENDENT or TIME_INDEPENDENT field",
            ));
        }
    }

    Ok(Dependency {
        kind: token.kind,
        field,
    })
}

/// Tokens legal for `owner` in `context`, optionally restricted to one
/// referenced field name.
fn vocabulary(
    table: &FieldTable,
    owner: FieldRef,
    owner_pde: PdeType,
    context: DependencyContext,
    only: Option<&str>,
) -> Vec<String> {
    let lhs = context.side() == EquationSide::Lhs;
    if lhs && (owner.kind == FieldKind::Postprocess || !owner_pde.has_lhs()) {
        return Vec::new();
    }
    let mut out = Vec::new();
    for spec in table.solution_fields() {
        if only.is_some_and(|name| name != spec.name) {
            continue;
        }
        for kind in DependencyKind::ALL {
            let legal = match kind {
                DependencyKind::Value | DependencyKind::Grad => true,
                DependencyKind::Hess => spec.rank.supports_hessian(),
                DependencyKind::Change => {
                    lhs && owner.kind == FieldKind::Solution && owner.id == spec.index
                }
            };
            if legal {
                out.push(kind.render(&spec.name));
            }
        }
    }
    out
}

/// Resolve every token of one field, reporting the first token of the
/// most severe error class.
fn resolve_field(
    table: &FieldTable,
    kind: FieldKind,
    attrs: &VariableAttributes,
) -> Result<Vec<(DependencyContext, Dependency)>, DependencyError> {
    let owner = FieldRef {
        kind,
        id: attrs.spec.index,
    };
    let owner_pde = attrs.spec.pde_type;
    let site = |context: DependencyContext, token: &str| TokenSite {
        kind,
        index: attrs.spec.index,
        name: attrs.spec.name.clone(),
        context,
        token: token.to_string(),
    };

    let mut resolved = Vec::new();
    let mut worst: Option<(Finding, DependencyContext, Token<'_>)> = None;

    for context in DependencyContext::ALL {
        for declared in attrs.dependencies.get(context) {
            for token in tokenize(declared) {
                let token = token.map_err(|e| DependencyError::MalformedToken {
                    site: site(context, &e.text),
                    reason: e.reason,
                })?;
                match classify(table, owner, owner_pde, context, &token) {
                    Ok(dep) => resolved.push((context, dep)),
                    Err(finding) => {
                        let replace = worst
                            .as_ref()
                            .is_none_or(|(w, _, _)| finding.rank() < w.rank());
                        if replace {
                            worst = Some((finding, context, token));
                        }
                    }
                }
            }
        }
    }

    let Some((finding, context, token)) = worst else {
        return Ok(resolved);
    };
    let full = || vocabulary(table, owner, owner_pde, context, None);
    let narrowed = || {
        let v = vocabulary(table, owner, owner_pde, context, Some(token.name));
        if v.is_empty() {
            full()
        } else {
            v
        }
    };
    Err(match finding {
        Finding::Unknown => DependencyError::UnknownField {
            site: site(context, token.text),
            field_name: token.name.to_string(),
            expected: full(),
        },
        Finding::Unsupported(rank) => DependencyError::UnsupportedOperator {
            site: site(context, token.text),
            rank,
            expected: narrowed(),
        },
        Finding::Illegal(reason) => DependencyError::IllegalContext {
            site: site(context, token.text),
            reason,
            expected: narrowed(),
        },
    })
}

// ── Structural checks ──────────────────────────────────────────────

fn check_attribute_flags(kind: FieldKind, attrs: &VariableAttributes) -> Result<(), DependencyError> {
    let spec = &attrs.spec;
    let reason = match kind {
        FieldKind::Solution if spec.output_integral => {
            Some("output_integral is only legal on postprocessing fields")
        }
        FieldKind::Postprocess if spec.nucleating || spec.needs_value_for_nucleation => {
            Some("nucleation flags are only legal on solution fields")
        }
        _ => None,
    };
    match reason {
        Some(reason) => Err(DependencyError::InvalidAttribute {
            kind,
            index: spec.index,
            name: spec.name.clone(),
            reason,
        }),
        None => Ok(()),
    }
}

// ── Validation ─────────────────────────────────────────────────────

/// Validate the declarations and compile the [`CompiledEvalPlan`].
///
/// Checks performed, in order; the first failure is returned:
///
/// 1. At least one solution field; indices dense and 0-based per kind.
/// 2. Names valid and unique across both kinds; vector dims in 1 to 3.
/// 3. Attribute flags legal for each field's kind.
/// 4. Implicit and time-independent fields declare an LHS.
/// 5. Every token resolves. Fields are checked in declaration order,
///    solution fields first. Within one field every token is examined and
///    the first token of the first class found in the order malformed,
///    unknown field, unsupported operator, illegal context is reported.
///
/// Deterministic: identical input yields an identical plan.
pub fn validate(attributes: &AttributeSet) -> Result<CompiledEvalPlan, DependencyError> {
    let table = attributes.field_table()?;

    for kind in [FieldKind::Solution, FieldKind::Postprocess] {
        for attrs in attributes.of_kind(kind) {
            check_attribute_flags(kind, attrs)?;
        }
    }

    for attrs in attributes.solution() {
        if attrs.spec.pde_type.has_lhs() && !attrs.dependencies.has_lhs() {
            return Err(DependencyError::MissingLhs {
                index: attrs.spec.index,
                name: attrs.spec.name.clone(),
                pde_type: attrs.spec.pde_type,
            });
        }
    }

    let n = table.solution_count();
    let mut fields = Vec::with_capacity(n);
    let mut rhs_flags = vec![EvalFlags::empty(); n];
    let mut lhs_flags = vec![EvalFlags::empty(); n];

    for attrs in attributes.solution() {
        let mut plan = FieldPlan {
            rhs: SidePlan::default(),
            lhs: attrs.spec.pde_type.has_lhs().then(SidePlan::default),
        };
        for (context, dep) in resolve_field(&table, FieldKind::Solution, attrs)? {
            let flag = dep.kind.flag();
            let (side_plan, union) = match context.side() {
                EquationSide::Rhs => (&mut plan.rhs, &mut rhs_flags),
                EquationSide::Lhs => match plan.lhs.as_mut() {
                    Some(lhs) => (lhs, &mut lhs_flags),
                    None => continue,
                },
            };
            side_plan.add(context.term(), dep.field.id, flag);
            union[dep.field.id.index()] |= flag;
        }
        fields.push(plan);
    }

    let mut postprocess = Vec::with_capacity(table.postprocess_count());
    let mut postprocess_flags = vec![EvalFlags::empty(); n];
    for attrs in attributes.postprocess() {
        let mut plan = SidePlan::default();
        for (context, dep) in resolve_field(&table, FieldKind::Postprocess, attrs)? {
            let flag = dep.kind.flag();
            plan.add(context.term(), dep.field.id, flag);
            postprocess_flags[dep.field.id.index()] |= flag;
        }
        postprocess.push(plan);
    }

    let nucleation_flags = table
        .solution_fields()
        .iter()
        .map(|s| {
            if s.needs_value_for_nucleation {
                EvalFlags::VALUE
            } else {
                EvalFlags::empty()
            }
        })
        .collect();

    for spec in table.solution_fields() {
        log::debug!(
            "field {} '{}' ({}): RHS {}, LHS {}",
            spec.index,
            spec.name,
            spec.pde_type,
            rhs_flags[spec.index.index()],
            lhs_flags[spec.index.index()],
        );
    }
    log::debug!(
        "compiled evaluation plan: {} solution fields, {} postprocessing fields",
        n,
        postprocess.len()
    );

    Ok(CompiledEvalPlan {
        table,
        fields,
        rhs_flags,
        lhs_flags,
        postprocess,
        postprocess_flags,
        nucleation_flags,
    })
}

// ── DependencyResolver ─────────────────────────────────────────────

/// Owns the declarations and the plan compiled from them.
///
/// Both are immutable after construction and shared read-only.
#[derive(Debug)]
pub struct DependencyResolver {
    attributes: Arc<AttributeSet>,
    plan: Arc<CompiledEvalPlan>,
}

impl DependencyResolver {
    /// Validate `attributes` and compile the plan.
    pub fn new(attributes: AttributeSet) -> Result<Self, DependencyError> {
        let plan = validate(&attributes)?;
        Ok(Self {
            attributes: Arc::new(attributes),
            plan: Arc::new(plan),
        })
    }

    /// Run the declaration hooks of `loader`, then validate.
    pub fn from_loader(loader: &dyn AttributeLoader) -> Result<Self, DependencyError> {
        Self::new(AttributeSet::from_loader(loader))
    }

    /// The declarations.
    pub fn attributes(&self) -> &Arc<AttributeSet> {
        &self.attributes
    }

    /// The compiled plan.
    pub fn plan(&self) -> &Arc<CompiledEvalPlan> {
        &self.plan
    }

    /// The field table the plan was compiled against.
    pub fn table(&self) -> &FieldTable {
        self.plan.table()
    }
}
