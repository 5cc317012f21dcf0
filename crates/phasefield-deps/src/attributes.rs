//! User-declared field attributes.
//!
//! An [`AttributeSet`] is populated once, before the run, through the
//! [`AttributeLoader`] hooks. It is plain data: nothing is checked until
//! [`validate`](crate::resolver::validate) compiles it into a plan.

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexSet;
use phasefield_core::{FieldId, FieldKind, FieldRank, FieldSpec, FieldTable, FieldTableError, PdeType};

use crate::plan::{EquationSide, ResidualTerm};

/// One of the four dependency lists a field may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DependencyContext {
    /// Dependencies of the value term of the RHS residual.
    ValueRhs,
    /// Dependencies of the gradient term of the RHS residual.
    GradientRhs,
    /// Dependencies of the value term of the LHS residual.
    ValueLhs,
    /// Dependencies of the gradient term of the LHS residual.
    GradientLhs,
}

impl DependencyContext {
    /// All contexts in validation order.
    pub const ALL: [Self; 4] = [
        Self::ValueRhs,
        Self::GradientRhs,
        Self::ValueLhs,
        Self::GradientLhs,
    ];

    /// The equation side of this context.
    pub fn side(self) -> EquationSide {
        match self {
            Self::ValueRhs | Self::GradientRhs => EquationSide::Rhs,
            Self::ValueLhs | Self::GradientLhs => EquationSide::Lhs,
        }
    }

    /// The residual term of this context.
    pub fn term(self) -> ResidualTerm {
        match self {
            Self::ValueRhs | Self::ValueLhs => ResidualTerm::Value,
            Self::GradientRhs | Self::GradientLhs => ResidualTerm::Gradient,
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::ValueRhs => 0,
            Self::GradientRhs => 1,
            Self::ValueLhs => 2,
            Self::GradientLhs => 3,
        }
    }
}

impl fmt::Display for DependencyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ValueRhs => "value_rhs",
            Self::GradientRhs => "gradient_rhs",
            Self::ValueLhs => "value_lhs",
            Self::GradientLhs => "gradient_lhs",
        })
    }
}

/// The four dependency lists of one field.
///
/// Each entry is a trimmed, comma-free dependency token as written by the
/// user. Insertion order is kept so validation reports the first offending
/// token deterministically.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyDeclaration {
    sets: [IndexSet<String>; 4],
}

impl DependencyDeclaration {
    /// Tokens declared for a context.
    pub fn get(&self, context: DependencyContext) -> &IndexSet<String> {
        &self.sets[context.slot()]
    }

    /// Replace a context's tokens with those of a comma-separated list.
    pub fn set(&mut self, context: DependencyContext, list: &str) {
        let set = &mut self.sets[context.slot()];
        set.clear();
        Self::extend_from_list(set, list);
    }

    /// Add tokens to a context. Each item may itself be a comma-separated list.
    pub fn insert<I, S>(&mut self, context: DependencyContext, items: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = &mut self.sets[context.slot()];
        for item in items {
            Self::extend_from_list(set, item.as_ref());
        }
    }

    /// Whether any LHS context has tokens.
    pub fn has_lhs(&self) -> bool {
        !self.get(DependencyContext::ValueLhs).is_empty()
            || !self.get(DependencyContext::GradientLhs).is_empty()
    }

    /// Whether no context has tokens.
    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(IndexSet::is_empty)
    }

    fn extend_from_list(set: &mut IndexSet<String>, list: &str) {
        for token in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            set.insert(token.to_string());
        }
    }
}

/// The declaration of one field: its spec plus its dependency lists.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableAttributes {
    /// Name, rank, equation type, and flags.
    pub spec: FieldSpec,
    /// Dependency lists.
    pub dependencies: DependencyDeclaration,
}

impl VariableAttributes {
    fn new(index: u32) -> Self {
        Self {
            spec: FieldSpec::new(FieldId(index), String::new()),
            dependencies: DependencyDeclaration::default(),
        }
    }
}

/// All declared solution and postprocessing fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributeSet {
    solution: BTreeMap<u32, VariableAttributes>,
    postprocess: BTreeMap<u32, VariableAttributes>,
}

impl AttributeSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate a set by running both declaration hooks of `loader`.
    pub fn from_loader(loader: &dyn AttributeLoader) -> Self {
        let mut set = Self::new();
        loader.load_variable_attributes(&mut set.solution_builder());
        loader.load_postprocessor_variable_attributes(&mut set.postprocess_builder());
        set
    }

    /// Declare solution fields.
    pub fn solution_builder(&mut self) -> AttributeBuilder<'_> {
        AttributeBuilder {
            kind: FieldKind::Solution,
            entries: &mut self.solution,
        }
    }

    /// Declare postprocessing fields.
    pub fn postprocess_builder(&mut self) -> AttributeBuilder<'_> {
        AttributeBuilder {
            kind: FieldKind::Postprocess,
            entries: &mut self.postprocess,
        }
    }

    /// Solution field declarations in index order.
    pub fn solution(&self) -> impl Iterator<Item = &VariableAttributes> {
        self.solution.values()
    }

    /// Postprocessing field declarations in index order.
    pub fn postprocess(&self) -> impl Iterator<Item = &VariableAttributes> {
        self.postprocess.values()
    }

    /// Declarations of one kind in index order.
    pub fn of_kind(&self, kind: FieldKind) -> impl Iterator<Item = &VariableAttributes> {
        match kind {
            FieldKind::Solution => self.solution.values(),
            FieldKind::Postprocess => self.postprocess.values(),
        }
    }

    /// Build the name index over every declared field.
    pub fn field_table(&self) -> Result<FieldTable, FieldTableError> {
        FieldTable::new(
            self.solution().map(|a| a.spec.clone()).collect(),
            self.postprocess().map(|a| a.spec.clone()).collect(),
        )
    }
}

/// Setter surface handed to the declaration hooks.
///
/// Every setter creates the field at `index` on first use. Setters return
/// `&mut Self` so declarations can be chained.
pub struct AttributeBuilder<'a> {
    kind: FieldKind,
    entries: &'a mut BTreeMap<u32, VariableAttributes>,
}

impl AttributeBuilder<'_> {
    /// Which kind of field this builder declares.
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    fn entry(&mut self, index: u32) -> &mut VariableAttributes {
        self.entries
            .entry(index)
            .or_insert_with(|| VariableAttributes::new(index))
    }

    /// Set the name of the field at `index`.
    pub fn set_variable_name(&mut self, index: u32, name: &str) -> &mut Self {
        self.entry(index).spec.name = name.to_string();
        self
    }

    /// Set the rank (scalar or vector) of the field at `index`.
    pub fn set_variable_type(&mut self, index: u32, rank: FieldRank) -> &mut Self {
        self.entry(index).spec.rank = rank;
        self
    }

    /// Set the governing-equation type of the field at `index`.
    pub fn set_variable_equation_type(&mut self, index: u32, pde_type: PdeType) -> &mut Self {
        self.entry(index).spec.pde_type = pde_type;
        self
    }

    /// Replace one dependency list from a comma-separated string
    /// such as `"c, grad(c), hess(n)"`.
    pub fn set_dependencies(
        &mut self,
        index: u32,
        context: DependencyContext,
        list: &str,
    ) -> &mut Self {
        self.entry(index).dependencies.set(context, list);
        self
    }

    /// Add tokens to one dependency list.
    pub fn insert_dependencies<I, S>(
        &mut self,
        index: u32,
        context: DependencyContext,
        items: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.entry(index).dependencies.insert(context, items);
        self
    }

    /// Dependencies of the value term of the RHS.
    pub fn set_dependencies_value_term_rhs(&mut self, index: u32, list: &str) -> &mut Self {
        self.set_dependencies(index, DependencyContext::ValueRhs, list)
    }

    /// Dependencies of the gradient term of the RHS.
    pub fn set_dependencies_gradient_term_rhs(&mut self, index: u32, list: &str) -> &mut Self {
        self.set_dependencies(index, DependencyContext::GradientRhs, list)
    }

    /// Dependencies of the value term of the LHS.
    pub fn set_dependencies_value_term_lhs(&mut self, index: u32, list: &str) -> &mut Self {
        self.set_dependencies(index, DependencyContext::ValueLhs, list)
    }

    /// Dependencies of the gradient term of the LHS.
    pub fn set_dependencies_gradient_term_lhs(&mut self, index: u32, list: &str) -> &mut Self {
        self.set_dependencies(index, DependencyContext::GradientLhs, list)
    }

    /// Whether the nucleation probability needs this field's value.
    pub fn set_need_value_nucleation(&mut self, index: u32, flag: bool) -> &mut Self {
        self.entry(index).spec.needs_value_for_nucleation = flag;
        self
    }

    /// Whether nucleation events may seed this field.
    pub fn set_allowed_to_nucleate(&mut self, index: u32, flag: bool) -> &mut Self {
        self.entry(index).spec.nucleating = flag;
        self
    }

    /// Whether the domain integral of this postprocessing field is output.
    pub fn set_output_integral(&mut self, index: u32, flag: bool) -> &mut Self {
        self.entry(index).spec.output_integral = flag;
        self
    }
}

/// The declaration hooks a model implements.
pub trait AttributeLoader {
    /// Declare the solution fields and their dependencies.
    fn load_variable_attributes(&self, vars: &mut AttributeBuilder<'_>);

    /// Declare postprocessing fields. Default: none.
    fn load_postprocessor_variable_attributes(&self, _pp: &mut AttributeBuilder<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TwoFields;

    impl AttributeLoader for TwoFields {
        fn load_variable_attributes(&self, vars: &mut AttributeBuilder<'_>) {
            vars.set_variable_name(1, "n")
                .set_variable_equation_type(1, PdeType::ImplicitTimeDependent)
                .set_dependencies_value_term_lhs(1, "n, change(n)");
            vars.set_variable_name(0, "c")
                .set_dependencies_value_term_rhs(0, "n, grad(n)");
        }

        fn load_postprocessor_variable_attributes(&self, pp: &mut AttributeBuilder<'_>) {
            pp.set_variable_name(0, "f_tot")
                .set_output_integral(0, true)
                .set_dependencies_value_term_rhs(0, "c");
        }
    }

    #[test]
    fn loader_populates_in_index_order() {
        let set = AttributeSet::from_loader(&TwoFields);
        let names: Vec<_> = set.solution().map(|a| a.spec.name.as_str()).collect();
        assert_eq!(names, vec!["c", "n"]);
        let pp: Vec<_> = set.postprocess().collect();
        assert_eq!(pp.len(), 1);
        assert!(pp[0].spec.output_integral);
    }

    #[test]
    fn set_splits_and_trims() {
        let mut decl = DependencyDeclaration::default();
        decl.set(DependencyContext::ValueRhs, " n , grad(n),, n ");
        let tokens: Vec<_> = decl
            .get(DependencyContext::ValueRhs)
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(tokens, vec!["n", "grad(n)"]);
    }

    #[test]
    fn insert_appends_and_set_replaces() {
        let mut decl = DependencyDeclaration::default();
        decl.insert(DependencyContext::ValueLhs, ["n", "change(n)"]);
        assert!(decl.has_lhs());
        decl.set(DependencyContext::ValueLhs, "");
        assert!(!decl.has_lhs());
        assert!(decl.is_empty());
    }

    #[test]
    fn field_table_detects_gap() {
        let mut set = AttributeSet::new();
        set.solution_builder().set_variable_name(0, "c");
        set.solution_builder().set_variable_name(2, "n");
        assert!(matches!(
            set.field_table(),
            Err(FieldTableError::NonDenseIndex { .. })
        ));
    }

    #[test]
    fn context_side_and_term() {
        assert_eq!(DependencyContext::GradientLhs.side(), EquationSide::Lhs);
        assert_eq!(DependencyContext::GradientLhs.term(), ResidualTerm::Gradient);
        assert_eq!(DependencyContext::ValueRhs.to_string(), "value_rhs");
    }
}
