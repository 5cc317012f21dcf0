//! Solution vectors tied to a mesh layout.

use crate::id::{FieldId, MeshGeneration};

/// Which time level a vector holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VectorRole {
    /// The current solution.
    Current,
    /// The solution at the previous time step (implicit schemes).
    Previous,
}

/// One field's degrees of freedom on one mesh layout.
///
/// `data.len()` is always `dof_count * components` for the layout of
/// `generation`. The vector is reallocated, never resized in place, when
/// the layout changes.
#[derive(Clone, Debug, PartialEq)]
pub struct SolutionVector {
    field: FieldId,
    role: VectorRole,
    components: usize,
    generation: MeshGeneration,
    data: Vec<f64>,
}

impl SolutionVector {
    /// Wrap a fully populated buffer.
    pub fn new(
        field: FieldId,
        role: VectorRole,
        components: usize,
        generation: MeshGeneration,
        data: Vec<f64>,
    ) -> Self {
        Self {
            field,
            role,
            components,
            generation,
            data,
        }
    }

    /// A zero-filled vector for `dof_count` degrees of freedom.
    pub fn zeros(
        field: FieldId,
        role: VectorRole,
        components: usize,
        generation: MeshGeneration,
        dof_count: usize,
    ) -> Self {
        Self::new(
            field,
            role,
            components,
            generation,
            vec![0.0; dof_count * components],
        )
    }

    /// The field this vector belongs to.
    pub fn field(&self) -> FieldId {
        self.field
    }

    /// The time level held.
    pub fn role(&self) -> VectorRole {
        self.role
    }

    /// Values per degree of freedom.
    pub fn components(&self) -> usize {
        self.components
    }

    /// The mesh layout the data is laid out for.
    pub fn generation(&self) -> MeshGeneration {
        self.generation
    }

    /// Raw data, component-interleaved per degree of freedom.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Mutable raw data. The length cannot change.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Number of degrees of freedom.
    pub fn dof_count(&self) -> usize {
        if self.components == 0 {
            0
        } else {
            self.data.len() / self.components
        }
    }

    /// Index of the first NaN or infinite entry.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.data.iter().position(|v| !v.is_finite())
    }
}

/// The ordered set of all live solution vectors.
///
/// Order is declaration order of the fields (current vectors first for
/// each field, then previous). Transfer preserves the order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolutionVectorSet {
    vectors: Vec<SolutionVector>,
}

impl SolutionVectorSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a vector.
    pub fn push(&mut self, vector: SolutionVector) {
        self.vectors.push(vector);
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the set holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Iterate in set order.
    pub fn iter(&self) -> std::slice::Iter<'_, SolutionVector> {
        self.vectors.iter()
    }

    /// Iterate mutably in set order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, SolutionVector> {
        self.vectors.iter_mut()
    }

    /// Look up the vector for a field and role.
    pub fn get(&self, field: FieldId, role: VectorRole) -> Option<&SolutionVector> {
        self.vectors
            .iter()
            .find(|v| v.field == field && v.role == role)
    }

    /// Mutable lookup for a field and role.
    pub fn get_mut(&mut self, field: FieldId, role: VectorRole) -> Option<&mut SolutionVector> {
        self.vectors
            .iter_mut()
            .find(|v| v.field == field && v.role == role)
    }

    /// The current-time vector of a field.
    pub fn current(&self, field: FieldId) -> Option<&SolutionVector> {
        self.get(field, VectorRole::Current)
    }

    /// The layout shared by every vector, or `None` if the set is empty
    /// or the vectors disagree.
    pub fn generation(&self) -> Option<MeshGeneration> {
        let first = self.vectors.first()?.generation;
        self.vectors
            .iter()
            .all(|v| v.generation == first)
            .then_some(first)
    }
}

impl<'a> IntoIterator for &'a SolutionVectorSet {
    type Item = &'a SolutionVector;
    type IntoIter = std::slice::Iter<'a, SolutionVector>;

    fn into_iter(self) -> Self::IntoIter {
        self.vectors.iter()
    }
}

impl FromIterator<SolutionVector> for SolutionVectorSet {
    fn from_iter<I: IntoIterator<Item = SolutionVector>>(iter: I) -> Self {
        Self {
            vectors: iter.into_iter().collect(),
        }
    }
}
