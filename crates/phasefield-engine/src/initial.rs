//! Initial conditions, re-sampled after every initial refinement pass.

use phasefield_core::{FieldId, NumericError, SolutionVector, SolutionVectorSet};
use phasefield_mesh::{IntervalMesh, Mesh};

/// Fills solution vectors with their initial state on the current layout.
pub trait InitialConditions<M: Mesh + ?Sized> {
    /// Overwrite every vector in `vectors` with the initial state sampled
    /// on `mesh`. Vector lengths and layouts must not change.
    ///
    /// On error `vectors` is left as it was.
    fn resample(&self, mesh: &M, vectors: &mut SolutionVectorSet) -> Result<(), NumericError>;
}

/// Initial profile `f(field, x, component)` on an [`IntervalMesh`].
///
/// Both current and previous vectors receive the profile.
pub struct IntervalProfile<F> {
    f: F,
}

impl<F> IntervalProfile<F>
where
    F: Fn(FieldId, f64, usize) -> f64,
{
    /// Wrap a profile function.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> InitialConditions<IntervalMesh> for IntervalProfile<F>
where
    F: Fn(FieldId, f64, usize) -> f64,
{
    fn resample(
        &self,
        mesh: &IntervalMesh,
        vectors: &mut SolutionVectorSet,
    ) -> Result<(), NumericError> {
        let mut resampled = Vec::with_capacity(vectors.len());
        for v in vectors.iter() {
            let field = v.field();
            let data = mesh.interpolate(v.components(), |x, c| (self.f)(field, x, c));
            if let Some(&value) = data.iter().find(|x| !x.is_finite()) {
                return Err(NumericError::NonFinite {
                    field,
                    cell: None,
                    value,
                });
            }
            resampled.push(SolutionVector::new(
                field,
                v.role(),
                v.components(),
                mesh.generation(),
                data,
            ));
        }
        for (v, new) in vectors.iter_mut().zip(resampled) {
            *v = new;
        }
        Ok(())
    }
}

impl<F> std::fmt::Debug for IntervalProfile<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalProfile").finish_non_exhaustive()
    }
}
