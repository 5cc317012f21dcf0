//! Integration test: solution transfer across refine/coarsen cycles.
//!
//! Refining any set of cells and coarsening the children again must give
//! back every vector exactly, and cells outside the refined set must never
//! change.

use phasefield_core::{FieldId, SolutionVector, SolutionVectorSet, VectorRole};
use phasefield_engine::SolutionTransferCoordinator;
use phasefield_mesh::{IntervalMesh, Mesh, RefinementFlag};
use phasefield_test_utils::seeded_vector;
use proptest::prelude::*;

fn vectors(seed: u64, mesh: &IntervalMesh) -> SolutionVectorSet {
    let previous = seeded_vector(seed + 1, mesh, FieldId(1), 2);
    [
        seeded_vector(seed, mesh, FieldId(0), 1),
        seeded_vector(seed + 2, mesh, FieldId(1), 2),
        SolutionVector::new(
            FieldId(1),
            VectorRole::Previous,
            2,
            mesh.generation(),
            previous.data().to_vec(),
        ),
    ]
    .into_iter()
    .collect()
}

/// Plan, transfer and execute whatever the current flags describe.
fn adapt(mesh: &mut IntervalMesh, vectors: SolutionVectorSet) -> SolutionVectorSet {
    let coordinator = SolutionTransferCoordinator::new();
    let token = coordinator.prepare(mesh, &vectors).unwrap();
    let change = mesh.plan_refinement().unwrap();
    let moved = coordinator.commit(token, &change).unwrap();
    mesh.execute_refinement(change).unwrap();
    moved
}

fn levels(mesh: &IntervalMesh) -> Vec<u32> {
    mesh.active_cells()
        .iter()
        .map(|&c| mesh.level(c).unwrap())
        .collect()
}

proptest! {
    #[test]
    fn refine_then_coarsen_is_exact(
        seed in any::<u64>(),
        mask in prop::collection::vec(any::<bool>(), 8),
    ) {
        let mut mesh = IntervalMesh::new(-1.0, 2.0, 8).unwrap();
        let original = vectors(seed % 1_000_000, &mesh);
        let cells = mesh.active_cells().to_vec();
        let before = levels(&mesh);

        for (&cell, &refine) in cells.iter().zip(&mask) {
            if refine {
                mesh.set_flag(cell, RefinementFlag::Refine).unwrap();
            }
        }
        let refined = adapt(&mut mesh, original.clone());
        let expected_cells = 8 + mask.iter().filter(|&&m| m).count();
        prop_assert_eq!(mesh.active_cells().len(), expected_cells);
        for v in &refined {
            prop_assert_eq!(v.data().len(), mesh.n_dofs() * v.components());
        }

        for cell in mesh.active_cells().to_vec() {
            if mesh.level(cell).unwrap() == 1 {
                mesh.set_flag(cell, RefinementFlag::Coarsen).unwrap();
            }
        }
        let restored = adapt(&mut mesh, refined);
        prop_assert_eq!(levels(&mesh), before);
        prop_assert_eq!(restored.generation(), Some(mesh.generation()));
        for (a, b) in original.iter().zip(&restored) {
            prop_assert_eq!((a.field(), a.role()), (b.field(), b.role()));
            prop_assert_eq!(a.data(), b.data());
        }
    }
}

#[test]
fn untouched_cells_survive_many_cycles() {
    let mut mesh = IntervalMesh::new(0.0, 1.0, 4).unwrap();
    let original = vectors(42, &mesh);
    let last = *mesh.active_cells().last().unwrap();
    let keep = mesh.sample(last, original.current(FieldId(1)).unwrap()).unwrap();

    let mut current = original;
    for _ in 0..5 {
        let first = mesh.active_cells()[0];
        mesh.set_flag(first, RefinementFlag::Refine).unwrap();
        current = adapt(&mut mesh, current);
        let last = *mesh.active_cells().last().unwrap();
        assert_eq!(
            mesh.sample(last, current.current(FieldId(1)).unwrap()).unwrap(),
            keep
        );
    }
    assert_eq!(mesh.generation().0, 5);
    assert_eq!(mesh.active_cells().len(), 9);
}
