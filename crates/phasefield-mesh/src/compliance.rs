//! Mesh trait compliance test helpers.
//!
//! These functions verify that a Mesh implementation satisfies the
//! invariants the refinement controller relies on.

use crate::interval::IntervalMesh;
use crate::mesh::{LayoutChange, Mesh, RefinementFlag};
use indexmap::IndexSet;

/// Assert that owned cells are unique and all answer level and sample queries.
pub fn assert_owned_cells_queryable<M: Mesh>(mesh: &M) {
    let cells = mesh.locally_owned_cells();
    let unique: IndexSet<_> = cells.iter().collect();
    assert_eq!(unique.len(), cells.len(), "locally_owned_cells has duplicates");
    for cell in cells {
        mesh.level(cell)
            .unwrap_or_else(|e| panic!("level({cell}) failed: {e}"));
        let points = mesh
            .sample_points(cell)
            .unwrap_or_else(|e| panic!("sample_points({cell}) failed: {e}"));
        assert!(!points.is_empty(), "cell {cell} has no sample points");
        for p in &points {
            assert_eq!(p.len(), mesh.dim(), "sample point {p:?} has wrong dimension");
        }
    }
}

/// Assert that an unflagged mesh plans an identity change that preserves data.
pub fn assert_identity_plan<M: Mesh>(mesh: &M) {
    let change = mesh.plan_refinement().expect("planning without flags");
    assert!(change.is_identity(), "no flags set but change is not identity");
    assert_eq!(change.old_generation(), mesh.generation());
    assert_eq!(change.new_dof_count(), mesh.n_dofs());
    let data: Vec<f64> = (0..mesh.n_dofs()).map(|i| i as f64).collect();
    assert_eq!(change.prolong(&data, 1).expect("prolong"), data);
}

/// Assert that flags round-trip and `clear_flags` resets them.
pub fn assert_flags_round_trip<M: Mesh + Clone>(mesh: &M) {
    let mut mesh = mesh.clone();
    let cells = mesh.locally_owned_cells();
    for &cell in &cells {
        mesh.set_flag(cell, RefinementFlag::Refine).expect("set_flag");
        assert_eq!(mesh.flag(cell).expect("flag"), RefinementFlag::Refine);
    }
    mesh.clear_flags();
    for &cell in &cells {
        assert_eq!(mesh.flag(cell).expect("flag"), RefinementFlag::None);
    }
}

/// Assert that the partitions of `mesh` are disjoint, ordered, and cover
/// every active cell.
pub fn assert_partitions_cover(mesh: &IntervalMesh, partitions: usize) {
    let mut all = Vec::new();
    for rank in 0..partitions {
        let replica = mesh
            .clone()
            .with_partition(rank, partitions)
            .expect("valid partition");
        all.extend(replica.locally_owned_cells());
    }
    assert_eq!(all, mesh.active_cells(), "partitions do not tile the layout");
}

/// Run all compliance checks on a mesh.
pub fn run_full_compliance<M: Mesh + Clone>(mesh: &M) {
    assert_owned_cells_queryable(mesh);
    assert_identity_plan(mesh);
    assert_flags_round_trip(mesh);
}
