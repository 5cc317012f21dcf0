use phasefield_core::{FieldId, MeshGeneration, SolutionVector, VectorRole};
use phasefield_mesh::{IntervalMesh, LayoutChange, Mesh, MeshError, RefinementFlag};

fn linear(x: f64, c: usize) -> f64 {
    2.0 * x + c as f64
}

/// Refine cells touching `x0` for `cycles` rounds, carrying a linear field along.
fn refine_towards(mesh: &mut IntervalMesh, x0: f64, cycles: usize) -> Vec<f64> {
    let mut data = mesh.interpolate(2, linear);
    for _ in 0..cycles {
        for cell in mesh.locally_owned_cells() {
            let (lo, hi) = mesh.bounds(cell).unwrap();
            if lo <= x0 && x0 <= hi {
                mesh.set_flag(cell, RefinementFlag::Refine).unwrap();
            }
        }
        let change = mesh.plan_refinement().unwrap();
        data = change.prolong(&data, 2).unwrap();
        mesh.execute_refinement(change).unwrap();
    }
    data
}

#[test]
fn local_refinement_keeps_linear_field_exact() {
    let mut mesh = IntervalMesh::new(0.0, 1.0, 4).unwrap();
    let data = refine_towards(&mut mesh, 0.5, 5);
    assert_eq!(data, mesh.interpolate(2, linear));
    assert_eq!(mesh.generation(), MeshGeneration(5));

    let max_level = mesh
        .active_cells()
        .iter()
        .map(|&c| mesh.level(c).unwrap())
        .max()
        .unwrap();
    assert_eq!(max_level, 5);
}

#[test]
fn execute_clears_flags() {
    let mut mesh = IntervalMesh::new(0.0, 1.0, 2).unwrap();
    let cell = mesh.active_cells()[1];
    mesh.set_flag(cell, RefinementFlag::Refine).unwrap();
    let change = mesh.plan_refinement().unwrap();
    mesh.execute_refinement(change).unwrap();
    for &c in mesh.active_cells() {
        assert_eq!(mesh.flag(c).unwrap(), RefinementFlag::None);
    }
}

#[test]
fn coarsening_back_to_coarse_layout() {
    let mut mesh = IntervalMesh::new(0.0, 1.0, 4).unwrap();
    let coarse = mesh.interpolate(1, |x, _| x * x);
    mesh.refine_global(3).unwrap();
    for _ in 0..3 {
        for cell in mesh.active_cells().to_vec() {
            mesh.set_flag(cell, RefinementFlag::Coarsen).unwrap();
        }
        let change = mesh.plan_refinement().unwrap();
        assert_eq!(change.coarsened_cells(), mesh.active_cells().len() / 2);
        mesh.execute_refinement(change).unwrap();
    }
    assert_eq!(mesh.active_cells(), &[0, 1, 2, 3].map(phasefield_core::CellId));
    assert_eq!(mesh.generation(), MeshGeneration(6));
    let v = SolutionVector::new(FieldId(0), VectorRole::Current, 1, mesh.generation(), coarse);
    let s = mesh.sample(mesh.active_cells()[3], &v).unwrap();
    assert_eq!(s.as_slice(), &[0.5625, 1.0]);
}

#[test]
fn partition_replicas_share_layout() {
    let mut a = IntervalMesh::new(0.0, 1.0, 5).unwrap().with_partition(0, 2).unwrap();
    let mut b = IntervalMesh::new(0.0, 1.0, 5).unwrap().with_partition(1, 2).unwrap();
    assert_eq!(a.locally_owned_cells().len(), 2);
    assert_eq!(b.locally_owned_cells().len(), 3);

    // each replica applies every partition's flags
    let flagged = [a.locally_owned_cells()[0], b.locally_owned_cells()[2]];
    for mesh in [&mut a, &mut b] {
        for &cell in &flagged {
            mesh.set_flag(cell, RefinementFlag::Refine).unwrap();
        }
        let change = mesh.plan_refinement().unwrap();
        mesh.execute_refinement(change).unwrap();
    }
    assert_eq!(a.active_cells(), b.active_cells());
    assert_eq!(a.n_dofs(), 14);
}

#[test]
fn owned_cell_handles_go_stale() {
    let mut mesh = IntervalMesh::new(0.0, 1.0, 1).unwrap();
    let root = mesh.locally_owned_cells()[0];
    mesh.refine_global(1).unwrap();
    assert_eq!(
        mesh.set_flag(root, RefinementFlag::Refine),
        Err(MeshError::InactiveCell { cell: root })
    );
}
