//! Adaptive 1D interval mesh with discontinuous piecewise-linear DoFs.

use crate::error::MeshError;
use crate::mesh::{CellPoints, CellSamples, LayoutChange, Mesh, RefinementFlag};
use phasefield_core::{CellId, MeshGeneration, SolutionVector};
use smallvec::smallvec;

/// Degrees of freedom per cell and component: one at each end point.
pub const DOFS_PER_CELL: usize = 2;

#[derive(Clone, Debug)]
struct Cell {
    lo: f64,
    hi: f64,
    level: u32,
    parent: Option<CellId>,
    children: Option<[CellId; 2]>,
}

fn slot(cell: CellId) -> usize {
    cell.0 as usize
}

/// A binary-tree refined interval `[lo, hi]`.
///
/// Every cell ever created lives in one store indexed by [`CellId`];
/// coarsening deactivates children instead of freeing them, so a cell id
/// is never reused for a different interval. The active cells, ordered left
/// to right, form the current layout. Each active cell carries
/// [`DOFS_PER_CELL`] degrees of freedom per component, so data of
/// a vector is laid out as `[(cell * 2 + end) * components + component]`.
///
/// Partitions own contiguous runs of active cells. Every partition holds a
/// full replica of the tree.
///
/// # Examples
///
/// ```
/// use phasefield_mesh::{IntervalMesh, Mesh};
///
/// let mut mesh = IntervalMesh::new(0.0, 1.0, 2).unwrap();
/// mesh.refine_global(2).unwrap();
/// assert_eq!(mesh.locally_owned_cells().len(), 8);
/// assert_eq!(mesh.n_dofs(), 16);
/// ```
#[derive(Clone, Debug)]
pub struct IntervalMesh {
    lo: f64,
    hi: f64,
    cells: Vec<Cell>,
    active: Vec<CellId>,
    position: Vec<Option<usize>>,
    flags: Vec<RefinementFlag>,
    generation: MeshGeneration,
    capacity: usize,
    rank: usize,
    partitions: usize,
}

impl IntervalMesh {
    /// Largest cell store: cell ids are `u32`.
    pub const MAX_CELLS: usize = u32::MAX as usize;

    /// Split `[lo, hi]` into `coarse_cells` equal level-0 cells.
    pub fn new(lo: f64, hi: f64, coarse_cells: u32) -> Result<Self, MeshError> {
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(MeshError::InvalidDomain {
                reason: format!("interval [{lo}, {hi}] must be finite and non-empty"),
            });
        }
        if coarse_cells == 0 {
            return Err(MeshError::InvalidDomain {
                reason: "at least one coarse cell is required".to_string(),
            });
        }
        let h = (hi - lo) / f64::from(coarse_cells);
        let cells: Vec<Cell> = (0..coarse_cells)
            .map(|i| Cell {
                lo: lo + h * f64::from(i),
                hi: if i + 1 == coarse_cells {
                    hi
                } else {
                    lo + h * f64::from(i + 1)
                },
                level: 0,
                parent: None,
                children: None,
            })
            .collect();
        let active = (0..coarse_cells).map(CellId).collect();
        let mut mesh = Self {
            lo,
            hi,
            flags: vec![RefinementFlag::None; cells.len()],
            cells,
            active,
            position: Vec::new(),
            generation: MeshGeneration(0),
            capacity: Self::MAX_CELLS,
            rank: 0,
            partitions: 1,
        };
        mesh.index_active();
        Ok(mesh)
    }

    /// Limit the cell store to `capacity` cells. Planning a change that
    /// needs more fails with [`MeshError::CapacityExceeded`].
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.min(Self::MAX_CELLS);
        self
    }

    /// Make this replica partition `rank` of `partitions`.
    pub fn with_partition(mut self, rank: usize, partitions: usize) -> Result<Self, MeshError> {
        if partitions == 0 || rank >= partitions {
            return Err(MeshError::InvalidDomain {
                reason: format!("partition {rank} out of range for {partitions} partitions"),
            });
        }
        self.rank = rank;
        self.partitions = partitions;
        Ok(self)
    }

    /// Refine every active cell `times` times.
    pub fn refine_global(&mut self, times: u32) -> Result<(), MeshError> {
        for _ in 0..times {
            for i in 0..self.active.len() {
                self.flags[slot(self.active[i])] = RefinementFlag::Refine;
            }
            let change = self.plan_refinement()?;
            self.execute_refinement(change)?;
        }
        Ok(())
    }

    /// The domain end points.
    pub fn domain(&self) -> (f64, f64) {
        (self.lo, self.hi)
    }

    /// Active cells of every partition, left to right.
    pub fn active_cells(&self) -> &[CellId] {
        &self.active
    }

    /// Cells in the store, active or not.
    pub fn stored_cells(&self) -> usize {
        self.cells.len()
    }

    /// The store capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `(rank, partitions)` of this replica.
    pub fn partition(&self) -> (usize, usize) {
        (self.rank, self.partitions)
    }

    /// End points of an active cell.
    pub fn bounds(&self, cell: CellId) -> Result<(f64, f64), MeshError> {
        self.active_position(cell)?;
        let c = &self.cells[slot(cell)];
        Ok((c.lo, c.hi))
    }

    /// Nodal values of `f(x, component)` on the current layout.
    pub fn interpolate(&self, components: usize, f: impl Fn(f64, usize) -> f64) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.n_dofs() * components);
        for &id in &self.active {
            let c = &self.cells[slot(id)];
            for x in [c.lo, c.hi] {
                for comp in 0..components {
                    out.push(f(x, comp));
                }
            }
        }
        out
    }

    fn cell(&self, cell: CellId) -> Result<&Cell, MeshError> {
        self.cells
            .get(slot(cell))
            .ok_or(MeshError::UnknownCell { cell })
    }

    fn active_position(&self, cell: CellId) -> Result<usize, MeshError> {
        self.cell(cell)?;
        self.position[slot(cell)].ok_or(MeshError::InactiveCell { cell })
    }

    fn index_active(&mut self) {
        self.position = vec![None; self.cells.len()];
        for (i, &id) in self.active.iter().enumerate() {
            self.position[slot(id)] = Some(i);
        }
    }

    /// Whether active cells `i` and `i + 1` are the two children of one
    /// parent and both are flagged for coarsening.
    fn coarsenable_pair(&self, i: usize) -> Option<CellId> {
        let left = self.active[i];
        let right = *self.active.get(i + 1)?;
        let parent = self.cells[slot(left)].parent?;
        let siblings = self.cells[slot(parent)].children?;
        (siblings == [left, right]
            && self.flags[slot(right)] == RefinementFlag::Coarsen)
            .then_some(parent)
    }
}

// ── Layout change ──────────────────────────────────────────────────

/// How one entry of the new layout is built from the old one. Indices are
/// positions in the old active list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CellOp {
    Keep(usize),
    Refine(usize),
    Coarsen(usize, usize),
}

/// A planned [`IntervalMesh`] layout change.
#[derive(Clone, Debug)]
pub struct IntervalChange {
    old_generation: MeshGeneration,
    old_cells: usize,
    new_active: Vec<CellId>,
    ops: Vec<CellOp>,
    allocations: Vec<CellId>,
    refined: usize,
    coarsened: usize,
}

impl IntervalChange {
    /// Active cells of the new layout, left to right.
    pub fn new_cells(&self) -> &[CellId] {
        &self.new_active
    }
}

impl LayoutChange for IntervalChange {
    fn old_generation(&self) -> MeshGeneration {
        self.old_generation
    }

    fn old_dof_count(&self) -> usize {
        self.old_cells * DOFS_PER_CELL
    }

    fn new_dof_count(&self) -> usize {
        self.new_active.len() * DOFS_PER_CELL
    }

    fn refined_cells(&self) -> usize {
        self.refined
    }

    fn coarsened_cells(&self) -> usize {
        self.coarsened
    }

    /// Kept cells copy their values. Refined cells split the linear
    /// function exactly at the midpoint. Coarsened parents take the outer
    /// end values of their children, which undoes a refinement exactly.
    fn prolong(&self, old: &[f64], components: usize) -> Result<Vec<f64>, MeshError> {
        let expected = self.old_dof_count() * components;
        if old.len() != expected {
            return Err(MeshError::LayoutMismatch {
                expected,
                actual: old.len(),
            });
        }
        let node = |cell: usize, end: usize| {
            let start = (cell * DOFS_PER_CELL + end) * components;
            &old[start..start + components]
        };

        let mut out = Vec::with_capacity(self.new_dof_count() * components);
        for op in &self.ops {
            match *op {
                CellOp::Keep(k) => {
                    out.extend_from_slice(node(k, 0));
                    out.extend_from_slice(node(k, 1));
                }
                CellOp::Refine(k) => {
                    let (a, b) = (node(k, 0), node(k, 1));
                    let mid = || a.iter().zip(b).map(|(x, y)| 0.5 * (x + y));
                    out.extend_from_slice(a);
                    out.extend(mid());
                    out.extend(mid());
                    out.extend_from_slice(b);
                }
                CellOp::Coarsen(left, right) => {
                    out.extend_from_slice(node(left, 0));
                    out.extend_from_slice(node(right, 1));
                }
            }
        }

        let expected = self.new_dof_count() * components;
        if out.len() != expected {
            return Err(MeshError::LayoutMismatch {
                expected,
                actual: out.len(),
            });
        }
        Ok(out)
    }
}

// ── Mesh implementation ────────────────────────────────────────────

impl Mesh for IntervalMesh {
    type Change = IntervalChange;

    fn dim(&self) -> usize {
        1
    }

    fn generation(&self) -> MeshGeneration {
        self.generation
    }

    fn n_dofs(&self) -> usize {
        self.active.len() * DOFS_PER_CELL
    }

    fn locally_owned_cells(&self) -> Vec<CellId> {
        let n = self.active.len();
        let start = n * self.rank / self.partitions;
        let end = n * (self.rank + 1) / self.partitions;
        self.active[start..end].to_vec()
    }

    fn level(&self, cell: CellId) -> Result<u32, MeshError> {
        self.active_position(cell)?;
        Ok(self.cells[slot(cell)].level)
    }

    fn sample_points(&self, cell: CellId) -> Result<CellPoints, MeshError> {
        let (lo, hi) = self.bounds(cell)?;
        Ok(smallvec![smallvec![lo], smallvec![hi]])
    }

    fn sample(&self, cell: CellId, vector: &SolutionVector) -> Result<CellSamples, MeshError> {
        if vector.generation() != self.generation {
            return Err(MeshError::StaleGeneration {
                expected: self.generation,
                found: vector.generation(),
            });
        }
        let components = vector.components();
        let expected = self.n_dofs() * components;
        if vector.data().len() != expected {
            return Err(MeshError::LayoutMismatch {
                expected,
                actual: vector.data().len(),
            });
        }
        let k = self.active_position(cell)?;
        let start = k * DOFS_PER_CELL * components;
        Ok(CellSamples::from_slice(
            &vector.data()[start..start + DOFS_PER_CELL * components],
        ))
    }

    fn set_flag(&mut self, cell: CellId, flag: RefinementFlag) -> Result<(), MeshError> {
        self.active_position(cell)?;
        self.flags[slot(cell)] = flag;
        Ok(())
    }

    fn flag(&self, cell: CellId) -> Result<RefinementFlag, MeshError> {
        self.active_position(cell)?;
        Ok(self.flags[slot(cell)])
    }

    fn clear_flags(&mut self) {
        self.flags.fill(RefinementFlag::None);
    }

    fn plan_refinement(&self) -> Result<IntervalChange, MeshError> {
        let mut next_id = self.cells.len();
        let mut ops = Vec::with_capacity(self.active.len());
        let mut new_active = Vec::with_capacity(self.active.len());
        let mut allocations = Vec::new();
        let (mut refined, mut coarsened, mut dropped) = (0, 0, 0);

        let mut i = 0;
        while i < self.active.len() {
            let id = self.active[i];
            match self.flags[slot(id)] {
                RefinementFlag::Refine => {
                    let children = match self.cells[slot(id)].children {
                        Some(children) => children,
                        None => {
                            let first = CellId(next_id as u32);
                            let second = CellId(next_id as u32 + 1);
                            next_id += 2;
                            allocations.push(id);
                            [first, second]
                        }
                    };
                    new_active.extend(children);
                    ops.push(CellOp::Refine(i));
                    refined += 1;
                    i += 1;
                }
                RefinementFlag::Coarsen => match self.coarsenable_pair(i) {
                    Some(parent) => {
                        new_active.push(parent);
                        ops.push(CellOp::Coarsen(i, i + 1));
                        coarsened += 1;
                        i += 2;
                    }
                    None => {
                        dropped += 1;
                        new_active.push(id);
                        ops.push(CellOp::Keep(i));
                        i += 1;
                    }
                },
                RefinementFlag::None => {
                    new_active.push(id);
                    ops.push(CellOp::Keep(i));
                    i += 1;
                }
            }
        }

        if dropped > 0 {
            log::warn!(
                "dropped {dropped} coarsen flag(s): sibling not active or not flagged for coarsening"
            );
        }
        if next_id > self.capacity {
            return Err(MeshError::CapacityExceeded {
                requested: next_id,
                capacity: self.capacity,
            });
        }

        Ok(IntervalChange {
            old_generation: self.generation,
            old_cells: self.active.len(),
            new_active,
            ops,
            allocations,
            refined,
            coarsened,
        })
    }

    fn execute_refinement(&mut self, change: IntervalChange) -> Result<(), MeshError> {
        if change.old_generation != self.generation || change.old_cells != self.active.len() {
            return Err(MeshError::StaleGeneration {
                expected: self.generation,
                found: change.old_generation,
            });
        }
        for parent in change.allocations {
            let p = &self.cells[slot(parent)];
            let (lo, hi, level) = (p.lo, p.hi, p.level + 1);
            let mid = 0.5 * (lo + hi);
            let first = CellId(self.cells.len() as u32);
            let second = CellId(first.0 + 1);
            for (lo, hi) in [(lo, mid), (mid, hi)] {
                self.cells.push(Cell {
                    lo,
                    hi,
                    level,
                    parent: Some(parent),
                    children: None,
                });
            }
            self.cells[slot(parent)].children = Some([first, second]);
        }
        self.active = change.new_active;
        self.flags = vec![RefinementFlag::None; self.cells.len()];
        self.index_active();
        self.generation = self.generation.next();
        log::debug!(
            "interval mesh generation {}: {} active cells ({} refined, {} coarsened)",
            self.generation,
            self.active.len(),
            change.refined,
            change.coarsened
        );
        Ok(())
    }
}
