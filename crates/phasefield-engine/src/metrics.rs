//! Per-event metrics for adaptive refinement.
//!
//! [`RefinementMetrics`] captures timing and size data for a single
//! refinement event, so drivers can log or plot how much of a run is
//! spent remeshing.

/// Timing and layout metrics collected during one refinement event.
///
/// All durations are in microseconds. The controller populates these
/// fields after each event that ran marking; consumers read them from the
/// most recent event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RefinementMetrics {
    /// Wall-clock time for the entire event, in microseconds.
    pub total_us: u64,
    /// Time spent sampling fields and classifying cells, in microseconds.
    pub marking_us: u64,
    /// Time spent planning the layout and transferring vectors, in microseconds.
    pub transfer_us: u64,
    /// Marking passes run (more than one only at step 0).
    pub passes: u32,
    /// Locally owned cells that matched the predicate.
    pub cells_marked: usize,
    /// Cells split across all passes.
    pub cells_refined: usize,
    /// Parent cells restored across all passes.
    pub cells_coarsened: usize,
    /// Degrees of freedom per component before the event.
    pub dofs_before: usize,
    /// Degrees of freedom per component after the event.
    pub dofs_after: usize,
    /// Cumulative number of events that changed the layout.
    pub layout_changes: u64,
    /// Cumulative number of events that aborted.
    pub aborts: u64,
}

impl RefinementMetrics {
    /// Whether this event left the layout as it was.
    pub fn unchanged(&self) -> bool {
        self.cells_refined == 0 && self.cells_coarsened == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = RefinementMetrics::default();
        assert_eq!(m.total_us, 0);
        assert_eq!(m.marking_us, 0);
        assert_eq!(m.transfer_us, 0);
        assert_eq!(m.passes, 0);
        assert_eq!(m.cells_marked, 0);
        assert_eq!(m.dofs_before, 0);
        assert_eq!(m.dofs_after, 0);
        assert_eq!(m.layout_changes, 0);
        assert_eq!(m.aborts, 0);
        assert!(m.unchanged());
    }

    #[test]
    fn refined_cells_mark_a_change() {
        let m = RefinementMetrics {
            cells_refined: 3,
            dofs_before: 8,
            dofs_after: 14,
            ..Default::default()
        };
        assert!(!m.unchanged());
    }
}
