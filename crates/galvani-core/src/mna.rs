//! Block Modified Nodal Analysis (MNA) matrix structures.
//!
//! The system is kept as four blocks plus two source vectors:
//!
//! ```text
//!   A = [ G  B ]      z = [ i ]      x = [ v ]
//!       [ C  D ]          [ e ]          [ j ]
//! ```
//!
//! `G` is indexed by node number *including* ground: row/column 0 carries
//! the ground datum equation `G[0][0] = 1`, which pins `v[0]` to exactly
//! 0 V and keeps the assembled system well-posed. Device stamps never touch
//! index 0; the stamp methods below drop any term that lands there.
//!
//! The system is zeroed once when a run starts and never again: every stamp
//! a device applies afterwards is a delta against its previous contribution.

use nalgebra::{DMatrix, DVector};

use crate::node::NodeId;

/// The block MNA system for a circuit with `n` non-ground nodes and `m`
/// voltage-source rows.
#[derive(Debug, Clone)]
pub struct MnaSystem {
    /// Node conductance block, (n+1) x (n+1); row/col 0 is the ground datum.
    g: DMatrix<f64>,
    /// Node-to-source coupling block, (n+1) x m.
    b: DMatrix<f64>,
    /// Source-to-node coupling block, m x (n+1); equals `B` transposed by
    /// construction.
    c: DMatrix<f64>,
    /// Source-to-source block, m x m (series resistances land here).
    d: DMatrix<f64>,
    /// Independent current vector, length n+1.
    i: DVector<f64>,
    /// Independent source-value vector, length m.
    e: DVector<f64>,
    /// Number of nodes excluding ground.
    num_nodes: usize,
    /// Number of voltage-source rows.
    num_sources: usize,
}

impl MnaSystem {
    /// Create a zeroed system for `num_nodes` non-ground nodes and
    /// `num_sources` voltage-source rows.
    pub fn new(num_nodes: usize, num_sources: usize) -> Self {
        let n1 = num_nodes + 1;
        Self {
            g: DMatrix::zeros(n1, n1),
            b: DMatrix::zeros(n1, num_sources),
            c: DMatrix::zeros(num_sources, n1),
            d: DMatrix::zeros(num_sources, num_sources),
            i: DVector::zeros(n1),
            e: DVector::zeros(num_sources),
            num_nodes,
            num_sources,
        }
    }

    /// Resize to new dimensions, zeroing everything.
    ///
    /// Only legal while the simulation is stopped.
    pub fn resize(&mut self, num_nodes: usize, num_sources: usize) {
        *self = Self::new(num_nodes, num_sources);
    }

    /// Zero the matrices and vectors in place.
    pub fn clear(&mut self) {
        self.g.fill(0.0);
        self.b.fill(0.0);
        self.c.fill(0.0);
        self.d.fill(0.0);
        self.i.fill(0.0);
        self.e.fill(0.0);
    }

    /// Total size of the assembled system (ground + nodes + source rows).
    pub fn size(&self) -> usize {
        self.num_nodes + 1 + self.num_sources
    }

    /// Number of nodes excluding ground.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of voltage-source rows.
    pub fn num_sources(&self) -> usize {
        self.num_sources
    }

    /// Set the ground datum equation `G[0][0] = 1`.
    ///
    /// Applied once per run, right after the system is zeroed.
    pub fn stamp_ground_datum(&mut self) {
        self.g[(0, 0)] = 1.0;
    }

    /// Stamp a conductance delta between two nodes.
    ///
    /// For a conductance `g` between nodes k and l:
    /// - `G[k][k] += g`, `G[l][l] += g`
    /// - `G[k][l] -= g`, `G[l][k] -= g`
    ///
    /// Terms touching ground (index 0) are omitted. A floating port
    /// (`None`) excludes the whole stamp: an open branch carries no
    /// current.
    pub fn stamp_conductance(&mut self, a: Option<NodeId>, b: Option<NodeId>, g: f64) {
        let (Some(a), Some(b)) = (a, b) else { return };
        let (k, l) = (a.index(), b.index());
        if k != 0 {
            self.g[(k, k)] += g;
        }
        if l != 0 {
            self.g[(l, l)] += g;
        }
        if k != 0 && l != 0 {
            self.g[(k, l)] -= g;
            self.g[(l, k)] -= g;
        }
    }

    /// Stamp a current-source delta driving `current` into node k and out
    /// of node l: `i[k] += I`, `i[l] -= I` (ground omitted).
    ///
    /// Like the conductance stamp, a floating terminal suppresses the whole
    /// stamp.
    pub fn stamp_current_source(&mut self, k: Option<NodeId>, l: Option<NodeId>, current: f64) {
        let (Some(k), Some(l)) = (k, l) else { return };
        if !k.is_ground() {
            self.i[k.index()] += current;
        }
        if !l.is_ground() {
            self.i[l.index()] -= current;
        }
    }

    /// Stamp a transconductance (VCCS) delta.
    ///
    /// A current `gm * (V[p] - V[q])` is driven through the sensed pair
    /// (k, l), out of k. Four cross terms, rows indexed by the sensed pair
    /// and columns by the control pair; ground terms omitted, any floating
    /// port suppresses the stamp.
    pub fn stamp_transconductance(
        &mut self,
        sense_pos: Option<NodeId>,
        sense_neg: Option<NodeId>,
        ctrl_pos: Option<NodeId>,
        ctrl_neg: Option<NodeId>,
        gm: f64,
    ) {
        let (Some(k), Some(l), Some(p), Some(q)) = (sense_pos, sense_neg, ctrl_pos, ctrl_neg)
        else {
            return;
        };
        let (k, l, p, q) = (k.index(), l.index(), p.index(), q.index());
        if k != 0 && p != 0 {
            self.g[(k, p)] += gm;
        }
        if k != 0 && q != 0 {
            self.g[(k, q)] -= gm;
        }
        if l != 0 && p != 0 {
            self.g[(l, p)] -= gm;
        }
        if l != 0 && q != 0 {
            self.g[(l, q)] += gm;
        }
    }

    /// Stamp the coupling entries of a voltage-source row:
    /// `B[k][row] = 1, C[row][k] = 1, B[l][row] = -1, C[row][l] = -1`.
    ///
    /// Applied once per run by the owning device; ground terms omitted, a
    /// floating terminal drops its side.
    pub fn stamp_source_coupling(
        &mut self,
        pos: Option<NodeId>,
        neg: Option<NodeId>,
        row: usize,
    ) {
        if let Some(k) = pos {
            if !k.is_ground() {
                self.b[(k.index(), row)] += 1.0;
                self.c[(row, k.index())] += 1.0;
            }
        }
        if let Some(l) = neg {
            if !l.is_ground() {
                self.b[(l.index(), row)] -= 1.0;
                self.c[(row, l.index())] -= 1.0;
            }
        }
    }

    /// Assign a voltage-source row's value: `e[row] = value`.
    ///
    /// Assignment, not accumulation: exactly one device owns each row.
    pub fn set_source_value(&mut self, row: usize, value: f64) {
        self.e[row] = value;
    }

    /// Stamp a series-resistance delta onto a source row:
    /// `D[row][row] -= r` (inductor companions and lossy sources).
    pub fn stamp_series_resistance(&mut self, row: usize, r: f64) {
        self.d[(row, row)] -= r;
    }

    /// Compose the dense system `A = [[G,B],[C,D]]`, `z = [i;e]`.
    pub fn assemble(&self) -> (DMatrix<f64>, DVector<f64>) {
        let n1 = self.num_nodes + 1;
        let m = self.num_sources;
        let size = n1 + m;

        let mut a = DMatrix::zeros(size, size);
        a.view_mut((0, 0), (n1, n1)).copy_from(&self.g);
        a.view_mut((0, n1), (n1, m)).copy_from(&self.b);
        a.view_mut((n1, 0), (m, n1)).copy_from(&self.c);
        a.view_mut((n1, n1), (m, m)).copy_from(&self.d);

        let mut z = DVector::zeros(size);
        z.rows_mut(0, n1).copy_from(&self.i);
        z.rows_mut(n1, m).copy_from(&self.e);

        (a, z)
    }

    /// The conductance block (tests and diagnostics).
    pub fn g_block(&self) -> &DMatrix<f64> {
        &self.g
    }

    /// The node-to-source coupling block.
    pub fn b_block(&self) -> &DMatrix<f64> {
        &self.b
    }

    /// The source-to-node coupling block.
    pub fn c_block(&self) -> &DMatrix<f64> {
        &self.c
    }

    /// The source-to-source block.
    pub fn d_block(&self) -> &DMatrix<f64> {
        &self.d
    }

    /// The independent current vector.
    pub fn i_vector(&self) -> &DVector<f64> {
        &self.i
    }

    /// The source-value vector.
    pub fn e_vector(&self) -> &DVector<f64> {
        &self.e
    }
}

/// A solved operating point: node voltages and source-row branch currents.
///
/// `voltages[0]` is the ground row and always reads 0 V through the
/// accessor; out-of-range lookups also read zero, matching the behavior of
/// probes on a circuit that shrank since the solution was published.
#[derive(Debug, Clone)]
pub struct Solution {
    voltages: DVector<f64>,
    currents: DVector<f64>,
}

impl Solution {
    /// Create a zeroed solution for `num_nodes` non-ground nodes and
    /// `num_sources` source rows.
    pub fn new(num_nodes: usize, num_sources: usize) -> Self {
        Self {
            voltages: DVector::zeros(num_nodes + 1),
            currents: DVector::zeros(num_sources),
        }
    }

    /// Load from an assembled solve vector `x = [v;j]`.
    pub fn load(&mut self, x: &DVector<f64>) {
        let n1 = self.voltages.len();
        let m = self.currents.len();
        debug_assert_eq!(x.len(), n1 + m);
        self.voltages.copy_from(&x.rows(0, n1));
        self.currents.copy_from(&x.rows(n1, m));
    }

    /// Voltage at a node; ground is exactly 0 V.
    pub fn voltage(&self, node: NodeId) -> f64 {
        if node.is_ground() {
            return 0.0;
        }
        let idx = node.index();
        if idx < self.voltages.len() {
            self.voltages[idx]
        } else {
            0.0
        }
    }

    /// Voltage difference between two nodes.
    pub fn voltage_between(&self, pos: NodeId, neg: NodeId) -> f64 {
        self.voltage(pos) - self.voltage(neg)
    }

    /// Branch current through a voltage-source row.
    pub fn current(&self, row: usize) -> f64 {
        if row < self.currents.len() {
            self.currents[row]
        } else {
            0.0
        }
    }

    /// Number of non-ground nodes covered by this solution.
    pub fn num_nodes(&self) -> usize {
        self.voltages.len() - 1
    }

    /// Number of source rows covered by this solution.
    pub fn num_sources(&self) -> usize {
        self.currents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_system_dimensions() {
        let sys = MnaSystem::new(3, 1);
        assert_eq!(sys.size(), 5);
        assert_eq!(sys.num_nodes(), 3);
        assert_eq!(sys.num_sources(), 1);
        assert_eq!(sys.g_block().nrows(), 4);
        assert_eq!(sys.b_block().ncols(), 1);
    }

    #[test]
    fn test_stamp_conductance() {
        let mut sys = MnaSystem::new(2, 0);

        sys.stamp_conductance(Some(NodeId::new(1)), Some(NodeId::new(2)), 1.0);

        assert_eq!(sys.g_block()[(1, 1)], 1.0);
        assert_eq!(sys.g_block()[(2, 2)], 1.0);
        assert_eq!(sys.g_block()[(1, 2)], -1.0);
        assert_eq!(sys.g_block()[(2, 1)], -1.0);
    }

    #[test]
    fn test_stamp_conductance_to_ground() {
        let mut sys = MnaSystem::new(2, 0);

        sys.stamp_conductance(Some(NodeId::new(1)), Some(NodeId::GROUND), 0.5);

        // Only the non-ground diagonal is written.
        assert_eq!(sys.g_block()[(1, 1)], 0.5);
        assert_eq!(sys.g_block()[(0, 0)], 0.0);
        assert_eq!(sys.g_block()[(0, 1)], 0.0);
        assert_eq!(sys.g_block()[(1, 0)], 0.0);
    }

    #[test]
    fn test_stamp_conductance_floating_port() {
        let mut sys = MnaSystem::new(2, 0);

        sys.stamp_conductance(Some(NodeId::new(1)), None, 1.0);

        // An open branch stamps nothing at all.
        assert!(sys.g_block().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_stamp_delta_accumulates() {
        let mut sys = MnaSystem::new(1, 0);
        let n1 = Some(NodeId::new(1));

        sys.stamp_conductance(n1, Some(NodeId::GROUND), 2.0e-3);
        sys.stamp_conductance(n1, Some(NodeId::GROUND), -0.5e-3);

        assert!((sys.g_block()[(1, 1)] - 1.5e-3).abs() < 1e-15);
    }

    #[test]
    fn test_stamp_current_source() {
        let mut sys = MnaSystem::new(2, 0);

        sys.stamp_current_source(Some(NodeId::new(1)), Some(NodeId::new(2)), 1e-3);

        assert_eq!(sys.i_vector()[1], 1e-3);
        assert_eq!(sys.i_vector()[2], -1e-3);
        assert_eq!(sys.i_vector()[0], 0.0);
    }

    #[test]
    fn test_stamp_voltage_source_row() {
        let mut sys = MnaSystem::new(2, 1);

        sys.stamp_source_coupling(Some(NodeId::new(1)), Some(NodeId::GROUND), 0);
        sys.set_source_value(0, 5.0);

        assert_eq!(sys.b_block()[(1, 0)], 1.0);
        assert_eq!(sys.c_block()[(0, 1)], 1.0);
        assert_eq!(sys.e_vector()[0], 5.0);
    }

    #[test]
    fn test_stamp_transconductance() {
        let mut sys = MnaSystem::new(3, 0);
        let (d, g, s) = (
            Some(NodeId::new(1)),
            Some(NodeId::new(2)),
            Some(NodeId::new(3)),
        );

        sys.stamp_transconductance(d, s, g, s, 1e-3);

        assert_eq!(sys.g_block()[(1, 2)], 1e-3);
        assert_eq!(sys.g_block()[(1, 3)], -1e-3);
        assert_eq!(sys.g_block()[(3, 2)], -1e-3);
        assert_eq!(sys.g_block()[(3, 3)], 1e-3);
    }

    #[test]
    fn test_assemble_blocks() {
        let mut sys = MnaSystem::new(1, 1);
        sys.stamp_ground_datum();
        sys.stamp_conductance(Some(NodeId::new(1)), Some(NodeId::GROUND), 1e-3);
        sys.stamp_source_coupling(Some(NodeId::new(1)), Some(NodeId::GROUND), 0);
        sys.set_source_value(0, 10.0);

        let (a, z) = sys.assemble();
        assert_eq!(a.nrows(), 3);
        assert_eq!(a[(0, 0)], 1.0, "ground datum");
        assert!((a[(1, 1)] - 1e-3).abs() < 1e-15);
        assert_eq!(a[(1, 2)], 1.0, "B block lands after the node rows");
        assert_eq!(a[(2, 1)], 1.0, "C block mirrors B");
        assert_eq!(z[2], 10.0);
    }

    #[test]
    fn test_solution_accessors() {
        let mut solution = Solution::new(2, 1);
        solution.load(&DVector::from_vec(vec![0.0, 5.0, 2.5, -0.005]));

        assert_eq!(solution.voltage(NodeId::GROUND), 0.0);
        assert_eq!(solution.voltage(NodeId::new(1)), 5.0);
        assert_eq!(solution.voltage(NodeId::new(2)), 2.5);
        assert_eq!(solution.voltage_between(NodeId::new(1), NodeId::new(2)), 2.5);
        assert_eq!(solution.current(0), -0.005);
        assert_eq!(solution.current(7), 0.0, "out-of-range rows read zero");
    }
}
