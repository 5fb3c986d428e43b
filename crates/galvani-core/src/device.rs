//! Device lifecycle contract and stamping context.
//!
//! Every component model implements [`Device`]. The trait is defined here,
//! next to the circuit and matrix structures, so the device library and the
//! engine can depend on it without a circular dependency.

use std::fmt;

use crate::error::Result;
use crate::mna::{MnaSystem, Solution};
use crate::node::NodeId;

/// Unique identifier for an attached component.
///
/// Component slots are stable: detaching a component tombstones its slot
/// instead of shifting the identifiers of the survivors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(pub usize);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// The persisted form of a device: a type letter, a name, and its numeric
/// parameter fields in the fixed order the type defines.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    /// Type letter (R, C, L, V, I, D, M, Q, U, N).
    pub kind: char,
    /// Device name (e.g. "R1").
    pub name: String,
    /// Numeric fields in the type's defined order.
    pub fields: Vec<f64>,
}

impl DeviceRecord {
    /// Create a new record.
    pub fn new(kind: char, name: impl Into<String>, fields: Vec<f64>) -> Self {
        Self {
            kind,
            name: name.into(),
            fields,
        }
    }
}

/// The lifecycle contract every device type implements.
///
/// The six simulation hooks mirror the phases of the engine's state machine;
/// the default bodies are no-ops so a device only implements the phases it
/// participates in.
///
/// Stamping is incremental: the engine zeroes the MNA system once per run,
/// and every stamp a hook applies must be the *delta* against what the
/// device last stamped. Devices keep explicit `*_stamped` companion fields
/// for this; writing an absolute value into an already-stamped matrix
/// silently corrupts convergence.
pub trait Device: fmt::Debug {
    /// Device name (e.g. "R1", "V1").
    fn name(&self) -> &str;

    /// Number of ports (terminals) this device exposes.
    fn num_ports(&self) -> usize;

    /// Number of voltage-source rows this device claims (0 or 1).
    fn num_sources(&self) -> usize {
        0
    }

    /// Called whenever the circuit (re)assigns this device's source row.
    ///
    /// The device's B/C/e contributions depend on this index, so a device
    /// claiming a row must remember the value it is handed here.
    fn source_index_changed(&mut self, _row: usize) {}

    /// Validate parameters before a run starts.
    fn sim_prep(&mut self) -> Result<()> {
        Ok(())
    }

    /// Initialize companion-model state and apply the first stamp.
    ///
    /// A failure (e.g. a null resistance) aborts the start.
    fn sim_begin(&mut self, _ctx: &mut StampContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Recompute the companion model from the previous step's converged
    /// state; called once per time step before the inner Newton loop.
    fn step_begin(&mut self, _ctx: &mut StampContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Recompute the companion model from the current inner-iteration
    /// voltage guess and re-stamp; called every inner iteration.
    fn step_iter(&mut self, _ctx: &mut StampContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Commit converged state into the history fields the next step's
    /// `step_begin` reads.
    fn step_end(&mut self, _ctx: &mut StampContext<'_>) {}

    /// Release any externally held resource (e.g. an entropy-source file
    /// handle). Called when the run stops or halts.
    fn sim_end(&mut self) {}

    /// The device's persisted record (type letter + fixed-order fields).
    fn record(&self) -> DeviceRecord;
}

/// Per-hook view of the simulation handed to a device.
///
/// Exposes the MNA system, the device's own port-to-node map, the latest
/// solution guess, and the step timing.
pub struct StampContext<'a> {
    /// The MNA system to stamp into.
    pub mna: &'a mut MnaSystem,
    ports: &'a [Option<NodeId>],
    guess: &'a Solution,
    /// Simulated time at the current step (s).
    pub time: f64,
    /// Time-step length (s).
    pub dt: f64,
    /// Engine temperature (K).
    pub temperature: f64,
    damped: &'a mut u32,
}

impl<'a> StampContext<'a> {
    /// Build a context for one device's hook call.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mna: &'a mut MnaSystem,
        ports: &'a [Option<NodeId>],
        guess: &'a Solution,
        time: f64,
        dt: f64,
        temperature: f64,
        damped: &'a mut u32,
    ) -> Self {
        Self {
            mna,
            ports,
            guess,
            time,
            dt,
            temperature,
            damped,
        }
    }

    /// The node a port is assigned to, or `None` if the port is floating.
    pub fn node(&self, port: usize) -> Option<NodeId> {
        self.ports.get(port).copied().flatten()
    }

    /// The latest solved voltage at a port (0.0 for ground or floating).
    pub fn voltage(&self, port: usize) -> f64 {
        match self.node(port) {
            Some(node) => self.guess.voltage(node),
            None => 0.0,
        }
    }

    /// Voltage between two ports of this device.
    pub fn voltage_between(&self, port_pos: usize, port_neg: usize) -> f64 {
        self.voltage(port_pos) - self.voltage(port_neg)
    }

    /// The latest solved branch current for a voltage-source row.
    pub fn branch_current(&self, row: usize) -> f64 {
        self.guess.current(row)
    }

    /// Record that the device clamped its voltage guess this iteration.
    ///
    /// Diagnostic only; damping never fails a step by itself.
    pub fn mark_damped(&mut self) {
        *self.damped += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_id_display() {
        assert_eq!(ComponentId(3).to_string(), "C3");
    }

    #[test]
    fn test_context_port_views() {
        let mut mna = MnaSystem::new(2, 0);
        let mut solution = Solution::new(2, 0);
        solution.load(&nalgebra::DVector::from_vec(vec![0.0, 3.0, 1.0]));

        let ports = [Some(NodeId::new(1)), Some(NodeId::new(2)), None];
        let mut damped = 0;
        let ctx = StampContext::new(&mut mna, &ports, &solution, 0.0, 1e-3, 300.15, &mut damped);

        assert_eq!(ctx.node(0), Some(NodeId::new(1)));
        assert_eq!(ctx.node(2), None);
        assert_eq!(ctx.voltage(0), 3.0);
        assert_eq!(ctx.voltage(2), 0.0, "floating port reads 0 V");
        assert_eq!(ctx.voltage_between(0, 1), 2.0);
    }

    #[test]
    fn test_damped_counter() {
        let mut mna = MnaSystem::new(1, 0);
        let solution = Solution::new(1, 0);
        let ports = [Some(NodeId::new(1))];
        let mut damped = 0;
        {
            let mut ctx =
                StampContext::new(&mut mna, &ports, &solution, 0.0, 1e-3, 300.15, &mut damped);
            ctx.mark_damped();
            ctx.mark_damped();
        }
        assert_eq!(damped, 2);
    }
}
