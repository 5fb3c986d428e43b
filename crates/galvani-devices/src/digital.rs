//! Digital gate macromodels.
//!
//! A gate senses its input node against a threshold at each step boundary
//! and drives its output rail-to-rail through a claimed source row, giving
//! a one-step propagation delay. The analog side only sees a light input
//! load and an ideal output driver.

use galvani_core::{Device, DeviceRecord, Error, NodeId, Result, StampContext};

/// Input loading conductance (1 uS = 1 MOhm to ground).
const G_INPUT: f64 = 1e-6;

/// Gate transfer function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    Buffer,
    Inverter,
}

impl GateKind {
    /// The persisted numeric encoding (0 = buffer, 1 = inverter).
    pub fn to_field(self) -> f64 {
        match self {
            GateKind::Buffer => 0.0,
            GateKind::Inverter => 1.0,
        }
    }

    /// Decode the persisted numeric encoding.
    pub fn from_field(value: f64) -> Self {
        if value == 0.0 {
            GateKind::Buffer
        } else {
            GateKind::Inverter
        }
    }
}

/// A single-input logic gate macromodel. Port 0 is the input, port 1 the
/// output.
#[derive(Debug, Clone)]
pub struct LogicGate {
    /// Device name (e.g. "U1").
    pub name: String,
    /// Transfer function.
    pub kind: GateKind,
    /// Input switching threshold (V).
    pub threshold: f64,
    /// Output high level (V).
    pub v_high: f64,
    /// Output low level (V).
    pub v_low: f64,
    row: usize,
    level: f64,
}

impl LogicGate {
    /// Create an inverter with 5 V rails and a 2.5 V threshold.
    pub fn inverter(name: impl Into<String>) -> Self {
        Self::with_params(name, GateKind::Inverter, 2.5, 5.0, 0.0)
    }

    /// Create a buffer with 5 V rails and a 2.5 V threshold.
    pub fn buffer(name: impl Into<String>) -> Self {
        Self::with_params(name, GateKind::Buffer, 2.5, 5.0, 0.0)
    }

    /// Create a gate with explicit levels.
    pub fn with_params(
        name: impl Into<String>,
        kind: GateKind,
        threshold: f64,
        v_high: f64,
        v_low: f64,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            threshold,
            v_high,
            v_low,
            row: 0,
            level: v_low,
        }
    }

    /// The output level for a given input voltage.
    pub fn output_for(&self, v_in: f64) -> f64 {
        let input_high = v_in > self.threshold;
        let output_high = match self.kind {
            GateKind::Buffer => input_high,
            GateKind::Inverter => !input_high,
        };
        if output_high {
            self.v_high
        } else {
            self.v_low
        }
    }

    /// The output level currently driven.
    pub fn level(&self) -> f64 {
        self.level
    }
}

impl Device for LogicGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_ports(&self) -> usize {
        2
    }

    fn num_sources(&self) -> usize {
        1
    }

    fn source_index_changed(&mut self, row: usize) {
        self.row = row;
    }

    fn sim_prep(&mut self) -> Result<()> {
        if !(self.threshold.is_finite() && self.v_high.is_finite() && self.v_low.is_finite()) {
            return Err(Error::invalid_parameter(&self.name, "non-finite level"));
        }
        if self.v_high < self.v_low {
            return Err(Error::invalid_parameter(
                &self.name,
                "high level below low level",
            ));
        }
        Ok(())
    }

    fn sim_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        // Light resistive load so an undriven input is not floating.
        ctx.mna
            .stamp_conductance(ctx.node(0), Some(NodeId::GROUND), G_INPUT);

        // The output drives against ground through the claimed row.
        ctx.mna
            .stamp_source_coupling(ctx.node(1), Some(NodeId::GROUND), self.row);
        self.level = self.output_for(0.0);
        ctx.mna.set_source_value(self.row, self.level);
        Ok(())
    }

    fn step_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        // Sense the input as of the last converged step.
        self.level = self.output_for(ctx.voltage(0));
        ctx.mna.set_source_value(self.row, self.level);
        Ok(())
    }

    fn record(&self) -> DeviceRecord {
        DeviceRecord::new(
            'U',
            &self.name,
            vec![
                self.kind.to_field(),
                self.threshold,
                self.v_high,
                self.v_low,
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::T_NOMINAL;
    use galvani_core::{MnaSystem, Solution};

    #[test]
    fn test_transfer_functions() {
        let inv = LogicGate::inverter("U1");
        assert_eq!(inv.output_for(0.0), 5.0);
        assert_eq!(inv.output_for(4.0), 0.0);

        let buf = LogicGate::buffer("U2");
        assert_eq!(buf.output_for(0.0), 0.0);
        assert_eq!(buf.output_for(4.0), 5.0);
    }

    #[test]
    fn test_kind_field_round_trip() {
        assert_eq!(GateKind::from_field(GateKind::Inverter.to_field()), GateKind::Inverter);
        assert_eq!(GateKind::from_field(GateKind::Buffer.to_field()), GateKind::Buffer);
    }

    #[test]
    fn test_gate_drives_output_row() {
        let mut mna = MnaSystem::new(2, 1);
        let solution = Solution::new(2, 1);
        let ports = [Some(NodeId::new(1)), Some(NodeId::new(2))];
        let mut damped = 0;

        let mut gate = LogicGate::inverter("U1");
        gate.source_index_changed(0);
        {
            let mut ctx =
                StampContext::new(&mut mna, &ports, &solution, 0.0, 1e-3, T_NOMINAL, &mut damped);
            gate.sim_begin(&mut ctx).unwrap();
        }

        // Input reads 0 V, so the inverter drives high.
        assert_eq!(mna.e_vector()[0], 5.0);
        assert_eq!(mna.b_block()[(2, 0)], 1.0);
        assert!((mna.g_block()[(1, 1)] - 1e-6).abs() < 1e-18);

        // A high input flips the output at the next step boundary.
        let mut guess = Solution::new(2, 1);
        guess.load(&nalgebra::DVector::from_vec(vec![0.0, 4.0, 5.0, 0.0]));
        let mut ctx =
            StampContext::new(&mut mna, &ports, &guess, 1e-3, 1e-3, T_NOMINAL, &mut damped);
        gate.step_begin(&mut ctx).unwrap();
        assert_eq!(gate.level(), 0.0);
        assert_eq!(mna.e_vector()[0], 0.0);
    }
}
