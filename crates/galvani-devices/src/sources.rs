//! Independent source models: voltage and current sources.

use galvani_core::{Device, DeviceRecord, Error, Result, StampContext};

use crate::waveform::Waveform;

/// An independent voltage source.
///
/// Claims one voltage-source row. The B/C couplings are stamped once at
/// `sim_begin`; the row's source value is reassigned from the waveform at
/// every step boundary. Port 0 is "+", port 1 is "−".
#[derive(Debug, Clone)]
pub struct VoltageSource {
    /// Device name (e.g. "V1").
    pub name: String,
    /// Source waveform.
    pub waveform: Waveform,
    row: usize,
}

impl VoltageSource {
    /// Create a DC voltage source.
    pub fn new(name: impl Into<String>, voltage: f64) -> Self {
        Self::with_waveform(name, Waveform::dc(voltage))
    }

    /// Create a source driven by a waveform.
    pub fn with_waveform(name: impl Into<String>, waveform: Waveform) -> Self {
        Self {
            name: name.into(),
            waveform,
            row: 0,
        }
    }

    /// The source row this device currently owns.
    pub fn row(&self) -> usize {
        self.row
    }
}

impl Device for VoltageSource {
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
        if !self.waveform.is_finite() {
            return Err(Error::invalid_parameter(&self.name, "non-finite waveform"));
        }
        Ok(())
    }

    fn sim_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        ctx.mna
            .stamp_source_coupling(ctx.node(0), ctx.node(1), self.row);
        ctx.mna
            .set_source_value(self.row, self.waveform.value_at(ctx.time));
        Ok(())
    }

    fn step_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        ctx.mna
            .set_source_value(self.row, self.waveform.value_at(ctx.time));
        Ok(())
    }

    fn record(&self) -> DeviceRecord {
        DeviceRecord::new('V', &self.name, self.waveform.fields().to_vec())
    }
}

/// An independent current source.
///
/// A positive value drives current out of port 0 ("+") into the external
/// circuit; the stamp adds the value at port 0's node and subtracts it at
/// port 1's.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    /// Device name (e.g. "I1").
    pub name: String,
    /// Source waveform.
    pub waveform: Waveform,
    i_stamped: f64,
}

impl CurrentSource {
    /// Create a DC current source.
    pub fn new(name: impl Into<String>, current: f64) -> Self {
        Self::with_waveform(name, Waveform::dc(current))
    }

    /// Create a source driven by a waveform.
    pub fn with_waveform(name: impl Into<String>, waveform: Waveform) -> Self {
        Self {
            name: name.into(),
            waveform,
            i_stamped: 0.0,
        }
    }

    fn restamp(&mut self, ctx: &mut StampContext<'_>) {
        let i = self.waveform.value_at(ctx.time);
        ctx.mna
            .stamp_current_source(ctx.node(0), ctx.node(1), i - self.i_stamped);
        self.i_stamped = i;
    }
}

impl Device for CurrentSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_ports(&self) -> usize {
        2
    }

    fn sim_prep(&mut self) -> Result<()> {
        if !self.waveform.is_finite() {
            return Err(Error::invalid_parameter(&self.name, "non-finite waveform"));
        }
        Ok(())
    }

    fn sim_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        self.i_stamped = 0.0;
        self.restamp(ctx);
        Ok(())
    }

    fn step_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        self.restamp(ctx);
        Ok(())
    }

    fn record(&self) -> DeviceRecord {
        DeviceRecord::new('I', &self.name, self.waveform.fields().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::T_NOMINAL;
    use galvani_core::{MnaSystem, NodeId, Solution};

    #[test]
    fn test_voltage_source_stamp() {
        let mut mna = MnaSystem::new(2, 1);
        let solution = Solution::new(2, 1);
        let ports = [Some(NodeId::new(1)), Some(NodeId::GROUND)];
        let mut damped = 0;

        let mut v = VoltageSource::new("V1", 5.0);
        v.source_index_changed(0);
        let mut ctx =
            StampContext::new(&mut mna, &ports, &solution, 0.0, 1e-3, T_NOMINAL, &mut damped);
        v.sim_begin(&mut ctx).unwrap();

        assert_eq!(mna.b_block()[(1, 0)], 1.0);
        assert_eq!(mna.c_block()[(0, 1)], 1.0);
        assert_eq!(mna.e_vector()[0], 5.0);
    }

    #[test]
    fn test_sine_source_tracks_time() {
        let mut mna = MnaSystem::new(1, 1);
        let solution = Solution::new(1, 1);
        let ports = [Some(NodeId::new(1)), Some(NodeId::GROUND)];
        let mut damped = 0;

        let mut v = VoltageSource::with_waveform("V1", Waveform::sin(0.0, 1.0, 1.0));
        v.source_index_changed(0);
        {
            let mut ctx =
                StampContext::new(&mut mna, &ports, &solution, 0.0, 1e-3, T_NOMINAL, &mut damped);
            v.sim_begin(&mut ctx).unwrap();
        }
        assert!(mna.e_vector()[0].abs() < 1e-12);

        let mut ctx =
            StampContext::new(&mut mna, &ports, &solution, 0.25, 1e-3, T_NOMINAL, &mut damped);
        v.step_begin(&mut ctx).unwrap();
        assert!((mna.e_vector()[0] - 1.0).abs() < 1e-9, "peak at t = T/4");
    }

    #[test]
    fn test_current_source_delta_stamp() {
        let mut mna = MnaSystem::new(2, 0);
        let solution = Solution::new(2, 0);
        let ports = [Some(NodeId::new(1)), Some(NodeId::new(2))];
        let mut damped = 0;

        let mut i = CurrentSource::new("I1", 1e-3);
        {
            let mut ctx =
                StampContext::new(&mut mna, &ports, &solution, 0.0, 1e-3, T_NOMINAL, &mut damped);
            i.sim_begin(&mut ctx).unwrap();
            // A second stamp at the same value must not double anything.
            i.step_begin(&mut ctx).unwrap();
        }

        assert!((mna.i_vector()[1] - 1e-3).abs() < 1e-15);
        assert!((mna.i_vector()[2] + 1e-3).abs() < 1e-15);
    }
}
