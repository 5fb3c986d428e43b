//! Passive device models: Resistor, Capacitor, Inductor.

use galvani_core::{Device, DeviceRecord, Error, NodeId, Result, StampContext};

use crate::T_NOMINAL;

/// A resistor.
///
/// Persisted field order: resistance, tolerance, power rating, tc1, tc2.
/// The temperature coefficients scale the effective resistance at the
/// engine temperature with the usual quadratic model.
#[derive(Debug, Clone)]
pub struct Resistor {
    /// Device name (e.g. "R1").
    pub name: String,
    /// Nominal resistance in ohms.
    pub resistance: f64,
    /// Tolerance in percent.
    pub tolerance: f64,
    /// Power rating in watts.
    pub power_rating: f64,
    /// Linear temperature coefficient (1/K).
    pub tc1: f64,
    /// Quadratic temperature coefficient (1/K^2).
    pub tc2: f64,
    g_stamped: f64,
}

impl Resistor {
    /// Create a resistor with nominal parameters.
    pub fn new(name: impl Into<String>, resistance: f64) -> Self {
        Self::with_params(name, resistance, 0.0, 0.25, 0.0, 0.0)
    }

    /// Create a resistor with the full persisted parameter set.
    pub fn with_params(
        name: impl Into<String>,
        resistance: f64,
        tolerance: f64,
        power_rating: f64,
        tc1: f64,
        tc2: f64,
    ) -> Self {
        Self {
            name: name.into(),
            resistance,
            tolerance,
            power_rating,
            tc1,
            tc2,
            g_stamped: 0.0,
        }
    }

    /// Effective resistance at the given temperature (K).
    pub fn resistance_at(&self, temp: f64) -> f64 {
        let dt = temp - T_NOMINAL;
        self.resistance * (1.0 + self.tc1 * dt + self.tc2 * dt * dt)
    }

    /// Effective conductance at the given temperature (K).
    pub fn conductance_at(&self, temp: f64) -> f64 {
        1.0 / self.resistance_at(temp)
    }
}

impl Device for Resistor {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_ports(&self) -> usize {
        2
    }

    fn sim_prep(&mut self) -> Result<()> {
        if self.resistance == 0.0 {
            return Err(Error::invalid_parameter(&self.name, "null resistance"));
        }
        if !self.resistance.is_finite() {
            return Err(Error::invalid_parameter(&self.name, "non-finite resistance"));
        }
        Ok(())
    }

    fn sim_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        let (a, b) = (ctx.node(0), ctx.node(1));
        if a == Some(NodeId::GROUND) && b == Some(NodeId::GROUND) {
            return Err(Error::invalid_parameter(
                &self.name,
                "both terminals tied to ground",
            ));
        }
        self.g_stamped = 0.0;
        let g = self.conductance_at(ctx.temperature);
        ctx.mna.stamp_conductance(a, b, g - self.g_stamped);
        self.g_stamped = g;
        Ok(())
    }

    fn record(&self) -> DeviceRecord {
        DeviceRecord::new(
            'R',
            &self.name,
            vec![
                self.resistance,
                self.tolerance,
                self.power_rating,
                self.tc1,
                self.tc2,
            ],
        )
    }
}

/// A capacitor, discretized with the backward-Euler companion model:
/// `Geq = C/dt` in parallel with `Ieq = Geq * v_prev`.
#[derive(Debug, Clone)]
pub struct Capacitor {
    /// Device name (e.g. "C1").
    pub name: String,
    /// Capacitance in farads.
    pub capacitance: f64,
    v_prev: f64,
    geq_stamped: f64,
    ieq_stamped: f64,
}

impl Capacitor {
    /// Create a capacitor.
    pub fn new(name: impl Into<String>, capacitance: f64) -> Self {
        Self {
            name: name.into(),
            capacitance,
            v_prev: 0.0,
            geq_stamped: 0.0,
            ieq_stamped: 0.0,
        }
    }

    /// The committed voltage from the last converged step.
    pub fn previous_voltage(&self) -> f64 {
        self.v_prev
    }
}

impl Device for Capacitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_ports(&self) -> usize {
        2
    }

    fn sim_prep(&mut self) -> Result<()> {
        if !(self.capacitance.is_finite() && self.capacitance > 0.0) {
            return Err(Error::invalid_parameter(
                &self.name,
                "non-positive capacitance",
            ));
        }
        Ok(())
    }

    fn sim_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        self.v_prev = 0.0;
        self.geq_stamped = 0.0;
        self.ieq_stamped = 0.0;

        let geq = self.capacitance / ctx.dt;
        ctx.mna
            .stamp_conductance(ctx.node(0), ctx.node(1), geq - self.geq_stamped);
        self.geq_stamped = geq;
        Ok(())
    }

    fn step_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        let ieq = self.geq_stamped * self.v_prev;
        ctx.mna
            .stamp_current_source(ctx.node(0), ctx.node(1), ieq - self.ieq_stamped);
        self.ieq_stamped = ieq;
        Ok(())
    }

    fn step_end(&mut self, ctx: &mut StampContext<'_>) {
        self.v_prev = ctx.voltage_between(0, 1);
    }

    fn record(&self) -> DeviceRecord {
        DeviceRecord::new('C', &self.name, vec![self.capacitance])
    }
}

/// An inductor.
///
/// Claims one source row for its branch current; the backward-Euler
/// companion writes `D[row][row] -= L/dt` and `e[row] = -(L/dt) * i_prev`,
/// which discretizes `v = L di/dt`.
#[derive(Debug, Clone)]
pub struct Inductor {
    /// Device name (e.g. "L1").
    pub name: String,
    /// Inductance in henries.
    pub inductance: f64,
    row: usize,
    i_prev: f64,
}

impl Inductor {
    /// Create an inductor.
    pub fn new(name: impl Into<String>, inductance: f64) -> Self {
        Self {
            name: name.into(),
            inductance,
            row: 0,
            i_prev: 0.0,
        }
    }

    /// The committed branch current from the last converged step.
    pub fn previous_current(&self) -> f64 {
        self.i_prev
    }
}

impl Device for Inductor {
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
        if !(self.inductance.is_finite() && self.inductance > 0.0) {
            return Err(Error::invalid_parameter(
                &self.name,
                "non-positive inductance",
            ));
        }
        Ok(())
    }

    fn sim_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        self.i_prev = 0.0;
        ctx.mna
            .stamp_source_coupling(ctx.node(0), ctx.node(1), self.row);
        ctx.mna
            .stamp_series_resistance(self.row, self.inductance / ctx.dt);
        ctx.mna.set_source_value(self.row, 0.0);
        Ok(())
    }

    fn step_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        let req = self.inductance / ctx.dt;
        ctx.mna.set_source_value(self.row, -req * self.i_prev);
        Ok(())
    }

    fn step_end(&mut self, ctx: &mut StampContext<'_>) {
        self.i_prev = ctx.branch_current(self.row);
    }

    fn record(&self) -> DeviceRecord {
        DeviceRecord::new('L', &self.name, vec![self.inductance])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galvani_core::{MnaSystem, Solution};

    fn ctx_parts(n: usize, m: usize) -> (MnaSystem, Solution, u32) {
        (MnaSystem::new(n, m), Solution::new(n, m), 0)
    }

    #[test]
    fn test_resistor_stamp() {
        let (mut mna, solution, mut damped) = ctx_parts(2, 0);
        let ports = [Some(NodeId::new(1)), Some(NodeId::new(2))];
        let mut r = Resistor::new("R1", 1000.0);

        let mut ctx = StampContext::new(&mut mna, &ports, &solution, 0.0, 1e-3, T_NOMINAL, &mut damped);
        r.sim_begin(&mut ctx).unwrap();

        let g = 1e-3;
        assert!((mna.g_block()[(1, 1)] - g).abs() < 1e-12);
        assert!((mna.g_block()[(2, 2)] - g).abs() < 1e-12);
        assert!((mna.g_block()[(1, 2)] + g).abs() < 1e-12);
        assert!((mna.g_block()[(2, 1)] + g).abs() < 1e-12);
    }

    #[test]
    fn test_resistor_rejects_null_resistance() {
        let mut r = Resistor::new("R1", 0.0);
        assert!(matches!(
            r.sim_prep(),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_resistor_rejects_ground_to_ground() {
        let (mut mna, solution, mut damped) = ctx_parts(1, 0);
        let ports = [Some(NodeId::GROUND), Some(NodeId::GROUND)];
        let mut r = Resistor::new("R1", 100.0);

        let mut ctx = StampContext::new(&mut mna, &ports, &solution, 0.0, 1e-3, T_NOMINAL, &mut damped);
        assert!(matches!(
            r.sim_begin(&mut ctx),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_resistor_temperature_model() {
        let r = Resistor::with_params("R1", 1000.0, 1.0, 0.25, 1e-3, 1e-6);
        // +50 K: R = 1000 * (1 + 0.05 + 0.0025) = 1052.5
        let r_hot = r.resistance_at(T_NOMINAL + 50.0);
        assert!((r_hot - 1052.5).abs() < 1e-9);
        assert!((r.resistance_at(T_NOMINAL) - 1000.0).abs() < 1e-12);
    }

    #[test]
    fn test_capacitor_companion_delta() {
        let (mut mna, solution, mut damped) = ctx_parts(1, 0);
        let ports = [Some(NodeId::new(1)), Some(NodeId::GROUND)];
        let mut c = Capacitor::new("C1", 1e-6);
        let dt = 1e-3;

        {
            let mut ctx =
                StampContext::new(&mut mna, &ports, &solution, 0.0, dt, T_NOMINAL, &mut damped);
            c.sim_begin(&mut ctx).unwrap();
            c.step_begin(&mut ctx).unwrap();
        }

        let geq = 1e-6 / dt;
        assert!((mna.g_block()[(1, 1)] - geq).abs() < 1e-12);
        assert_eq!(mna.i_vector()[1], 0.0, "no history yet");

        // Commit a 2 V history and restamp: only the delta lands.
        let mut guess = Solution::new(1, 0);
        guess.load(&nalgebra_vec(&[0.0, 2.0]));
        {
            let mut ctx =
                StampContext::new(&mut mna, &ports, &guess, dt, dt, T_NOMINAL, &mut damped);
            c.step_end(&mut ctx);
            c.step_begin(&mut ctx).unwrap();
            c.step_begin(&mut ctx).unwrap(); // idempotent: delta is zero
        }
        assert!((mna.i_vector()[1] - geq * 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_inductor_companion() {
        let (mut mna, solution, mut damped) = ctx_parts(2, 1);
        let ports = [Some(NodeId::new(1)), Some(NodeId::new(2))];
        let mut l = Inductor::new("L1", 1e-3);
        l.source_index_changed(0);
        let dt = 1e-6;

        let mut ctx =
            StampContext::new(&mut mna, &ports, &solution, 0.0, dt, T_NOMINAL, &mut damped);
        l.sim_begin(&mut ctx).unwrap();

        assert_eq!(mna.b_block()[(1, 0)], 1.0);
        assert_eq!(mna.b_block()[(2, 0)], -1.0);
        assert!((mna.d_block()[(0, 0)] + 1e-3 / dt).abs() < 1e-9);
        assert_eq!(mna.e_vector()[0], 0.0);
    }

    fn nalgebra_vec(values: &[f64]) -> nalgebra::DVector<f64> {
        nalgebra::DVector::from_vec(values.to_vec())
    }
}
