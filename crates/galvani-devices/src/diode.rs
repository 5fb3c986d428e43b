//! Diode device model using the Shockley equation.

use galvani_core::{Device, DeviceRecord, Error, Result, StampContext};

/// Minimum conductance floor for numerical stability.
pub(crate) const GMIN: f64 = 1e-12;

/// Thermal voltage at a given temperature.
pub fn thermal_voltage(temp_k: f64) -> f64 {
    const K_BOLTZMANN: f64 = 1.380649e-23;
    const Q_ELECTRON: f64 = 1.602176634e-19;
    K_BOLTZMANN * temp_k / Q_ELECTRON
}

/// Diode model parameters.
#[derive(Debug, Clone)]
pub struct DiodeParams {
    /// Saturation current (A). Default: 1e-14.
    pub is: f64,
    /// Emission coefficient. Default: 1.0.
    pub n: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self { is: 1e-14, n: 1.0 }
    }
}

/// A diode. Port 0 is the anode, port 1 the cathode.
///
/// At each Newton iteration the device evaluates the Shockley model at the
/// (damped) voltage guess and stamps the tangent-line companion: a
/// conductance `g = dI/dV` plus an equivalent current source
/// `Ieq = g*V - I`, both as deltas against the previous iteration's stamp.
#[derive(Debug, Clone)]
pub struct Diode {
    /// Device name (e.g. "D1").
    pub name: String,
    /// Model parameters.
    pub params: DiodeParams,
    v_op: f64,
    g_stamped: f64,
    ieq_stamped: f64,
}

impl Diode {
    /// Create a diode with default parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_params(name, DiodeParams::default())
    }

    /// Create a diode with explicit parameters.
    pub fn with_params(name: impl Into<String>, params: DiodeParams) -> Self {
        Self {
            name: name.into(),
            params,
            v_op: 0.0,
            g_stamped: 0.0,
            ieq_stamped: 0.0,
        }
    }

    /// Evaluate diode current and conductance at a junction voltage.
    ///
    /// Returns `(current, conductance)` where:
    /// - `current = Is * (exp(Vd / (n * Vt)) - 1)`
    /// - `conductance = dI/dV = Is / (n * Vt) * exp(Vd / (n * Vt))`
    pub fn evaluate(&self, vd: f64, temp: f64) -> (f64, f64) {
        let (_, id, gd) = self.linearize_at(vd, temp);
        (id, gd)
    }

    /// Overflow-limited evaluation: returns the limited voltage actually
    /// used plus the current and conductance there.
    fn linearize_at(&self, vd: f64, temp: f64) -> (f64, f64, f64) {
        let nvt = self.params.n * thermal_voltage(temp);
        let vd = limit_junction_voltage(vd, nvt, self.params.is);

        let exp_term = (vd / nvt).exp();
        let id = self.params.is * (exp_term - 1.0);
        let gd = (self.params.is * exp_term / nvt).max(GMIN);

        (vd, id, gd)
    }

    /// The current linearization point.
    pub fn operating_voltage(&self) -> f64 {
        self.v_op
    }

    /// Evaluate at `vd`, then stamp the delta against the previous stamp.
    ///
    /// The equivalent source is taken at the same (limited) point as the
    /// conductance, so the tangent line always passes through the model
    /// curve.
    fn restamp(&mut self, ctx: &mut StampContext<'_>, vd: f64) {
        let (vd, id, gd) = self.linearize_at(vd, ctx.temperature);
        let ieq = gd * vd - id;

        ctx.mna
            .stamp_conductance(ctx.node(0), ctx.node(1), gd - self.g_stamped);
        ctx.mna
            .stamp_current_source(ctx.node(0), ctx.node(1), ieq - self.ieq_stamped);
        self.g_stamped = gd;
        self.ieq_stamped = ieq;
        self.v_op = vd;
    }
}

/// Voltage limiting to prevent numerical overflow in `exp()`.
///
/// Above the critical voltage the argument is log-compressed, which still
/// converges but cannot blow up.
pub(crate) fn limit_junction_voltage(vd: f64, nvt: f64, is: f64) -> f64 {
    let vcrit = nvt * (nvt / (std::f64::consts::SQRT_2 * is)).ln();

    if vd > vcrit {
        let arg = (vd - vcrit) / nvt;
        vcrit + nvt * (1.0 + arg.ln_1p())
    } else {
        vd
    }
}

impl Device for Diode {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_ports(&self) -> usize {
        2
    }

    fn sim_prep(&mut self) -> Result<()> {
        if !(self.params.is.is_finite() && self.params.is > 0.0) {
            return Err(Error::invalid_parameter(
                &self.name,
                "non-positive saturation current",
            ));
        }
        if !(self.params.n.is_finite() && self.params.n > 0.0) {
            return Err(Error::invalid_parameter(
                &self.name,
                "non-positive emission coefficient",
            ));
        }
        Ok(())
    }

    fn sim_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        self.v_op = 0.0;
        self.g_stamped = 0.0;
        self.ieq_stamped = 0.0;
        self.restamp(ctx, 0.0);
        Ok(())
    }

    fn step_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        // Re-linearize at the last committed operating point.
        let v_op = self.v_op;
        self.restamp(ctx, v_op);
        Ok(())
    }

    fn step_iter(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        let nvt = self.params.n * thermal_voltage(ctx.temperature);
        let v_raw = ctx.voltage_between(0, 1);

        // Clamp the step to one thermal voltage around the previous guess.
        let clamp = nvt;
        let vd = if (v_raw - self.v_op).abs() > clamp {
            ctx.mark_damped();
            self.v_op + clamp.copysign(v_raw - self.v_op)
        } else {
            v_raw
        };

        self.restamp(ctx, vd);
        Ok(())
    }

    fn step_end(&mut self, ctx: &mut StampContext<'_>) {
        self.v_op = ctx.voltage_between(0, 1);
    }

    fn record(&self) -> DeviceRecord {
        DeviceRecord::new('D', &self.name, vec![self.params.is, self.params.n])
    }
}
