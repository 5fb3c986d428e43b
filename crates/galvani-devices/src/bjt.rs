//! Bipolar junction transistor model (Ebers-Moll).

use galvani_core::{Device, DeviceRecord, Error, Result, StampContext};

use crate::diode::{limit_junction_voltage, thermal_voltage, GMIN};

/// BJT polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BjtPolarity {
    Npn,
    Pnp,
}

impl BjtPolarity {
    /// +1 for NPN, -1 for PNP.
    pub fn sign(self) -> f64 {
        match self {
            BjtPolarity::Npn => 1.0,
            BjtPolarity::Pnp => -1.0,
        }
    }
}

/// Ebers-Moll model parameters.
#[derive(Debug, Clone)]
pub struct BjtParams {
    /// Saturation current (A). Default: 1e-14.
    pub is: f64,
    /// Forward current gain. Default: 100.
    pub bf: f64,
    /// Reverse current gain. Default: 1.
    pub br: f64,
}

impl Default for BjtParams {
    fn default() -> Self {
        Self {
            is: 1e-14,
            bf: 100.0,
            br: 1.0,
        }
    }
}

/// The small-signal linearization of the transistor at one operating
/// point: two junction conductances, two transport transconductances, and
/// the branch currents they were derived from.
#[derive(Debug, Clone, Copy, Default)]
struct BjtLinearization {
    gpi: f64,
    gmu: f64,
    gmf: f64,
    gmr: f64,
    ieq_be: f64,
    ieq_bc: f64,
    ieq_ct: f64,
}

/// A BJT. Port 0 is the collector, port 1 the base, port 2 the emitter.
#[derive(Debug, Clone)]
pub struct Bjt {
    /// Device name (e.g. "Q1").
    pub name: String,
    /// Polarity.
    pub polarity: BjtPolarity,
    /// Model parameters.
    pub params: BjtParams,
    vbe_op: f64,
    vbc_op: f64,
    stamped: BjtLinearization,
}

impl Bjt {
    /// Create an NPN transistor with default parameters.
    pub fn npn(name: impl Into<String>) -> Self {
        Self::with_params(name, BjtPolarity::Npn, BjtParams::default())
    }

    /// Create a PNP transistor with default parameters.
    pub fn pnp(name: impl Into<String>) -> Self {
        Self::with_params(name, BjtPolarity::Pnp, BjtParams::default())
    }

    /// Create a transistor with explicit parameters.
    pub fn with_params(name: impl Into<String>, polarity: BjtPolarity, params: BjtParams) -> Self {
        Self {
            name: name.into(),
            polarity,
            params,
            vbe_op: 0.0,
            vbc_op: 0.0,
            stamped: BjtLinearization::default(),
        }
    }

    /// Collector current at the given junction voltages.
    pub fn collector_current(&self, vbe: f64, vbc: f64, temp: f64) -> f64 {
        let pol = self.polarity.sign();
        let vt = thermal_voltage(temp);
        let fe = self.junction_exp(pol * vbe, vt);
        let fc = self.junction_exp(pol * vbc, vt);
        let ict = self.params.is * (fe - fc);
        let ibc = self.params.is / self.params.br * (fc - 1.0);
        pol * (ict - ibc)
    }

    fn junction_exp(&self, v: f64, vt: f64) -> f64 {
        (limit_junction_voltage(v, vt, self.params.is) / vt).exp()
    }

    fn linearize(&self, vbe: f64, vbc: f64, temp: f64) -> BjtLinearization {
        let pol = self.polarity.sign();
        let vt = thermal_voltage(temp);
        let is = self.params.is;

        // Linearize at the overflow-limited junction voltages so the
        // equivalent sources sit on the model curve.
        let vbe_p = limit_junction_voltage(pol * vbe, vt, is);
        let vbc_p = limit_junction_voltage(pol * vbc, vt, is);

        let fe = (vbe_p / vt).exp();
        let fc = (vbc_p / vt).exp();

        let ibe = is / self.params.bf * (fe - 1.0);
        let ibc = is / self.params.br * (fc - 1.0);
        let ict = is * (fe - fc);

        let gpi = (is / self.params.bf * fe / vt).max(GMIN);
        let gmu = (is / self.params.br * fc / vt).max(GMIN);
        let gmf = is * fe / vt;
        let gmr = is * fc / vt;

        // Equivalent sources make the linear model reproduce the
        // large-signal branch currents at the operating point.
        BjtLinearization {
            gpi,
            gmu,
            gmf,
            gmr,
            ieq_be: pol * (gpi * vbe_p - ibe),
            ieq_bc: pol * (gmu * vbc_p - ibc),
            ieq_ct: pol * (gmf * vbe_p - gmr * vbc_p - ict),
        }
    }

    fn restamp(&mut self, ctx: &mut StampContext<'_>, vbe: f64, vbc: f64) {
        let new = self.linearize(vbe, vbc, ctx.temperature);
        let (c, b, e) = (ctx.node(0), ctx.node(1), ctx.node(2));

        ctx.mna.stamp_conductance(b, e, new.gpi - self.stamped.gpi);
        ctx.mna.stamp_conductance(b, c, new.gmu - self.stamped.gmu);
        ctx.mna
            .stamp_transconductance(c, e, b, e, new.gmf - self.stamped.gmf);
        ctx.mna
            .stamp_transconductance(c, e, b, c, -(new.gmr - self.stamped.gmr));
        ctx.mna
            .stamp_current_source(b, e, new.ieq_be - self.stamped.ieq_be);
        ctx.mna
            .stamp_current_source(b, c, new.ieq_bc - self.stamped.ieq_bc);
        ctx.mna
            .stamp_current_source(c, e, new.ieq_ct - self.stamped.ieq_ct);

        self.stamped = new;
        self.vbe_op = vbe;
        self.vbc_op = vbc;
    }
}

/// Clamp a junction-voltage step to one thermal voltage.
fn clamp_junction_step(old: f64, new: f64, vt: f64) -> (f64, bool) {
    if (new - old).abs() > vt {
        (old + vt.copysign(new - old), true)
    } else {
        (new, false)
    }
}

impl Device for Bjt {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_ports(&self) -> usize {
        3
    }

    fn sim_prep(&mut self) -> Result<()> {
        if !(self.params.is.is_finite() && self.params.is > 0.0) {
            return Err(Error::invalid_parameter(
                &self.name,
                "non-positive saturation current",
            ));
        }
        if !(self.params.bf.is_finite() && self.params.bf > 0.0)
            || !(self.params.br.is_finite() && self.params.br > 0.0)
        {
            return Err(Error::invalid_parameter(
                &self.name,
                "non-positive current gain",
            ));
        }
        Ok(())
    }

    fn sim_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        self.stamped = BjtLinearization::default();
        self.restamp(ctx, 0.0, 0.0);
        Ok(())
    }

    fn step_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        let (vbe, vbc) = (self.vbe_op, self.vbc_op);
        self.restamp(ctx, vbe, vbc);
        Ok(())
    }

    fn step_iter(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        let vt = thermal_voltage(ctx.temperature);
        let vbe_raw = ctx.voltage_between(1, 2);
        let vbc_raw = ctx.voltage_between(1, 0);

        let (vbe, damped_e) = clamp_junction_step(self.vbe_op, vbe_raw, vt);
        let (vbc, damped_c) = clamp_junction_step(self.vbc_op, vbc_raw, vt);
        if damped_e || damped_c {
            ctx.mark_damped();
        }

        self.restamp(ctx, vbe, vbc);
        Ok(())
    }

    fn step_end(&mut self, ctx: &mut StampContext<'_>) {
        self.vbe_op = ctx.voltage_between(1, 2);
        self.vbc_op = ctx.voltage_between(1, 0);
    }

    fn record(&self) -> DeviceRecord {
        DeviceRecord::new(
            'Q',
            &self.name,
            vec![self.polarity.sign(), self.params.is, self.params.bf],
        )
    }
}
