//! MOSFET level-1 (square-law) device model.

use galvani_core::{Device, DeviceRecord, Error, Result, StampContext};

use crate::diode::GMIN;

/// MOSFET polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MosfetType {
    Nmos,
    Pmos,
}

impl MosfetType {
    /// +1 for NMOS, -1 for PMOS.
    pub fn polarity(self) -> f64 {
        match self {
            MosfetType::Nmos => 1.0,
            MosfetType::Pmos => -1.0,
        }
    }
}

/// Level-1 model parameters.
///
/// `kp` is the effective transconductance parameter beta (A/V^2), i.e.
/// KP * W/L already folded together.
#[derive(Debug, Clone)]
pub struct MosfetParams {
    /// Threshold voltage magnitude (V). Default: 0.7.
    pub vto: f64,
    /// Transconductance parameter (A/V^2). Default: 2e-4.
    pub kp: f64,
    /// Channel-length modulation (1/V). Default: 0.0.
    pub lambda: f64,
}

impl Default for MosfetParams {
    fn default() -> Self {
        Self {
            vto: 0.7,
            kp: 2e-4,
            lambda: 0.0,
        }
    }
}

/// Operating region of the MOSFET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MosfetRegion {
    Cutoff,
    Linear,
    Saturation,
}

/// Maximum per-iteration change allowed on Vgs and Vds (V).
const V_STEP_CLAMP: f64 = 0.5;

/// A MOSFET. Port 0 is the drain, port 1 the gate, port 2 the source.
#[derive(Debug, Clone)]
pub struct Mosfet {
    /// Device name (e.g. "M1").
    pub name: String,
    /// Polarity.
    pub mos_type: MosfetType,
    /// Model parameters.
    pub params: MosfetParams,
    vgs_op: f64,
    vds_op: f64,
    gds_stamped: f64,
    gm_stamped: f64,
    ieq_stamped: f64,
}

impl Mosfet {
    /// Create an NMOS transistor with default parameters.
    pub fn nmos(name: impl Into<String>) -> Self {
        Self::with_params(name, MosfetType::Nmos, MosfetParams::default())
    }

    /// Create a PMOS transistor with default parameters.
    pub fn pmos(name: impl Into<String>) -> Self {
        Self::with_params(name, MosfetType::Pmos, MosfetParams::default())
    }

    /// Create a transistor with explicit parameters.
    pub fn with_params(name: impl Into<String>, mos_type: MosfetType, params: MosfetParams) -> Self {
        Self {
            name: name.into(),
            mos_type,
            params,
            vgs_op: 0.0,
            vds_op: 0.0,
            gds_stamped: 0.0,
            gm_stamped: 0.0,
            ieq_stamped: 0.0,
        }
    }

    /// Evaluate drain current and partial derivatives.
    ///
    /// For NMOS:
    /// - Cutoff:     Vgs <  Vth                  -> Ids = 0
    /// - Linear:     Vgs >= Vth, Vds <  Vgs-Vth  -> Ids = kp*((Vgs-Vth)*Vds - Vds^2/2)*(1+lambda*Vds)
    /// - Saturation: Vgs >= Vth, Vds >= Vgs-Vth  -> Ids = kp/2*(Vgs-Vth)^2*(1+lambda*Vds)
    ///
    /// PMOS is evaluated by reflection: the drain current flips sign while
    /// the conductances stay positive.
    ///
    /// Returns `(ids, gds, gm, region)`.
    pub fn evaluate(&self, vgs: f64, vds: f64) -> (f64, f64, f64, MosfetRegion) {
        let pol = self.mos_type.polarity();
        let (vgs, vds) = (pol * vgs, pol * vds);

        let vth = self.params.vto.abs();
        let beta = self.params.kp;
        let lambda = self.params.lambda;

        let (ids, gds, gm, region) = if vgs < vth {
            (0.0, GMIN, 0.0, MosfetRegion::Cutoff)
        } else if vds < vgs - vth {
            let vov = vgs - vth;
            let ids = beta * (vov * vds - 0.5 * vds * vds) * (1.0 + lambda * vds);
            let gds = beta * (vov - vds) * (1.0 + lambda * vds)
                + beta * (vov * vds - 0.5 * vds * vds) * lambda;
            let gm = beta * vds * (1.0 + lambda * vds);
            (ids, gds.max(GMIN), gm, MosfetRegion::Linear)
        } else {
            let vov = vgs - vth;
            let ids = 0.5 * beta * vov * vov * (1.0 + lambda * vds);
            let gds = (0.5 * beta * vov * vov * lambda).max(GMIN);
            let gm = beta * vov * (1.0 + lambda * vds);
            (ids, gds, gm, MosfetRegion::Saturation)
        };

        (pol * ids, gds, gm, region)
    }

    /// The current linearization point.
    pub fn operating_point(&self) -> (f64, f64) {
        (self.vgs_op, self.vds_op)
    }

    /// Linearize at (vgs, vds) and stamp the delta:
    /// gds between drain/source, gm as a VCCS sensed on drain/source and
    /// controlled by gate/source, and the companion current source
    /// `Ieq = gds*Vds + gm*Vgs - Ids` driven into the drain.
    fn restamp(&mut self, ctx: &mut StampContext<'_>, vgs: f64, vds: f64) {
        let (ids, gds, gm, _region) = self.evaluate(vgs, vds);
        let ieq = gds * vds + gm * vgs - ids;

        let (d, g, s) = (ctx.node(0), ctx.node(1), ctx.node(2));
        ctx.mna.stamp_conductance(d, s, gds - self.gds_stamped);
        ctx.mna
            .stamp_transconductance(d, s, g, s, gm - self.gm_stamped);
        ctx.mna.stamp_current_source(d, s, ieq - self.ieq_stamped);

        self.gds_stamped = gds;
        self.gm_stamped = gm;
        self.ieq_stamped = ieq;
        self.vgs_op = vgs;
        self.vds_op = vds;
    }
}

/// Clamp `new` to within `V_STEP_CLAMP` of `old`; flags whether damping
/// fired.
fn clamp_step(old: f64, new: f64) -> (f64, bool) {
    if (new - old).abs() > V_STEP_CLAMP {
        (old + V_STEP_CLAMP.copysign(new - old), true)
    } else {
        (new, false)
    }
}

impl Device for Mosfet {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_ports(&self) -> usize {
        3
    }

    fn sim_prep(&mut self) -> Result<()> {
        if !(self.params.kp.is_finite() && self.params.kp > 0.0) {
            return Err(Error::invalid_parameter(
                &self.name,
                "non-positive transconductance parameter",
            ));
        }
        if !self.params.vto.is_finite() {
            return Err(Error::invalid_parameter(&self.name, "non-finite threshold"));
        }
        Ok(())
    }

    fn sim_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        self.gds_stamped = 0.0;
        self.gm_stamped = 0.0;
        self.ieq_stamped = 0.0;
        self.restamp(ctx, 0.0, 0.0);
        Ok(())
    }

    fn step_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        let (vgs, vds) = (self.vgs_op, self.vds_op);
        self.restamp(ctx, vgs, vds);
        Ok(())
    }

    fn step_iter(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        let vgs_raw = ctx.voltage_between(1, 2);
        let vds_raw = ctx.voltage_between(0, 2);

        let (vgs, damped_g) = clamp_step(self.vgs_op, vgs_raw);
        let (vds, damped_d) = clamp_step(self.vds_op, vds_raw);
        if damped_g || damped_d {
            ctx.mark_damped();
        }

        self.restamp(ctx, vgs, vds);
        Ok(())
    }

    fn step_end(&mut self, ctx: &mut StampContext<'_>) {
        self.vgs_op = ctx.voltage_between(1, 2);
        self.vds_op = ctx.voltage_between(0, 2);
    }

    fn record(&self) -> DeviceRecord {
        DeviceRecord::new(
            'M',
            &self.name,
            vec![
                self.mos_type.polarity(),
                self.params.vto,
                self.params.kp,
                self.params.lambda,
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nmos_cutoff() {
        let m = Mosfet::nmos("M1");
        let (ids, _gds, gm, region) = m.evaluate(0.3, 1.0);
        assert_eq!(region, MosfetRegion::Cutoff);
        assert_eq!(ids, 0.0);
        assert_eq!(gm, 0.0);
    }

    #[test]
    fn test_nmos_saturation() {
        let m = Mosfet::nmos("M1");
        // Vgs = 2V, Vds = 5V -> Vds > Vgs - Vth = 1.3V -> saturation
        let (ids, _gds, gm, region) = m.evaluate(2.0, 5.0);

        assert_eq!(region, MosfetRegion::Saturation);
        let expected = 0.5 * 2e-4 * 1.3 * 1.3;
        assert!(
            (ids - expected).abs() < 1e-10,
            "Ids = {} (expected {})",
            ids,
            expected
        );
        assert!(gm > 0.0);
    }

    #[test]
    fn test_nmos_linear() {
        let m = Mosfet::nmos("M1");
        // Vgs = 2V, Vds = 0.5V -> linear
        let (ids, gds, gm, region) = m.evaluate(2.0, 0.5);

        assert_eq!(region, MosfetRegion::Linear);
        let expected = 2e-4 * (1.3 * 0.5 - 0.5 * 0.5 * 0.5);
        assert!(
            (ids - expected).abs() < 1e-10,
            "Ids = {} (expected {})",
            ids,
            expected
        );
        assert!(gds > 0.0);
        assert!(gm > 0.0);
    }

    #[test]
    fn test_pmos_reflection() {
        let m = Mosfet::pmos("M1");
        let (ids, gds, gm, region) = m.evaluate(-2.0, -5.0);

        assert_eq!(region, MosfetRegion::Saturation);
        assert!(ids < 0.0, "PMOS drain current flows out: {}", ids);
        assert!(gds > 0.0, "conductances stay positive");
        assert!(gm > 0.0);
    }

    #[test]
    fn test_step_clamp() {
        let (v, damped) = clamp_step(0.0, 3.0);
        assert!(damped);
        assert_eq!(v, V_STEP_CLAMP);

        let (v, damped) = clamp_step(1.0, 0.8);
        assert!(!damped);
        assert_eq!(v, 0.8);
    }
}
