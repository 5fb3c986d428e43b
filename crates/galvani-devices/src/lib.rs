//! Device model library for Galvani.
//!
//! Every model implements the [`Device`] lifecycle contract from
//! `galvani-core` and follows the incremental stamping discipline: the MNA
//! system is zeroed once per run, and each hook stamps the *delta* between
//! the newly computed companion values and whatever the device stamped
//! last, tracked in explicit `*_stamped` fields.
//!
//! [`Device`]: galvani_core::Device

pub mod bjt;
pub mod digital;
pub mod diode;
pub mod mosfet;
pub mod noise;
pub mod passive;
pub mod sources;
pub mod waveform;

pub use bjt::{Bjt, BjtParams, BjtPolarity};
pub use digital::{GateKind, LogicGate};
pub use diode::{Diode, DiodeParams, thermal_voltage};
pub use mosfet::{Mosfet, MosfetParams, MosfetRegion, MosfetType};
pub use noise::NoiseSource;
pub use passive::{Capacitor, Inductor, Resistor};
pub use sources::{CurrentSource, VoltageSource};
pub use waveform::Waveform;

/// Nominal device temperature (27 °C in kelvin).
pub const T_NOMINAL: f64 = 300.15;
