//! Time-varying source waveforms.

use std::f64::consts::PI;

/// A source waveform specification.
#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    /// Constant DC value (time-independent).
    Dc(f64),

    /// Sinusoid: `offset + amplitude * sin(2*pi*frequency*t + phase)`.
    Sin {
        /// DC offset.
        offset: f64,
        /// Amplitude.
        amplitude: f64,
        /// Frequency in Hz.
        frequency: f64,
        /// Phase in radians.
        phase: f64,
    },
}

impl Waveform {
    /// Create a DC waveform.
    pub fn dc(value: f64) -> Self {
        Waveform::Dc(value)
    }

    /// Create an undelayed sinusoid.
    pub fn sin(offset: f64, amplitude: f64, frequency: f64) -> Self {
        Waveform::Sin {
            offset,
            amplitude,
            frequency,
            phase: 0.0,
        }
    }

    /// Create a sinusoid with an explicit phase.
    pub fn sin_full(offset: f64, amplitude: f64, frequency: f64, phase: f64) -> Self {
        Waveform::Sin {
            offset,
            amplitude,
            frequency,
            phase,
        }
    }

    /// Build from the persisted field order (dc, amplitude, frequency,
    /// phase); a zero amplitude collapses to DC.
    pub fn from_fields(dc: f64, amplitude: f64, frequency: f64, phase: f64) -> Self {
        if amplitude == 0.0 {
            Waveform::Dc(dc)
        } else {
            Waveform::Sin {
                offset: dc,
                amplitude,
                frequency,
                phase,
            }
        }
    }

    /// The persisted field order: dc, amplitude, frequency, phase.
    pub fn fields(&self) -> [f64; 4] {
        match *self {
            Waveform::Dc(v) => [v, 0.0, 0.0, 0.0],
            Waveform::Sin {
                offset,
                amplitude,
                frequency,
                phase,
            } => [offset, amplitude, frequency, phase],
        }
    }

    /// Evaluate the waveform at a given time.
    pub fn value_at(&self, time: f64) -> f64 {
        match *self {
            Waveform::Dc(v) => v,
            Waveform::Sin {
                offset,
                amplitude,
                frequency,
                phase,
            } => offset + amplitude * (2.0 * PI * frequency * time + phase).sin(),
        }
    }

    /// Whether every parameter is finite.
    pub fn is_finite(&self) -> bool {
        self.fields().iter().all(|v| v.is_finite())
    }
}
