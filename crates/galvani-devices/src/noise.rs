//! Entropy-backed noise current source.
//!
//! Injects a random current drawn from a local entropy source (by default
//! `/dev/urandom`). Reads go through an internal buffer refilled on
//! exhaustion; the file handle is opened in `sim_begin` and released in
//! `sim_end`. Read failures abort the run through the normal error path.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use galvani_core::{Device, DeviceRecord, Error, Result, StampContext};

const BUFFER_SIZE: usize = 256;

/// A noise current source. Port 0 is "+", port 1 is "−"; samples are
/// uniform in `[-amplitude, +amplitude]`.
#[derive(Debug)]
pub struct NoiseSource {
    /// Device name (e.g. "N1").
    pub name: String,
    /// Peak current amplitude (A).
    pub amplitude: f64,
    path: PathBuf,
    file: Option<File>,
    buffer: Vec<u8>,
    filled: usize,
    pos: usize,
    i_stamped: f64,
}

impl NoiseSource {
    /// Create a noise source reading from `/dev/urandom`.
    pub fn new(name: impl Into<String>, amplitude: f64) -> Self {
        Self::with_source(name, amplitude, "/dev/urandom")
    }

    /// Create a noise source reading from an explicit entropy file.
    pub fn with_source(
        name: impl Into<String>,
        amplitude: f64,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            amplitude,
            path: path.into(),
            file: None,
            buffer: vec![0; BUFFER_SIZE],
            filled: 0,
            pos: 0,
            i_stamped: 0.0,
        }
    }

    /// Whether the entropy handle is currently open.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn refill(&mut self) -> Result<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            Error::invalid_parameter(&self.name, "entropy source is not open")
        })?;
        let read = file.read(&mut self.buffer)?;
        if read == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "entropy source exhausted",
            )));
        }
        self.filled = read;
        self.pos = 0;
        Ok(())
    }

    /// Draw one sample in `[-1, 1]`.
    fn next_sample(&mut self) -> Result<f64> {
        if self.pos >= self.filled {
            self.refill()?;
        }
        let byte = self.buffer[self.pos];
        self.pos += 1;
        Ok(f64::from(byte) / 127.5 - 1.0)
    }
}

impl Device for NoiseSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_ports(&self) -> usize {
        2
    }

    fn sim_prep(&mut self) -> Result<()> {
        if !(self.amplitude.is_finite() && self.amplitude >= 0.0) {
            return Err(Error::invalid_parameter(&self.name, "negative amplitude"));
        }
        Ok(())
    }

    fn sim_begin(&mut self, _ctx: &mut StampContext<'_>) -> Result<()> {
        let file = File::open(&self.path)?;
        self.file = Some(file);
        self.filled = 0;
        self.pos = 0;
        self.i_stamped = 0.0;
        log::debug!("{}: entropy source {} open", self.name, self.path.display());
        Ok(())
    }

    fn step_begin(&mut self, ctx: &mut StampContext<'_>) -> Result<()> {
        let i = self.amplitude * self.next_sample()?;
        ctx.mna
            .stamp_current_source(ctx.node(0), ctx.node(1), i - self.i_stamped);
        self.i_stamped = i;
        Ok(())
    }

    fn sim_end(&mut self) {
        self.file = None;
    }

    fn record(&self) -> DeviceRecord {
        DeviceRecord::new('N', &self.name, vec![self.amplitude])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::T_NOMINAL;
    use galvani_core::{MnaSystem, NodeId, Solution};
    use std::io::Write;

    fn entropy_fixture(tag: &str, bytes: &[u8]) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "galvani-noise-{}-{}.bin",
            tag,
            std::process::id()
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_samples_are_bounded_and_stamped_as_deltas() {
        let path = entropy_fixture("bounded", &[0, 255, 128, 64, 200, 10, 90, 250]);
        let mut n = NoiseSource::with_source("N1", 1e-3, &path);

        let mut mna = MnaSystem::new(1, 0);
        let solution = Solution::new(1, 0);
        let ports = [Some(NodeId::new(1)), Some(NodeId::GROUND)];
        let mut damped = 0;

        {
            let mut ctx =
                StampContext::new(&mut mna, &ports, &solution, 0.0, 1e-3, T_NOMINAL, &mut damped);
            n.sim_begin(&mut ctx).unwrap();
            for _ in 0..8 {
                n.step_begin(&mut ctx).unwrap();
                // Delta discipline: the vector always equals the latest
                // sample, never an accumulation.
                assert!(ctx.mna.i_vector()[1].abs() <= 1e-3 + 1e-12);
            }
        }

        assert!(n.is_open());
        n.sim_end();
        assert!(!n.is_open(), "handle released");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_exhausted_source_reports_io_error() {
        let path = entropy_fixture("exhausted", &[1, 2]);
        let mut n = NoiseSource::with_source("N1", 1e-3, &path);

        let mut mna = MnaSystem::new(1, 0);
        let solution = Solution::new(1, 0);
        let ports = [Some(NodeId::new(1)), Some(NodeId::GROUND)];
        let mut damped = 0;
        let mut ctx =
            StampContext::new(&mut mna, &ports, &solution, 0.0, 1e-3, T_NOMINAL, &mut damped);

        n.sim_begin(&mut ctx).unwrap();
        n.step_begin(&mut ctx).unwrap();
        n.step_begin(&mut ctx).unwrap();
        let third = n.step_begin(&mut ctx);
        assert!(matches!(third, Err(Error::Io(_))));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_source_fails_begin() {
        let mut n = NoiseSource::with_source("N1", 1e-3, "/nonexistent/entropy");
        let mut mna = MnaSystem::new(1, 0);
        let solution = Solution::new(1, 0);
        let ports = [Some(NodeId::new(1)), Some(NodeId::GROUND)];
        let mut damped = 0;
        let mut ctx =
            StampContext::new(&mut mna, &ports, &solution, 0.0, 1e-3, T_NOMINAL, &mut damped);

        assert!(matches!(n.sim_begin(&mut ctx), Err(Error::Io(_))));
    }
}
