//! The simulation engine: a cooperative, single-threaded time-step state
//! machine.
//!
//! A run moves through `Idle -> Starting -> (StepBegin -> Iterating ->
//! Converged)* -> Idle | Halted`:
//!
//! - **Starting** ([`Engine::start`]): size and zero the MNA system, stamp
//!   the ground datum, run `sim_prep` and `sim_begin` on every component,
//!   solve once.
//! - **StepBegin** ([`Engine::step`]): advance simulated time, run
//!   `step_begin` (companion models recomputed from the last converged
//!   state), solve once to seed the guess.
//! - **Iterating**: run `step_iter` and solve repeatedly until the largest
//!   componentwise change between consecutive solves drops under the
//!   tolerance, or the iteration cap makes the step a fatal convergence
//!   failure.
//! - **Converged**: run `step_end` (history commit), update the iteration
//!   watermarks, publish the solution.
//!
//! Continuous mode ([`Engine::poll`]) paces steps against wall-clock time;
//! batch mode ([`Engine::run_until`]) advances purely by accumulated `dt`.
//! Structural topology edits must be bracketed with [`Engine::suspend`] /
//! [`Engine::resume`] — a re-entrant counter, not a lock; everything here
//! runs on one thread.

use std::time::{Duration, Instant};

use nalgebra::DVector;

use galvani_core::{Circuit, Device, MnaSystem, NodeId, SimEvent, Solution, StampContext};

use crate::error::{Error, Result};
use crate::linear::solve_dense;

/// Upper bound on steps recovered per poll, so a stall cannot spiral.
const MAX_POLL_STEPS: usize = 1000;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time-step length (s).
    pub dt: f64,
    /// Convergence tolerance on the solution vector.
    pub tolerance: f64,
    /// Inner-iteration cap per step.
    pub max_iterations: usize,
    /// Device temperature (K).
    pub temperature: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dt: 1e-3,
            tolerance: 1e-3,
            max_iterations: 10_000,
            temperature: 300.15,
        }
    }
}

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Halted,
}

/// Minimum and maximum inner-iteration counts seen across the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Watermarks {
    low: Option<usize>,
    high: Option<usize>,
}

impl Watermarks {
    fn record(&mut self, iterations: usize) {
        self.low = Some(self.low.map_or(iterations, |l| l.min(iterations)));
        self.high = Some(self.high.map_or(iterations, |h| h.max(iterations)));
    }

    /// Fewest iterations any converged step needed.
    pub fn low(&self) -> Option<usize> {
        self.low
    }

    /// Most iterations any converged step needed.
    pub fn high(&self) -> Option<usize> {
        self.high
    }
}

/// The simulation engine.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    mna: MnaSystem,
    x: DVector<f64>,
    x_prev: DVector<f64>,
    /// Latest successful solve; feeds the device hooks.
    guess: Solution,
    /// Published results; only updated at start and step convergence.
    published: Solution,
    state: EngineState,
    time: f64,
    steps: u64,
    suspend_depth: u32,
    watermarks: Watermarks,
    damped: u32,
    last_poll: Option<Instant>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// Create an engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            mna: MnaSystem::new(0, 0),
            x: DVector::zeros(1),
            x_prev: DVector::zeros(1),
            guess: Solution::new(0, 0),
            published: Solution::new(0, 0),
            state: EngineState::Idle,
            time: 0.0,
            steps: 0,
            suspend_depth: 0,
            watermarks: Watermarks::default(),
            damped: 0,
            last_poll: None,
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Simulated time (s).
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of converged steps this run.
    pub fn step_count(&self) -> u64 {
        self.steps
    }

    /// Iteration watermarks for this run.
    pub fn watermarks(&self) -> Watermarks {
        self.watermarks
    }

    /// Damping events counted during the most recent step.
    pub fn last_step_damped(&self) -> u32 {
        self.damped
    }

    /// Published voltage at a node (0 V for ground).
    pub fn voltage(&self, node: NodeId) -> f64 {
        self.published.voltage(node)
    }

    /// Published branch current for a voltage-source row.
    pub fn branch_current(&self, row: usize) -> f64 {
        self.published.current(row)
    }

    /// The full published solution.
    pub fn solution(&self) -> &Solution {
        &self.published
    }

    // ---- suspension ---------------------------------------------------

    /// Suspend stepping (re-entrant). The host wraps structural circuit
    /// edits with suspend/resume.
    pub fn suspend(&mut self) {
        self.suspend_depth += 1;
    }

    /// Undo one suspend. Wall-clock pacing restarts fresh so a long edit
    /// does not cause a catch-up burst.
    pub fn resume(&mut self) {
        self.suspend_depth = self.suspend_depth.saturating_sub(1);
        if self.suspend_depth == 0 {
            self.last_poll = None;
        }
    }

    /// Whether stepping is currently suspended.
    pub fn is_suspended(&self) -> bool {
        self.suspend_depth > 0
    }

    // ---- lifecycle ----------------------------------------------------

    /// Start a run: resize and zero the system, stamp the ground datum,
    /// validate and first-stamp every device, and solve the initial
    /// operating point.
    ///
    /// On failure the engine is left `Halted` and every device's
    /// `sim_end` has run.
    pub fn start(&mut self, circuit: &mut Circuit) -> Result<()> {
        if self.state == EngineState::Running {
            self.finish(circuit, EngineState::Idle);
        }

        let n = circuit.node_count();
        let m = circuit.source_count();

        self.mna.resize(n, m);
        self.mna.stamp_ground_datum();
        self.x = DVector::zeros(n + 1 + m);
        self.x_prev = DVector::zeros(n + 1 + m);
        self.guess = Solution::new(n, m);
        self.published = Solution::new(n, m);
        self.time = 0.0;
        self.steps = 0;
        self.watermarks = Watermarks::default();
        self.damped = 0;
        self.last_poll = None;

        circuit.emit(SimEvent::SimBegin);

        let begun = self.begin_devices(circuit);
        match begun {
            Ok(()) => {
                self.published = self.guess.clone();
                self.state = EngineState::Running;
                log::debug!("engine started: {} nodes, {} source rows", n, m);
                Ok(())
            }
            Err(e) => {
                log::warn!("engine start failed: {}", e);
                self.finish(circuit, EngineState::Halted);
                Err(e)
            }
        }
    }

    fn begin_devices(&mut self, circuit: &mut Circuit) -> Result<()> {
        for entry in circuit.entries_mut() {
            entry.device_mut().sim_prep()?;
        }
        self.device_pass(circuit, |device, ctx| device.sim_begin(ctx))?;
        self.solve_system()
    }

    /// Compute one time step: advance time, reseed companion models,
    /// iterate to convergence, commit history.
    ///
    /// A no-op while suspended. Solver or device failure halts the run.
    pub fn step(&mut self, circuit: &mut Circuit) -> Result<()> {
        if self.state != EngineState::Running {
            return Err(Error::NotRunning);
        }
        if self.suspend_depth > 0 {
            return Ok(());
        }

        self.time += self.config.dt;
        self.steps += 1;
        self.damped = 0;
        circuit.emit(SimEvent::StepBegin { time: self.time });

        match self.advance(circuit) {
            Ok(iterations) => {
                self.watermarks.record(iterations);
                self.published = self.guess.clone();
                // Commit converged state into each device's history.
                self.device_pass(circuit, |device, ctx| {
                    device.step_end(ctx);
                    Ok(())
                })?;
                if self.damped > 0 {
                    log::debug!(
                        "step {} converged in {} iterations ({} damped)",
                        self.steps,
                        iterations,
                        self.damped
                    );
                }
                circuit.emit(SimEvent::StepEnd {
                    time: self.time,
                    iterations,
                });
                Ok(())
            }
            Err(e) => {
                log::warn!("step {} failed: {}", self.steps, e);
                self.finish(circuit, EngineState::Halted);
                Err(e)
            }
        }
    }

    /// The StepBegin + Iterating phases; returns the iteration count.
    fn advance(&mut self, circuit: &mut Circuit) -> Result<usize> {
        self.device_pass(circuit, |device, ctx| device.step_begin(ctx))?;
        self.solve_system()?;

        for iteration in 1..=self.config.max_iterations {
            self.x_prev.copy_from(&self.x);
            self.device_pass(circuit, |device, ctx| device.step_iter(ctx))?;
            self.solve_system()?;

            let mut max_diff = 0.0f64;
            for i in 0..self.x.len() {
                max_diff = max_diff.max((self.x[i] - self.x_prev[i]).abs());
            }
            if max_diff <= self.config.tolerance {
                return Ok(iteration);
            }
        }

        Err(Error::ConvergenceFailed {
            iterations: self.config.max_iterations,
        })
    }

    /// Run in batch mode until simulated time reaches `tstop`.
    pub fn run_until(&mut self, circuit: &mut Circuit, tstop: f64) -> Result<()> {
        let remaining = tstop - self.time;
        if remaining <= 0.0 {
            return Ok(());
        }
        let count = (remaining / self.config.dt + 1e-9).floor() as u64;
        self.run_steps(circuit, count)
    }

    /// Run a fixed number of steps in batch mode.
    pub fn run_steps(&mut self, circuit: &mut Circuit, count: u64) -> Result<()> {
        for _ in 0..count {
            self.step(circuit)?;
        }
        Ok(())
    }

    /// Continuous mode: compute however many steps wall-clock time says
    /// are due since the last poll, one `dt` of simulated time per `dt`
    /// of real time. Returns the number of steps taken.
    pub fn poll(&mut self, circuit: &mut Circuit) -> Result<usize> {
        if self.state != EngineState::Running || self.suspend_depth > 0 {
            self.last_poll = None;
            return Ok(0);
        }

        let now = Instant::now();
        let Some(last) = self.last_poll else {
            self.last_poll = Some(now);
            return Ok(0);
        };

        let due = ((now - last).as_secs_f64() / self.config.dt) as usize;
        let due = due.min(MAX_POLL_STEPS);
        for _ in 0..due {
            self.step(circuit)?;
        }
        if due == MAX_POLL_STEPS {
            // Fell too far behind; restart the pacing reference.
            self.last_poll = Some(now);
        } else if due > 0 {
            self.last_poll = Some(last + Duration::from_secs_f64(due as f64 * self.config.dt));
        }
        Ok(due)
    }

    /// Stop the run. Any in-flight unconverged state was already discarded
    /// (a step either converges and commits or halts the engine), so this
    /// just releases device resources and returns to `Idle`.
    pub fn stop(&mut self, circuit: &mut Circuit) {
        if self.state == EngineState::Running {
            self.finish(circuit, EngineState::Idle);
        } else {
            self.state = EngineState::Idle;
        }
    }

    /// Release device resources, notify subscribers, and move to `next`.
    fn finish(&mut self, circuit: &mut Circuit, next: EngineState) {
        for entry in circuit.entries_mut() {
            entry.device_mut().sim_end();
        }
        circuit.emit(SimEvent::SimEnd);
        self.state = next;
    }

    /// Run one lifecycle hook over every attached device.
    fn device_pass<F>(&mut self, circuit: &mut Circuit, mut hook: F) -> Result<()>
    where
        F: FnMut(&mut dyn Device, &mut StampContext<'_>) -> galvani_core::Result<()>,
    {
        for entry in circuit.entries_mut() {
            let (device, ports) = entry.hook_parts();
            let mut ctx = StampContext::new(
                &mut self.mna,
                ports,
                &self.guess,
                self.time,
                self.config.dt,
                self.config.temperature,
                &mut self.damped,
            );
            hook(device, &mut ctx)?;
        }
        Ok(())
    }

    /// Assemble and solve; updates the working guess but not the
    /// published solution.
    fn solve_system(&mut self) -> Result<()> {
        let (a, z) = self.mna.assemble();
        let x = solve_dense(&a, &z)?;
        self.guess.load(&x);
        self.x = x;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galvani_devices::{Resistor, VoltageSource};

    /// V1 = 10 V across R1 = 1k; V(top) = 10 V, |I| = 10 mA.
    fn single_loop_circuit() -> (Circuit, NodeId) {
        let mut circuit = Circuit::new();
        let v1 = circuit.attach(Box::new(VoltageSource::new("V1", 10.0)));
        let r1 = circuit.attach(Box::new(Resistor::new("R1", 1e3)));

        circuit
            .merge_nodes(
                circuit.port_node(v1, 0).unwrap(),
                circuit.port_node(r1, 0).unwrap(),
            )
            .unwrap();
        circuit
            .merge_nodes(circuit.port_node(v1, 1).unwrap(), NodeId::GROUND)
            .unwrap();
        circuit
            .merge_nodes(circuit.port_node(r1, 1).unwrap(), NodeId::GROUND)
            .unwrap();
        let top = circuit.port_node(v1, 0).unwrap();
        (circuit, top)
    }

    #[test]
    fn test_start_solves_dc_point() {
        let (mut circuit, top) = single_loop_circuit();
        let mut engine = Engine::default();

        engine.start(&mut circuit).unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        assert!((engine.voltage(top) - 10.0).abs() < 1e-9);
        // Ohm's law round trip: the branch current magnitude is V/R.
        assert!((engine.branch_current(0).abs() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_step_requires_running() {
        let (mut circuit, _) = single_loop_circuit();
        let mut engine = Engine::default();
        assert!(matches!(engine.step(&mut circuit), Err(Error::NotRunning)));
    }

    #[test]
    fn test_suspended_step_is_a_no_op() {
        let (mut circuit, _) = single_loop_circuit();
        let mut engine = Engine::default();
        engine.start(&mut circuit).unwrap();

        engine.suspend();
        engine.suspend();
        engine.step(&mut circuit).unwrap();
        assert_eq!(engine.step_count(), 0, "suspended driver does not advance");

        engine.resume();
        engine.step(&mut circuit).unwrap();
        assert_eq!(engine.step_count(), 0, "re-entrant: still suspended");

        engine.resume();
        engine.step(&mut circuit).unwrap();
        assert_eq!(engine.step_count(), 1);
    }

    #[test]
    fn test_null_resistance_halts_start() {
        let mut circuit = Circuit::new();
        circuit.attach(Box::new(VoltageSource::new("V1", 5.0)));
        circuit.attach(Box::new(Resistor::new("R1", 0.0)));

        let mut engine = Engine::default();
        let result = engine.start(&mut circuit);
        assert!(matches!(result, Err(Error::Device(_))));
        assert_eq!(engine.state(), EngineState::Halted);
    }

    #[test]
    fn test_singular_system_is_fatal_and_unpublished() {
        // A resistor floating between two otherwise unconnected nodes has
        // no ground tie: the system is singular.
        let mut circuit = Circuit::new();
        circuit.attach(Box::new(Resistor::new("R1", 1e3)));

        let mut engine = Engine::default();
        let result = engine.start(&mut circuit);
        assert!(matches!(result, Err(Error::SingularSystem)));
        assert_eq!(engine.state(), EngineState::Halted);
        // Nothing non-finite ever reached the published accessors.
        assert_eq!(engine.voltage(NodeId::new(1)), 0.0);
    }

    #[test]
    fn test_watermarks_track_iteration_counts() {
        let (mut circuit, _) = single_loop_circuit();
        let mut engine = Engine::default();
        engine.start(&mut circuit).unwrap();
        engine.run_steps(&mut circuit, 3).unwrap();

        let w = engine.watermarks();
        assert_eq!(w.low(), Some(1), "a linear circuit converges immediately");
        assert_eq!(w.high(), Some(1));
    }

    #[test]
    fn test_run_until_accumulates_dt() {
        let (mut circuit, _) = single_loop_circuit();
        let mut engine = Engine::new(EngineConfig {
            dt: 1e-3,
            ..Default::default()
        });
        engine.start(&mut circuit).unwrap();
        engine.run_until(&mut circuit, 5e-3).unwrap();

        assert_eq!(engine.step_count(), 5);
        assert!((engine.time() - 5e-3).abs() < 1e-12);
    }

    #[test]
    fn test_poll_establishes_pacing_reference_first() {
        let (mut circuit, _) = single_loop_circuit();
        // A huge period keeps wall-clock polls from ever being "due".
        let mut engine = Engine::new(EngineConfig {
            dt: 3600.0,
            ..Default::default()
        });
        engine.start(&mut circuit).unwrap();

        assert_eq!(engine.poll(&mut circuit).unwrap(), 0, "first poll only arms");
        assert_eq!(engine.poll(&mut circuit).unwrap(), 0, "period not elapsed");

        // Suspension drops the pacing reference.
        engine.suspend();
        assert_eq!(engine.poll(&mut circuit).unwrap(), 0);
        engine.resume();
        assert_eq!(engine.poll(&mut circuit).unwrap(), 0, "re-armed after resume");
    }

    #[test]
    fn test_stop_releases_and_idles() {
        let (mut circuit, _) = single_loop_circuit();
        let mut engine = Engine::default();
        engine.start(&mut circuit).unwrap();
        engine.stop(&mut circuit);
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(matches!(engine.step(&mut circuit), Err(Error::NotRunning)));
    }
}
