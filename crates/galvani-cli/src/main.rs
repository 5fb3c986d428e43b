//! Galvani batch analysis driver.
//!
//! Reads a persisted circuit, runs the engine in batch mode, and emits one
//! line per converged time step: elapsed time followed by tab-separated
//! probe values. Without `--tstop` it prints the DC operating point table
//! instead.

mod probe;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use galvani_core::{units, Circuit, NodeId};
use galvani_solver::{Engine, EngineConfig};

use crate::probe::Probe;

#[derive(Parser)]
#[command(name = "galvani")]
#[command(about = "MNA circuit simulation engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Input circuit file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Probe expression, v(<node-or-symbol>) or i(<source-name>); repeatable
    #[arg(short, long = "probe", value_name = "EXPR")]
    probes: Vec<String>,

    /// Time step (engineering suffixes accepted, e.g. 10u)
    #[arg(long, default_value = "1m")]
    tstep: String,

    /// Stop time; omit to print the DC operating point instead
    #[arg(long)]
    tstop: Option<String>,

    /// Print a column header line before the rows
    #[arg(long)]
    header: bool,

    /// Emit the time derivative of each probe value
    #[arg(long)]
    deriv: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let parsed = galvani_parser::read_file(&cli.input)
        .with_context(|| format!("failed to read circuit '{}'", cli.input.display()))?;
    let mut circuit = parsed.circuit;

    let tstep = parse_time(&cli.tstep).context("bad --tstep")?;
    let probes = cli
        .probes
        .iter()
        .map(|expr| Probe::parse(expr, &circuit))
        .collect::<Result<Vec<_>>>()?;

    if cli.verbose {
        eprintln!(
            "circuit: {} ({} nodes, {} sources, {} components)",
            circuit.description().unwrap_or("untitled"),
            circuit.node_count(),
            circuit.source_count(),
            circuit.component_count()
        );
    }

    let mut engine = Engine::new(EngineConfig {
        dt: tstep,
        ..Default::default()
    });

    match &cli.tstop {
        Some(tstop) => {
            let tstop = parse_time(tstop).context("bad --tstop")?;
            run_batch(&mut engine, &mut circuit, &probes, tstop, &cli)?;
        }
        None => {
            run_operating_point(&mut engine, &mut circuit)?;
        }
    }

    engine.stop(&mut circuit);
    Ok(())
}

fn parse_time(text: &str) -> Result<f64> {
    let value = units::parse_value(text).ok_or_else(|| anyhow!("unparseable time '{}'", text))?;
    if !(value.is_finite() && value > 0.0) {
        return Err(anyhow!("time '{}' must be positive", text));
    }
    Ok(value)
}

/// Run to `tstop`, emitting one row per converged step.
fn run_batch(
    engine: &mut Engine,
    circuit: &mut Circuit,
    probes: &[Probe],
    tstop: f64,
    cli: &Cli,
) -> Result<()> {
    engine
        .start(circuit)
        .map_err(|e| anyhow!("simulation start failed: {}", e))?;

    if cli.header {
        let mut header = String::from("time");
        for probe in probes {
            header.push('\t');
            if cli.deriv {
                header.push_str(&format!("d/dt {}", probe.label()));
            } else {
                header.push_str(probe.label());
            }
        }
        println!("{}", header);
    }

    let dt = engine.config().dt;
    let steps = ((tstop - engine.time()) / dt + 1e-9).floor() as u64;
    let mut previous: Vec<f64> = probes.iter().map(|p| p.eval(engine)).collect();

    for _ in 0..steps {
        engine
            .step(circuit)
            .map_err(|e| anyhow!("step failed at t = {}: {}", engine.time(), e))?;

        let mut row = format!("{:.9e}", engine.time());
        for (idx, probe) in probes.iter().enumerate() {
            let value = probe.eval(engine);
            let emitted = if cli.deriv {
                (value - previous[idx]) / dt
            } else {
                value
            };
            previous[idx] = value;
            row.push_str(&format!("\t{:.9e}", emitted));
        }
        println!("{}", row);
    }

    Ok(())
}

/// Solve and print the DC operating point table.
fn run_operating_point(engine: &mut Engine, circuit: &mut Circuit) -> Result<()> {
    engine
        .start(circuit)
        .map_err(|e| anyhow!("simulation start failed: {}", e))?;
    // One converged step settles the nonlinear companion models.
    engine
        .step(circuit)
        .map_err(|e| anyhow!("operating point failed: {}", e))?;

    println!("DC Operating Point");
    println!("==================");
    println!();
    println!("Node voltages:");
    for idx in 1..=circuit.node_count() {
        let node = NodeId::new(idx as u32);
        let label = circuit
            .node(node)
            .and_then(|n| n.name())
            .map(String::from)
            .unwrap_or_else(|| node.to_string());
        println!("  {:<12} {}V", label, units::format_value(engine.voltage(node)));
    }

    if circuit.source_count() > 0 {
        println!();
        println!("Source currents:");
        for row in 0..circuit.source_count() {
            let label = circuit
                .source_owner(row)
                .and_then(|id| circuit.device(id))
                .map(|d| d.name().to_string())
                .unwrap_or_else(|| format!("#{}", row));
            println!(
                "  {:<12} {}A",
                label,
                units::format_value(engine.branch_current(row))
            );
        }
    }

    if let Some(high) = engine.watermarks().high() {
        println!();
        println!("Iterations: {}", high);
    }
    println!();
    Ok(())
}
