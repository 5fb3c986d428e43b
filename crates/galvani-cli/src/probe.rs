//! Probe expressions: `v(<node-or-symbol>)` and `i(<source-name>)`.

use anyhow::{bail, Result};

use galvani_core::{Circuit, NodeId};
use galvani_solver::Engine;

/// A resolved probe.
#[derive(Debug, Clone)]
pub enum Probe {
    /// Voltage at a node.
    Voltage { label: String, node: NodeId },
    /// Branch current through a voltage-source row.
    Current { label: String, row: usize },
}

impl Probe {
    /// Parse and resolve a probe expression against a circuit.
    pub fn parse(expr: &str, circuit: &Circuit) -> Result<Self> {
        let trimmed = expr.trim();
        let lower = trimmed.to_ascii_lowercase();

        let inner = |prefix: &str| -> Option<&str> {
            if lower.starts_with(prefix) && trimmed.ends_with(')') {
                Some(trimmed[prefix.len()..trimmed.len() - 1].trim())
            } else {
                None
            }
        };

        if let Some(target) = inner("v(") {
            let node = if let Ok(idx) = target.parse::<u32>() {
                let node = NodeId::new(idx);
                if idx as usize > circuit.node_count() {
                    bail!("node {} does not exist", idx);
                }
                node
            } else if let Some(node) = circuit.find_node(target) {
                node
            } else {
                bail!("unknown node or symbol '{}'", target);
            };
            return Ok(Probe::Voltage {
                label: trimmed.to_string(),
                node,
            });
        }

        if let Some(target) = inner("i(") {
            let Some(row) = circuit.find_source(target) else {
                bail!("unknown source '{}'", target);
            };
            return Ok(Probe::Current {
                label: trimmed.to_string(),
                row,
            });
        }

        bail!("bad probe '{}': expected v(<node>) or i(<source>)", expr);
    }

    /// The probe's display label (the original expression).
    pub fn label(&self) -> &str {
        match self {
            Probe::Voltage { label, .. } | Probe::Current { label, .. } => label,
        }
    }

    /// Evaluate against the engine's published solution.
    pub fn eval(&self, engine: &Engine) -> f64 {
        match self {
            Probe::Voltage { node, .. } => engine.voltage(*node),
            Probe::Current { row, .. } => engine.branch_current(*row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galvani_core::Circuit;

    fn fixture() -> Circuit {
        let parsed = galvani_parser::read_str(
            "nodes 2\nsources 1\nnode 2 out\n\
             V V1 1 0 5 0 0 0\n\
             R R1 1 2 1k 0 0.25 0 0\n\
             R R2 2 0 1k 0 0.25 0 0\n\
             end\n",
        )
        .unwrap();
        parsed.circuit
    }

    #[test]
    fn test_parse_numeric_voltage_probe() {
        let circuit = fixture();
        let probe = Probe::parse("v(2)", &circuit).unwrap();
        assert!(matches!(
            probe,
            Probe::Voltage { node, .. } if node == NodeId::new(2)
        ));
    }

    #[test]
    fn test_parse_symbolic_voltage_probe() {
        let circuit = fixture();
        let probe = Probe::parse("v(out)", &circuit).unwrap();
        assert!(matches!(
            probe,
            Probe::Voltage { node, .. } if node == NodeId::new(2)
        ));
        assert_eq!(probe.label(), "v(out)");
    }

    #[test]
    fn test_parse_current_probe_case_insensitive() {
        let circuit = fixture();
        let probe = Probe::parse("I(v1)", &circuit).unwrap();
        assert!(matches!(probe, Probe::Current { row: 0, .. }));
    }

    #[test]
    fn test_rejects_unknown_targets() {
        let circuit = fixture();
        assert!(Probe::parse("v(99)", &circuit).is_err());
        assert!(Probe::parse("v(missing)", &circuit).is_err());
        assert!(Probe::parse("i(V9)", &circuit).is_err());
        assert!(Probe::parse("p(1)", &circuit).is_err());
    }
}
