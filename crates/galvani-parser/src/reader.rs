//! Reader for the persisted circuit format.

use std::path::Path;

use indexmap::IndexMap;

use galvani_core::{units, Circuit, Device, NodeId};
use galvani_devices::{
    Bjt, BjtParams, BjtPolarity, Capacitor, CurrentSource, Diode, DiodeParams, GateKind, Inductor,
    LogicGate, Mosfet, MosfetParams, MosfetType, NoiseSource, Resistor, VoltageSource, Waveform,
};

use crate::error::{Error, Result};

/// A parsed circuit plus its node symbol table in declaration order.
#[derive(Debug)]
pub struct ParseResult {
    /// The reconstructed circuit.
    pub circuit: Circuit,
    /// Node symbols in the order the file declared them.
    pub symbols: IndexMap<String, NodeId>,
}

/// Read a circuit from a file.
pub fn read_file(path: impl AsRef<Path>) -> Result<ParseResult> {
    let content = std::fs::read_to_string(path)?;
    read_str(&content)
}

/// Read a circuit from text.
pub fn read_str(content: &str) -> Result<ParseResult> {
    Reader::new().run(content)
}

struct Reader {
    circuit: Circuit,
    symbols: IndexMap<String, NodeId>,
    declared_nodes: Option<usize>,
    declared_sources: Option<usize>,
}

impl Reader {
    fn new() -> Self {
        Self {
            circuit: Circuit::new(),
            symbols: IndexMap::new(),
            declared_nodes: None,
            declared_sources: None,
        }
    }

    fn run(mut self, content: &str) -> Result<ParseResult> {
        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('*') {
                continue;
            }
            if line == "end" {
                break;
            }
            self.line(line_no, line)?;
        }

        if let Some(m) = self.declared_sources {
            if m != self.circuit.source_count() {
                return Err(Error::InvalidValue(format!(
                    "source count mismatch: header says {}, records claim {}",
                    m,
                    self.circuit.source_count()
                )));
            }
        }

        Ok(ParseResult {
            circuit: self.circuit,
            symbols: self.symbols,
        })
    }

    fn line(&mut self, line_no: usize, line: &str) -> Result<()> {
        // Free-text header fields take the rest of the line verbatim.
        if let Some(rest) = line.strip_prefix("description ") {
            self.circuit.set_description(rest.trim());
            return Ok(());
        }
        if let Some(rest) = line.strip_prefix("author ") {
            self.circuit.set_author(rest.trim());
            return Ok(());
        }
        if let Some(rest) = line.strip_prefix("keywords ") {
            self.circuit.set_keywords(rest.trim());
            return Ok(());
        }

        let mut tokens = line.split_whitespace();
        let head = tokens
            .next()
            .ok_or_else(|| Error::at(line_no, "empty record"))?;
        let rest: Vec<&str> = tokens.collect();

        match head {
            "nodes" => {
                let n = parse_count(line_no, rest.first())?;
                self.declared_nodes = Some(n);
                for _ in 0..n {
                    self.circuit.add_node();
                }
                Ok(())
            }
            "sources" => {
                self.declared_sources = Some(parse_count(line_no, rest.first())?);
                Ok(())
            }
            "node" => {
                if rest.len() != 2 {
                    return Err(Error::at(line_no, "expected: node <index> <symbol>"));
                }
                let id = self.node_at(line_no, rest[0])?.ok_or_else(|| {
                    Error::at(line_no, "a symbol cannot name a floating port")
                })?;
                self.circuit.set_node_name(id, rest[1])?;
                self.symbols.insert(rest[1].to_string(), id);
                Ok(())
            }
            _ => self.component(line_no, head, &rest),
        }
    }

    fn component(&mut self, line_no: usize, kind: &str, rest: &[&str]) -> Result<()> {
        if self.declared_nodes.is_none() {
            return Err(Error::at(line_no, "component record before the nodes count"));
        }

        let (node_count, field_count) = match kind {
            "R" => (2, 5),
            "C" => (2, 1),
            "L" => (2, 1),
            "V" | "I" => (2, 4),
            "D" => (2, 2),
            "M" => (3, 4),
            "Q" => (3, 3),
            "U" => (2, 4),
            "N" => (2, 1),
            other => return Err(Error::UnknownType(other.to_string())),
        };

        if rest.len() != 1 + node_count + field_count {
            return Err(Error::at(
                line_no,
                format!(
                    "{} record expects a name, {} nodes, and {} fields",
                    kind, node_count, field_count
                ),
            ));
        }

        let name = rest[0].to_string();
        let mut nodes = Vec::with_capacity(node_count);
        let mut floating = Vec::new();
        for (port, token) in rest[1..1 + node_count].iter().enumerate() {
            match self.node_at(line_no, token)? {
                Some(id) => nodes.push(id),
                None => {
                    // Attach on ground, then float the port afterwards.
                    nodes.push(NodeId::GROUND);
                    floating.push(port);
                }
            }
        }

        let mut fields = Vec::with_capacity(field_count);
        for token in &rest[1 + node_count..] {
            fields.push(
                units::parse_value(token)
                    .ok_or_else(|| Error::InvalidValue((*token).to_string()))?,
            );
        }

        let device = build_device(kind, &name, &fields)?;
        let id = self.circuit.attach_at(device, &nodes)?;
        for port in floating {
            self.circuit.disconnect(id, port)?;
        }
        Ok(())
    }

    /// Parse a node token: an index within the declared count, or -1 for a
    /// floating port.
    fn node_at(&self, line_no: usize, token: &str) -> Result<Option<NodeId>> {
        let idx: i64 = token
            .parse()
            .map_err(|_| Error::at(line_no, format!("bad node index '{}'", token)))?;
        if idx == -1 {
            return Ok(None);
        }
        let limit = self.declared_nodes.unwrap_or(0);
        if idx < 0 || idx as usize > limit {
            return Err(Error::at(
                line_no,
                format!("node {} outside the declared count {}", idx, limit),
            ));
        }
        Ok(Some(NodeId::new(idx as u32)))
    }
}

fn parse_count(line_no: usize, token: Option<&&str>) -> Result<usize> {
    token
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| Error::at(line_no, "expected a count"))
}

/// Construct a device from its type letter and fixed-order fields.
fn build_device(kind: &str, name: &str, fields: &[f64]) -> Result<Box<dyn Device>> {
    Ok(match kind {
        "R" => Box::new(Resistor::with_params(
            name, fields[0], fields[1], fields[2], fields[3], fields[4],
        )),
        "C" => Box::new(Capacitor::new(name, fields[0])),
        "L" => Box::new(Inductor::new(name, fields[0])),
        "V" => Box::new(VoltageSource::with_waveform(
            name,
            Waveform::from_fields(fields[0], fields[1], fields[2], fields[3]),
        )),
        "I" => Box::new(CurrentSource::with_waveform(
            name,
            Waveform::from_fields(fields[0], fields[1], fields[2], fields[3]),
        )),
        "D" => Box::new(Diode::with_params(
            name,
            DiodeParams {
                is: fields[0],
                n: fields[1],
            },
        )),
        "M" => {
            let mos_type = if fields[0] >= 0.0 {
                MosfetType::Nmos
            } else {
                MosfetType::Pmos
            };
            Box::new(Mosfet::with_params(
                name,
                mos_type,
                MosfetParams {
                    vto: fields[1],
                    kp: fields[2],
                    lambda: fields[3],
                },
            ))
        }
        "Q" => {
            let polarity = if fields[0] >= 0.0 {
                BjtPolarity::Npn
            } else {
                BjtPolarity::Pnp
            };
            Box::new(Bjt::with_params(
                name,
                polarity,
                BjtParams {
                    is: fields[1],
                    bf: fields[2],
                    ..Default::default()
                },
            ))
        }
        "U" => Box::new(LogicGate::with_params(
            name,
            GateKind::from_field(fields[0]),
            fields[1],
            fields[2],
            fields[3],
        )),
        "N" => Box::new(NoiseSource::new(name, fields[0])),
        other => return Err(Error::UnknownType(other.to_string())),
    })
}
