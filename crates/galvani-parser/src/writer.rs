//! Writer for the persisted circuit format.
//!
//! Emits exactly the fields each component type defines, in the type's
//! fixed order, so a written circuit reads back identically.

use std::path::Path;

use galvani_core::Circuit;

use crate::error::Result;

/// Serialize a circuit to the persisted text format.
pub fn write_string(circuit: &Circuit) -> String {
    let mut out = String::new();

    if let Some(text) = circuit.description() {
        out.push_str(&format!("description {}\n", text));
    }
    if let Some(text) = circuit.author() {
        out.push_str(&format!("author {}\n", text));
    }
    if let Some(text) = circuit.keywords() {
        out.push_str(&format!("keywords {}\n", text));
    }

    out.push_str(&format!("nodes {}\n", circuit.node_count()));
    out.push_str(&format!("sources {}\n", circuit.source_count()));

    for idx in 1..=circuit.node_count() {
        let id = galvani_core::NodeId::new(idx as u32);
        if let Some(name) = circuit.node(id).and_then(|n| n.name()) {
            out.push_str(&format!("node {} {}\n", idx, name));
        }
    }

    for (id, entry) in circuit.components() {
        let record = entry.device().record();
        out.push_str(&format!("{} {}", record.kind, record.name));
        for port in 0..entry.ports().len() {
            match circuit.port_node(id, port) {
                Some(node) => out.push_str(&format!(" {}", node.as_u32())),
                None => out.push_str(" -1"),
            }
        }
        for field in &record.fields {
            out.push_str(&format!(" {:>14.6e}", field));
        }
        out.push('\n');
    }

    out.push_str("end\n");
    out
}

/// Serialize a circuit to a file.
pub fn write_file(circuit: &Circuit, path: impl AsRef<Path>) -> Result<()> {
    std::fs::write(path, write_string(circuit))?;
    Ok(())
}
