//! Voltage-source loop analyzer.
//!
//! Discovers the closed cycles a voltage source drives by depth-first
//! search over the topology: starting from the source's "+" port, the
//! search walks through neighboring components via their port pairs until
//! it reaches the same source's "−" port. The visited set and the edge
//! stack are explicit local state, so the search is reentrant and leaves
//! nothing behind when it unwinds.

use crate::circuit::Circuit;
use crate::device::ComponentId;
use crate::error::{Error, Result};
use crate::node::NodeId;

/// Minimum traversal depth for a valid loop: the search must pass through
/// at least one component besides the source itself.
pub const MIN_LOOP_DEPTH: usize = 2;

/// One traversal edge of a loop: a component crossed through one of its
/// port pairs, with the polarity of the crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopEdge {
    /// The component crossed.
    pub component: ComponentId,
    /// Index of the pair within the component's pair list.
    pub pair: usize,
    /// +1 when entered through the pair's `p1`, -1 through `p2`.
    pub sign: i8,
}

/// A closed cycle relative to one voltage source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    /// The originating source component.
    pub source: ComponentId,
    /// The ordered chain of pairs from "+" to "−".
    pub edges: Vec<LoopEdge>,
}

impl Loop {
    /// Number of edges in the cycle.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the loop has no edges (never produced by the analyzer).
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Find every loop that closes between a voltage source's "+" port
/// (port 0) and "−" port (port 1).
///
/// A source with a floating "+" port has no loops. The search terminates
/// on any finite graph: each node is marked while it is under examination
/// and unmarked on backtrack.
pub fn find_source_loops(circuit: &Circuit, source: ComponentId) -> Result<Vec<Loop>> {
    let entry = circuit.entry(source).ok_or(Error::UnknownComponent(source))?;
    if entry.ports().len() < 2 {
        return Ok(Vec::new());
    }
    let Some(start) = entry.ports()[0] else {
        return Ok(Vec::new());
    };

    let mut visited = vec![false; circuit.node_count() + 1];
    let mut stack = Vec::new();
    let mut loops = Vec::new();
    search(
        circuit,
        source,
        1,
        start,
        1,
        &mut visited,
        &mut stack,
        &mut loops,
    );
    Ok(loops)
}

#[allow(clippy::too_many_arguments)]
fn search(
    circuit: &Circuit,
    source: ComponentId,
    neg_port: usize,
    node: NodeId,
    depth: usize,
    visited: &mut [bool],
    stack: &mut Vec<LoopEdge>,
    loops: &mut Vec<Loop>,
) {
    visited[node.index()] = true;

    if let Some(here) = circuit.node(node) {
        for branch in here.branches() {
            if branch.component == source {
                // Reaching the source's own "−" port closes a loop, as
                // long as we actually traversed something on the way.
                if branch.port == neg_port && depth >= MIN_LOOP_DEPTH {
                    loops.push(Loop {
                        source,
                        edges: stack.clone(),
                    });
                }
                continue;
            }

            let Some(entry) = circuit.entry(branch.component) else {
                continue;
            };
            for (pair_idx, pair) in entry.pairs().iter().enumerate() {
                let Some(other) = pair.other(branch.port) else {
                    continue;
                };
                let sign = if pair.p1 == branch.port { 1 } else { -1 };
                let Some(next) = entry.ports()[other] else {
                    continue;
                };
                if visited[next.index()] {
                    continue;
                }
                stack.push(LoopEdge {
                    component: branch.component,
                    pair: pair_idx,
                    sign,
                });
                search(
                    circuit, source, neg_port, next, depth + 1, visited, stack, loops,
                );
                stack.pop();
            }
        }
    }

    visited[node.index()] = false;
}
