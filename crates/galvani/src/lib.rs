//! # Galvani
//!
//! A circuit simulation engine built on Modified Nodal Analysis (MNA).
//!
//! Galvani provides:
//! - An index-addressed circuit topology (nodes, branches, ports, pairs)
//! - A device library with incremental (delta) companion-model stamping
//! - A damped Newton-Raphson DC/transient engine
//! - A voltage-source loop analyzer
//! - A persisted circuit format and a batch analysis driver
//!
//! ## Quick start
//!
//! ```
//! use galvani::prelude::*;
//!
//! let mut circuit = Circuit::new();
//! let v1 = circuit.attach(Box::new(VoltageSource::new("V1", 10.0)));
//! let r1 = circuit.attach(Box::new(Resistor::new("R1", 1e3)));
//!
//! circuit.merge_nodes(
//!     circuit.port_node(v1, 0).unwrap(),
//!     circuit.port_node(r1, 0).unwrap(),
//! ).unwrap();
//! circuit.merge_nodes(circuit.port_node(v1, 1).unwrap(), NodeId::GROUND).unwrap();
//! circuit.merge_nodes(circuit.port_node(r1, 1).unwrap(), NodeId::GROUND).unwrap();
//!
//! let mut engine = Engine::default();
//! engine.start(&mut circuit).unwrap();
//!
//! let top = circuit.port_node(v1, 0).unwrap();
//! assert!((engine.voltage(top) - 10.0).abs() < 1e-9);
//! ```

// Re-export the member crates
pub use galvani_core as core;
pub use galvani_devices as devices;
pub use galvani_parser as parser;
pub use galvani_solver as solver;

// Convenient re-exports from galvani_core
pub use galvani_core::{
    Circuit, ComponentId, Device, DeviceRecord, Error as CoreError, Loop, LoopEdge, MnaSystem,
    Node, NodeId, Pair, PortRef, SimEvent, Solution, StampContext,
};

// Convenient re-exports from galvani_devices
pub use galvani_devices::{
    Bjt, BjtParams, BjtPolarity, Capacitor, CurrentSource, Diode, DiodeParams, GateKind, Inductor,
    LogicGate, Mosfet, MosfetParams, MosfetRegion, MosfetType, NoiseSource, Resistor,
    VoltageSource, Waveform,
};

// Convenient re-exports from galvani_solver
pub use galvani_solver::{
    solve_dense, Engine, EngineConfig, EngineState, Error as SolverError, Watermarks,
};

// Convenient re-exports from galvani_parser
pub use galvani_parser::{
    read_file, read_str, write_file, write_string, Error as ParseError, ParseResult,
};

/// Re-export of nalgebra's dynamic vector type.
pub use nalgebra::DVector;

/// Re-export of nalgebra's dynamic matrix type.
pub use nalgebra::DMatrix;

/// Prelude module containing commonly used types and traits.
///
/// ```
/// use galvani::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::{Circuit, ComponentId, Device, MnaSystem, NodeId, SimEvent, Solution};

    // Engine
    pub use crate::{Engine, EngineConfig, EngineState};

    // Devices
    pub use crate::{
        Bjt, Capacitor, CurrentSource, Diode, Inductor, LogicGate, Mosfet, NoiseSource, Resistor,
        VoltageSource, Waveform,
    };

    // Persisted format
    pub use crate::{read_file, read_str, write_file, write_string};

    // Common external types
    pub use crate::{DMatrix, DVector};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_parse_and_solve_through_facade() {
        let parsed = read_str(
            "nodes 2\nsources 1\n\
             V V1 1 0 10 0 0 0\n\
             R R1 1 2 1k 0 0.25 0 0\n\
             R R2 2 0 1k 0 0.25 0 0\n\
             end\n",
        )
        .unwrap();
        let mut circuit = parsed.circuit;

        let mut engine = Engine::default();
        engine.start(&mut circuit).unwrap();
        assert!((engine.voltage(NodeId::new(2)) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_prelude_imports() {
        let r = Resistor::new("R1", 1000.0);
        assert_eq!(r.resistance, 1000.0);
        let _: NodeId = NodeId::GROUND;
    }
}
