//! Core circuit representation and MNA matrix structures for Galvani.
//!
//! This crate provides the fundamental data structures for representing
//! circuit topologies (nodes, branches, ports, pairs), the device lifecycle
//! contract every component model implements, the block Modified Nodal
//! Analysis (MNA) system they stamp into, and the voltage-source loop
//! analyzer.

pub mod circuit;
pub mod device;
pub mod error;
pub mod event;
pub mod loops;
pub mod mna;
pub mod node;
pub mod units;

pub use circuit::{Circuit, Pair};
pub use device::{ComponentId, Device, DeviceRecord, StampContext};
pub use error::{Error, Result};
pub use event::SimEvent;
pub use loops::{Loop, LoopEdge};
pub use mna::{MnaSystem, Solution};
pub use node::{Node, NodeId, PortRef};
