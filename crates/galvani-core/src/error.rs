//! Error types for galvani-core.

use thiserror::Error;

use crate::device::ComponentId;
use crate::node::NodeId;

#[derive(Debug, Error)]
pub enum Error {
    /// A node was asked to merge with itself; the network is left untouched.
    #[error("redundant connection: node {0} is already node {0}")]
    RedundantConnection(NodeId),

    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("unknown component: {0}")]
    UnknownComponent(ComponentId),

    #[error("node {node} still has {branches} attached branches")]
    NodeInUse { node: NodeId, branches: usize },

    #[error("the ground node cannot be removed")]
    GroundImmutable,

    #[error("component '{name}' has {expected} ports, got {actual} nodes")]
    PortCountMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("port {port} of component {component} is out of range")]
    UnknownPort { component: ComponentId, port: usize },

    /// A device rejected its own configuration (e.g. a null resistance).
    #[error("invalid parameter on '{device}': {message}")]
    InvalidParameter { device: String, message: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a device configuration error.
    pub fn invalid_parameter(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            device: device.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
