//! Error types for galvani-solver.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The assembled system could not be factorized (isolated node,
    /// unlimited short, missing ground tie) or produced non-finite values.
    #[error("singular system matrix")]
    SingularSystem,

    /// The inner Newton loop hit the iteration cap.
    #[error("could not find stable solution after {iterations} iterations")]
    ConvergenceFailed { iterations: usize },

    #[error("invalid matrix dimensions: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("simulation is not running")]
    NotRunning,

    /// A device hook failed (configuration or I/O).
    #[error(transparent)]
    Device(#[from] galvani_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
