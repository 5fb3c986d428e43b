//! Persisted circuit format for Galvani.
//!
//! The format is line-based. A header carries free-text metadata and the
//! node/source counts, then one record per component: a type letter, the
//! device name, its node assignments (-1 for a floating port), and the
//! numeric parameter fields in the fixed order the type defines.
//!
//! ```text
//! * low-pass demo
//! description RC low-pass fixture
//! author jdoe
//! keywords filter rc demo
//! nodes 2
//! sources 1
//! node 2 out
//! V V1 1 0   5.000000e0 0.000000e0 0.000000e0 0.000000e0
//! R R1 1 2   1.000000e3 5.000000e0 2.500000e-1 0.000000e0 0.000000e0
//! C C1 2 0   1.000000e-6
//! end
//! ```
//!
//! # Example
//!
//! ```
//! use galvani_parser::read_str;
//!
//! let parsed = read_str(
//!     "nodes 2\nsources 1\n\
//!      V V1 1 0 10 0 0 0\n\
//!      R R1 1 2 1k 0 0.25 0 0\n\
//!      R R2 2 0 1k 0 0.25 0 0\n\
//!      end\n",
//! )
//! .unwrap();
//! assert_eq!(parsed.circuit.component_count(), 3);
//! ```

pub mod error;
pub mod reader;
pub mod writer;

pub use error::{Error, Result};
pub use reader::{read_file, read_str, ParseResult};
pub use writer::{write_file, write_string};
