//! Core circuit reader module

pub mod column;
pub mod combo;
pub mod container;
pub mod format;
pub mod reader;
pub mod types;

use std::path::Path;

pub use combo::{ComboRow, ComboTable, KeyColumn};
pub use format::{detect_format, is_circuit_file};
pub use reader::{CircuitBackend, CircuitFile, ComboKeySource};
pub use types::error::{MvdError, Result};
pub use types::models::{AttributeKind, CircuitFormat, DataType, OpenOptions, Value};
pub use types::selection::{Selected, Selector};

/// Opens a circuit file of any supported format, using the default
/// population of SONATA files.
pub fn open(path: impl AsRef<Path>) -> Result<CircuitFile> {
    CircuitFile::open(path, None)
}
