//! # mvd-reader
//!
//! Read-only access to neuronal circuit files: legacy MVD2 text files, MVD3
//! columnar containers and SONATA node populations, all behind one per-cell
//! attribute API.
//!
//! ```no_run
//! use mvd_reader::{CircuitFile, Selector};
//!
//! let circuit = CircuitFile::open("circuit.mvd3", None)?;
//! let first_ten = circuit.morphologies(&Selector::range(0, 10))?;
//! let one = circuit.positions(&Selector::single(42))?;
//! # Ok::<(), mvd_reader::MvdError>(())
//! ```
pub mod mvd;

// Re-export the main types for convenience
pub use mvd::{
    AttributeKind,
    CircuitBackend,
    CircuitFile,
    CircuitFormat,
    ComboKeySource,
    ComboRow,
    ComboTable,
    DataType,
    KeyColumn,
    MvdError,
    OpenOptions,
    Result,
    Selected,
    Selector,
    Value,
    detect_format,
    is_circuit_file,
    open,
    container::{Container, ContainerWriter, FileContainer, MemoryContainer},
};
