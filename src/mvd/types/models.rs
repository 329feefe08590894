//! Core data structures shared by all circuit backends.

use std::fmt;
use std::path::PathBuf;

/// The on-disk encoding of a circuit file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitFormat {
    /// Legacy MVD 2.0 record file.
    Mvd2,
    /// MVD 3.0 columnar container (`cells/...`, `library/...`).
    Mvd3,
    /// SONATA nodes container (`nodes/<population>/<group>/...`).
    Sonata,
}

impl fmt::Display for CircuitFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CircuitFormat::Mvd2 => write!(f, "MVD2"),
            CircuitFormat::Mvd3 => write!(f, "MVD3"),
            CircuitFormat::Sonata => write!(f, "SONATA"),
        }
    }
}

/// Logical element type of a stored dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int,
    Float,
    Text,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "int"),
            DataType::Float => write!(f, "float"),
            DataType::Text => write!(f, "text"),
        }
    }
}

/// How an attribute is stored, discovered once when the file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// Index array plus a library of distinct strings.
    Enumerated,
    /// Dense per-cell values, `width` components per cell.
    Scalar { dtype: DataType, width: usize },
}

/// A single cell value returned by the generic attribute accessor.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    /// A fixed-width row, e.g. a position or a quaternion.
    Vector(Vec<f64>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric view; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::Text(text) => write!(f, "{}", text),
            Value::Vector(values) => write!(f, "{:?}", values),
        }
    }
}

/// Options for [`CircuitFile::open_with`](crate::CircuitFile::open_with).
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// SONATA population to select. Ignored by MVD2 and MVD3 files.
    pub population: Option<String>,
    /// Side table to bind right after opening.
    pub combo_table: Option<PathBuf>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn population(mut self, population: impl Into<String>) -> Self {
        self.population = Some(population.into());
        self
    }

    pub fn combo_table(mut self, path: impl Into<PathBuf>) -> Self {
        self.combo_table = Some(path.into());
        self
    }
}
