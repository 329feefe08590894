//! Typed per-cell columns over a [`Container`](crate::mvd::container::Container).
//!
//! Two storage models cover every attribute:
//!
//! - [`EnumeratedColumn`]: integer indices into a library of distinct strings
//! - [`ScalarColumn`]: dense values, possibly several per cell
//!
//! [`Column`] tags the two, and [`AttributeCatalog`] maps attribute names to
//! the columns discovered when a file is opened.

pub mod catalog;
pub mod enumerated;
pub mod scalar;

pub use catalog::AttributeCatalog;
pub use enumerated::EnumeratedColumn;
pub use scalar::{ScalarColumn, ScalarSource};

use crate::mvd::types::error::{MvdError, Result};
use crate::mvd::types::models::{AttributeKind, Value};
use crate::mvd::types::selection::{Selected, Selector};

#[derive(Debug, Clone)]
pub enum Column {
    Enumerated(EnumeratedColumn),
    Scalar(ScalarColumn),
}

impl Column {
    pub fn name(&self) -> &str {
        match self {
            Column::Enumerated(column) => column.name(),
            Column::Scalar(column) => column.name(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Enumerated(column) => column.len(),
            Column::Scalar(column) => column.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> AttributeKind {
        match self {
            Column::Enumerated(_) => AttributeKind::Enumerated,
            Column::Scalar(column) => AttributeKind::Scalar {
                dtype: column.dtype(),
                width: column.width(),
            },
        }
    }

    /// Type-erased values. Enumerated attributes yield resolved strings.
    pub fn values(&self, selector: &Selector) -> Result<Selected<Value>> {
        match self {
            Column::Enumerated(column) => Ok(column.resolve(selector)?.map(Value::Text)),
            Column::Scalar(column) => column.values(selector),
        }
    }

    /// String values, for attributes that may be stored either enumerated or
    /// as a plain column.
    pub fn texts(&self, selector: &Selector) -> Result<Selected<String>> {
        match self {
            Column::Enumerated(column) => column.resolve(selector),
            Column::Scalar(column) => column.texts(selector),
        }
    }

    pub fn floats(&self, selector: &Selector) -> Result<Selected<f64>> {
        match self {
            Column::Enumerated(column) => Err(MvdError::TypeMismatch {
                name: column.name().to_string(),
                expected: "float",
            }),
            Column::Scalar(column) => column.floats(selector),
        }
    }

    /// Stored library indices.
    ///
    /// # Errors
    /// `NotEnumerated` for plain columns.
    pub fn raw(&self, selector: &Selector) -> Result<Selected<u64>> {
        match self {
            Column::Enumerated(column) => column.raw(selector),
            Column::Scalar(column) => Err(MvdError::NotEnumerated(column.name().to_string())),
        }
    }

    /// The library of an enumerated attribute. For a plain text (or integer)
    /// column, its distinct values in first-occurrence order, which reads the
    /// whole column.
    pub fn library(&self) -> Result<Vec<String>> {
        match self {
            Column::Enumerated(column) => Ok(column.library().to_vec()),
            Column::Scalar(column) => column.distinct_texts(),
        }
    }
}
