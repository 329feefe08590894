//! Cell selection and the shape of selected values.
//!
//! Every accessor in this crate takes a [`Selector`] and returns a
//! [`Selected`] value. The shape is part of the contract:
//!
//! | Selector              | Result                         |
//! |-----------------------|--------------------------------|
//! | `All`                 | `Many`, `len` values           |
//! | `Offset { o, 0 }`     | `Many`, values `o..len`        |
//! | `Offset { o, c }`     | `Many`, at most `c` values     |
//! | `Single(i)`           | `One`                          |
//! | `Indices(list)`       | `Many`, in list order          |

use super::error::{MvdError, Result};

/// Which cells an accessor should return.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selector {
    /// Every cell.
    #[default]
    All,
    /// `count` cells starting at `offset`. A count of 0 selects the remainder.
    Offset { offset: usize, count: usize },
    /// Exactly one cell, returned as a single value.
    Single(usize),
    /// Arbitrary cells in the given order. Duplicates are allowed.
    Indices(Vec<usize>),
}

impl Selector {
    pub fn all() -> Self {
        Self::All
    }

    pub fn range(offset: usize, count: usize) -> Self {
        Self::Offset { offset, count }
    }

    pub fn single(index: usize) -> Self {
        Self::Single(index)
    }

    pub fn indices(indices: impl Into<Vec<usize>>) -> Self {
        Self::Indices(indices.into())
    }

    /// Resolves this selector against a column of `len` rows.
    ///
    /// Offsets are clipped to the available rows. Single and list selections
    /// fail with [`MvdError::IndexOutOfRange`] when they leave `[0, len)`.
    pub fn plan(&self, len: usize) -> Result<ReadPlan> {
        match self {
            Selector::All => Ok(ReadPlan::Span { start: 0, count: len }),
            Selector::Offset { offset, count } => {
                let start = (*offset).min(len);
                let available = len - start;
                let count = if *count == 0 { available } else { (*count).min(available) };
                Ok(ReadPlan::Span { start, count })
            }
            Selector::Single(index) => {
                check_index(*index, len)?;
                Ok(ReadPlan::One(*index))
            }
            Selector::Indices(indices) => {
                for &index in indices {
                    check_index(index, len)?;
                }
                Ok(ReadPlan::Gather(indices.clone()))
            }
        }
    }
}

fn check_index(index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(MvdError::IndexOutOfRange { index, len });
    }
    Ok(())
}

impl From<usize> for Selector {
    fn from(index: usize) -> Self {
        Self::Single(index)
    }
}

impl From<Vec<usize>> for Selector {
    fn from(indices: Vec<usize>) -> Self {
        Self::Indices(indices)
    }
}

/// A validated selection, expressed in rows of the underlying column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPlan {
    /// A contiguous block of rows.
    Span { start: usize, count: usize },
    /// One row, to be returned unwrapped.
    One(usize),
    /// Rows in caller order; all are known to be in range.
    Gather(Vec<usize>),
}

impl ReadPlan {
    /// Number of values this plan produces.
    pub fn count(&self) -> usize {
        match self {
            ReadPlan::Span { count, .. } => *count,
            ReadPlan::One(_) => 1,
            ReadPlan::Gather(rows) => rows.len(),
        }
    }

    /// Wraps values read for this plan in the matching result shape.
    pub fn finish<T>(&self, values: Vec<T>) -> Result<Selected<T>> {
        if values.len() != self.count() {
            return Err(MvdError::InvalidFormat(format!(
                "Read produced {} values, expected {}",
                values.len(),
                self.count()
            )));
        }
        match self {
            ReadPlan::One(_) => values
                .into_iter()
                .next()
                .map(Selected::One)
                .ok_or_else(|| MvdError::InvalidFormat("Empty read for single cell".to_string())),
            _ => Ok(Selected::Many(values)),
        }
    }
}

/// Values returned by an accessor: one value for [`Selector::Single`],
/// a sequence for every other selector.
#[derive(Debug, Clone, PartialEq)]
pub enum Selected<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Selected<T> {
    pub fn len(&self) -> usize {
        match self {
            Selected::One(_) => 1,
            Selected::Many(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the single value, or `None` for a sequence.
    pub fn one(self) -> Option<T> {
        match self {
            Selected::One(value) => Some(value),
            Selected::Many(_) => None,
        }
    }

    /// Returns the sequence, or `None` for a single value.
    pub fn many(self) -> Option<Vec<T>> {
        match self {
            Selected::One(_) => None,
            Selected::Many(values) => Some(values),
        }
    }

    /// Flattens either shape into a vector.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Selected::One(value) => vec![value],
            Selected::Many(values) => values,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Selected<U> {
        match self {
            Selected::One(value) => Selected::One(f(value)),
            Selected::Many(values) => Selected::Many(values.into_iter().map(f).collect()),
        }
    }

    /// Like [`Selected::map`], stopping at the first error.
    pub fn try_map<U>(self, mut f: impl FnMut(T) -> Result<U>) -> Result<Selected<U>> {
        match self {
            Selected::One(value) => Ok(Selected::One(f(value)?)),
            Selected::Many(values) => Ok(Selected::Many(
                values.into_iter().map(f).collect::<Result<Vec<U>>>()?,
            )),
        }
    }
}
