//! Hierarchical dataset storage underneath the circuit readers.
//!
//! Circuit files are trees of named datasets (`cells/positions`,
//! `nodes/default/0/x`, ...). The readers only need three primitives from
//! such a tree, captured by the [`Container`] trait:
//!
//! - describe a dataset (element type, rows, row width)
//! - list the children of a group
//! - read a contiguous block of rows
//!
//! # Implementations
//!
//! - [`memory`]: datasets held in memory (legacy files, tests, conversion)
//! - [`file`]: a seekable single-file container; reads touch only the
//!   requested rows
//! - [`writer`]: serializes a [`MemoryContainer`] to the file format

use std::fmt;
use std::ops::Range;

use log::trace;

use crate::mvd::types::error::{MvdError, Result};
use crate::mvd::types::models::DataType;
use crate::mvd::types::selection::ReadPlan;

pub mod file;
pub mod memory;
pub mod writer;

pub use file::FileContainer;
pub use memory::MemoryContainer;
pub use writer::ContainerWriter;

/// Requested rows with at most this many unrequested rows between them are
/// served by the same read.
///
/// A gather therefore reads up to `GATHER_GAP` unrequested rows between two
/// requested ones, and never past the first or last requested row. Those
/// extra rows are decoded and dropped; each run saves a seek and a lock.
const GATHER_GAP: usize = 16;

/// Read access to a tree of datasets.
///
/// Paths are `/`-separated; leading and trailing separators are ignored.
pub trait Container: fmt::Debug + Send + Sync {
    /// Shape and type of the dataset at `path`, if there is one.
    fn dataset(&self, path: &str) -> Option<DatasetInfo>;

    /// Sorted names of the direct children (groups and datasets) of `group`.
    fn children(&self, group: &str) -> Vec<String>;

    /// Reads rows `rows` of the dataset at `path`, flattened row-major.
    fn read_rows(&self, path: &str, rows: Range<usize>) -> Result<ColumnData>;

    /// Whether `path` names a dataset or a non-empty group.
    fn contains(&self, path: &str) -> bool {
        self.dataset(path).is_some() || !self.children(path).is_empty()
    }
}

/// Shape and element type of a stored dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetInfo {
    pub dtype: DataType,
    pub rows: usize,
    /// Number of values per row. 1 for plain per-cell columns.
    pub width: usize,
}

/// Flat, row-major values read from a dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnData {
    pub fn empty(dtype: DataType) -> Self {
        match dtype {
            DataType::Int => ColumnData::Int(Vec::new()),
            DataType::Float => ColumnData::Float(Vec::new()),
            DataType::Text => ColumnData::Text(Vec::new()),
        }
    }

    pub fn dtype(&self) -> DataType {
        match self {
            ColumnData::Int(_) => DataType::Int,
            ColumnData::Float(_) => DataType::Float,
            ColumnData::Text(_) => DataType::Text,
        }
    }

    /// Number of stored values (rows times width).
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int(values) => values.len(),
            ColumnData::Float(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `other`, which must hold the same element type.
    pub fn append(&mut self, other: ColumnData) -> Result<()> {
        match (self, other) {
            (ColumnData::Int(a), ColumnData::Int(b)) => a.extend(b),
            (ColumnData::Float(a), ColumnData::Float(b)) => a.extend(b),
            (ColumnData::Text(a), ColumnData::Text(b)) => a.extend(b),
            (this, other) => {
                return Err(MvdError::InvalidFormat(format!(
                    "Cannot append {} values to a {} column",
                    other.dtype(),
                    this.dtype()
                )));
            }
        }
        Ok(())
    }

    /// Copies rows `rows` (each `width` values wide).
    pub fn slice_rows(&self, rows: Range<usize>, width: usize) -> ColumnData {
        let span = rows.start * width..rows.end * width;
        match self {
            ColumnData::Int(values) => ColumnData::Int(values[span].to_vec()),
            ColumnData::Float(values) => ColumnData::Float(values[span].to_vec()),
            ColumnData::Text(values) => ColumnData::Text(values[span].to_vec()),
        }
    }

    /// Copies the given rows, in the given order.
    pub fn pick_rows(&self, rows: &[usize], width: usize) -> ColumnData {
        fn pick<T: Clone>(values: &[T], rows: &[usize], width: usize) -> Vec<T> {
            let mut out = Vec::with_capacity(rows.len() * width);
            for &row in rows {
                out.extend_from_slice(&values[row * width..(row + 1) * width]);
            }
            out
        }
        match self {
            ColumnData::Int(values) => ColumnData::Int(pick(values, rows, width)),
            ColumnData::Float(values) => ColumnData::Float(pick(values, rows, width)),
            ColumnData::Text(values) => ColumnData::Text(pick(values, rows, width)),
        }
    }

    /// Numeric values as `f64`; integers are widened.
    pub fn into_floats(self, name: &str) -> Result<Vec<f64>> {
        match self {
            ColumnData::Float(values) => Ok(values),
            ColumnData::Int(values) => Ok(values.into_iter().map(|v| v as f64).collect()),
            ColumnData::Text(_) => Err(MvdError::TypeMismatch {
                name: name.to_string(),
                expected: "float",
            }),
        }
    }

    pub fn into_ints(self, name: &str) -> Result<Vec<i64>> {
        match self {
            ColumnData::Int(values) => Ok(values),
            _ => Err(MvdError::TypeMismatch {
                name: name.to_string(),
                expected: "int",
            }),
        }
    }

    pub fn into_texts(self, name: &str) -> Result<Vec<String>> {
        match self {
            ColumnData::Text(values) => Ok(values),
            _ => Err(MvdError::TypeMismatch {
                name: name.to_string(),
                expected: "text",
            }),
        }
    }
}

/// A dataset held in memory: flat values plus the row width.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub data: ColumnData,
    pub width: usize,
}

impl Dataset {
    pub fn ints(values: Vec<i64>) -> Self {
        Self { data: ColumnData::Int(values), width: 1 }
    }

    pub fn floats(values: Vec<f64>) -> Self {
        Self { data: ColumnData::Float(values), width: 1 }
    }

    pub fn texts<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self {
            data: ColumnData::Text(values.into_iter().map(Into::into).collect()),
            width: 1,
        }
    }

    /// Fixed-width float rows, e.g. `[x, y, z]` positions.
    pub fn rows<const W: usize>(rows: &[[f64; W]]) -> Self {
        Self {
            data: ColumnData::Float(rows.iter().flatten().copied().collect()),
            width: W,
        }
    }

    pub fn rows_len(&self) -> usize {
        if self.width == 0 { 0 } else { self.data.len() / self.width }
    }

    pub fn info(&self) -> DatasetInfo {
        DatasetInfo {
            dtype: self.data.dtype(),
            rows: self.rows_len(),
            width: self.width,
        }
    }
}

/// Strips leading and trailing separators.
pub fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

/// Joins a group path and a child name.
pub fn join(group: &str, name: &str) -> String {
    let group = normalize(group);
    if group.is_empty() {
        normalize(name).to_string()
    } else {
        format!("{}/{}", group, normalize(name))
    }
}

/// Direct children of `group` among a set of dataset paths.
pub(crate) fn child_names<'a>(paths: impl Iterator<Item = &'a String>, group: &str) -> Vec<String> {
    let group = normalize(group);
    let mut names: Vec<String> = paths
        .filter_map(|path| {
            let rest = if group.is_empty() {
                path.as_str()
            } else {
                path.strip_prefix(group)?.strip_prefix('/')?
            };
            rest.split('/').next().filter(|name| !name.is_empty()).map(str::to_string)
        })
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Reads the rows described by `plan`, in plan order.
///
/// List selections are served by reading coalesced runs of the requested
/// rows (see [`GATHER_GAP`]), so the cost follows the selection size rather
/// than the column size.
pub fn read_plan(store: &dyn Container, path: &str, plan: &ReadPlan) -> Result<ColumnData> {
    let info = store
        .dataset(path)
        .ok_or_else(|| MvdError::AttributeNotFound(path.to_string()))?;
    match plan {
        ReadPlan::Span { count: 0, .. } => Ok(ColumnData::empty(info.dtype)),
        ReadPlan::Span { start, count } => store.read_rows(path, *start..start + count),
        ReadPlan::One(row) => store.read_rows(path, *row..row + 1),
        ReadPlan::Gather(rows) => gather(store, path, &info, rows),
    }
}

fn gather(store: &dyn Container, path: &str, info: &DatasetInfo, rows: &[usize]) -> Result<ColumnData> {
    if rows.is_empty() {
        return Ok(ColumnData::empty(info.dtype));
    }

    let mut sorted = rows.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut runs: Vec<Range<usize>> = Vec::new();
    for row in sorted {
        match runs.last_mut() {
            Some(run) if row <= run.end + GATHER_GAP => run.end = row + 1,
            _ => runs.push(row..row + 1),
        }
    }
    trace!("Gathering {} rows of '{}' in {} reads", rows.len(), path, runs.len());

    // (first row of the run, position of that row in `buffer`)
    let mut run_starts = Vec::with_capacity(runs.len());
    let mut buffer = ColumnData::empty(info.dtype);
    let mut buffered = 0;
    for run in runs {
        run_starts.push((run.start, buffered));
        buffered += run.len();
        buffer.append(store.read_rows(path, run)?)?;
    }

    let positions: Vec<usize> = rows
        .iter()
        .map(|&row| {
            let run = run_starts.partition_point(|(start, _)| *start <= row) - 1;
            let (start, offset) = run_starts[run];
            offset + (row - start)
        })
        .collect();
    Ok(buffer.pick_rows(&positions, info.width))
}
