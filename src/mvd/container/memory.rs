//! In-memory container.

use std::collections::BTreeMap;
use std::ops::Range;

use super::{Container, ColumnData, Dataset, DatasetInfo, child_names, normalize};
use crate::mvd::types::error::{MvdError, Result};

/// Datasets kept in memory, keyed by normalized path.
///
/// Used for legacy files (parsed whole at open), for conversion, and as a
/// test double for file-backed containers.
#[derive(Debug, Default, Clone)]
pub struct MemoryContainer {
    datasets: BTreeMap<String, Dataset>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `dataset` at `path`, replacing any previous dataset there.
    pub fn insert(&mut self, path: &str, dataset: Dataset) -> &mut Self {
        self.datasets.insert(normalize(path).to_string(), dataset);
        self
    }

    pub fn get(&self, path: &str) -> Option<&Dataset> {
        self.datasets.get(normalize(path))
    }

    /// All datasets in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Dataset)> {
        self.datasets.iter().map(|(path, dataset)| (path.as_str(), dataset))
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

impl Container for MemoryContainer {
    fn dataset(&self, path: &str) -> Option<DatasetInfo> {
        self.get(path).map(Dataset::info)
    }

    fn children(&self, group: &str) -> Vec<String> {
        child_names(self.datasets.keys(), group)
    }

    fn read_rows(&self, path: &str, rows: Range<usize>) -> Result<ColumnData> {
        let dataset = self
            .get(path)
            .ok_or_else(|| MvdError::AttributeNotFound(path.to_string()))?;
        let len = dataset.rows_len();
        if rows.start > rows.end || rows.end > len {
            return Err(MvdError::IndexOutOfRange {
                index: rows.end.saturating_sub(1).max(rows.start),
                len,
            });
        }
        Ok(dataset.data.slice_rows(rows, dataset.width))
    }
}
