use std::sync::Arc;

use log::debug;

use crate::mvd::container::{Container, read_plan};
use crate::mvd::types::error::{MvdError, Result};
use crate::mvd::types::models::DataType;
use crate::mvd::types::selection::{Selected, Selector};

/// A categorical attribute stored as per-cell indices into a library of
/// distinct strings.
///
/// The library is loaded once when the column is opened and shared between
/// clones. Index arrays are read per selection.
#[derive(Debug, Clone)]
pub struct EnumeratedColumn {
    name: String,
    store: Arc<dyn Container>,
    index_path: String,
    library: Arc<[String]>,
    len: usize,
}

impl EnumeratedColumn {
    /// Opens the index array at `index_path` and loads the library at
    /// `library_path`.
    ///
    /// # Errors
    /// - `AttributeNotFound` if either dataset is missing
    /// - `InvalidFormat` if the index array is not an integer column of
    ///   exactly `len` rows
    pub fn open(
        store: Arc<dyn Container>,
        name: &str,
        index_path: &str,
        library_path: &str,
        len: usize,
    ) -> Result<Self> {
        let info = store
            .dataset(index_path)
            .ok_or_else(|| MvdError::AttributeNotFound(index_path.to_string()))?;
        if info.dtype != DataType::Int || info.width != 1 {
            return Err(MvdError::InvalidFormat(format!(
                "Index array '{}' must be a single integer column, found {} x{}",
                index_path, info.dtype, info.width
            )));
        }
        if info.rows != len {
            return Err(MvdError::InvalidFormat(format!(
                "Index array '{}' has {} rows, expected {}",
                index_path, info.rows, len
            )));
        }

        let library_info = store
            .dataset(library_path)
            .ok_or_else(|| MvdError::AttributeNotFound(library_path.to_string()))?;
        let library = store
            .read_rows(library_path, 0..library_info.rows)?
            .into_texts(library_path)?;
        debug!("Loaded library '{}' with {} entries", name, library.len());

        Ok(Self {
            name: name.to_string(),
            store,
            index_path: index_path.to_string(),
            library: library.into(),
            len,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Distinct values in on-file order.
    pub fn library(&self) -> &[String] {
        &self.library
    }

    /// Stored indices for the selected cells.
    pub fn raw(&self, selector: &Selector) -> Result<Selected<u64>> {
        let plan = selector.plan(self.len)?;
        let indices = read_plan(self.store.as_ref(), &self.index_path, &plan)?
            .into_ints(&self.name)?
            .into_iter()
            .map(|index| {
                u64::try_from(index).map_err(|_| {
                    MvdError::InvalidFormat(format!("Negative index {} in '{}'", index, self.name))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        plan.finish(indices)
    }

    /// Library values for the selected cells.
    pub fn resolve(&self, selector: &Selector) -> Result<Selected<String>> {
        self.raw(selector)?.try_map(|index| self.lookup(index))
    }

    fn lookup(&self, index: u64) -> Result<String> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.library.get(index))
            .cloned()
            .ok_or_else(|| {
                MvdError::InvalidFormat(format!(
                    "Index {} of '{}' is outside its library of {} entries",
                    index,
                    self.name,
                    self.library.len()
                ))
            })
    }
}
