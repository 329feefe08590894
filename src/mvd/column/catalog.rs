use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, trace, warn};

use super::{Column, EnumeratedColumn, ScalarColumn};
use crate::mvd::container::{Container, join};
use crate::mvd::types::error::{MvdError, Result};
use crate::mvd::types::models::DataType;

/// Attribute name to column mapping, built once per opened file.
#[derive(Debug, Clone, Default)]
pub struct AttributeCatalog {
    columns: BTreeMap<String, Column>,
}

impl AttributeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every per-cell dataset directly under `group`.
    ///
    /// An integer dataset with a same-named dataset under `library_group`
    /// becomes an [`EnumeratedColumn`]; everything else a [`ScalarColumn`].
    /// Subgroups are skipped, as are datasets whose row count differs from
    /// `len`.
    pub fn discover(
        store: &Arc<dyn Container>,
        group: &str,
        library_group: Option<&str>,
        len: usize,
    ) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.extend_from(store, group, library_group, len)?;
        Ok(catalog)
    }

    /// Adds the datasets of `group` without replacing names already present.
    ///
    /// Returns how many columns were added.
    pub fn extend_from(
        &mut self,
        store: &Arc<dyn Container>,
        group: &str,
        library_group: Option<&str>,
        len: usize,
    ) -> Result<usize> {
        let mut added = 0;
        for name in store.children(group) {
            let path = join(group, &name);
            let Some(info) = store.dataset(&path) else {
                trace!("Skipping subgroup '{}'", path);
                continue;
            };
            if self.columns.contains_key(&name) {
                debug!("Attribute '{}' already registered, ignoring '{}'", name, path);
                continue;
            }
            if info.rows != len {
                warn!(
                    "Dataset '{}' has {} rows but the file has {} cells, ignoring it",
                    path, info.rows, len
                );
                continue;
            }

            let library_path = library_group
                .map(|library| join(library, &name))
                .filter(|library| store.dataset(library).is_some());
            let column = match library_path {
                Some(library_path) if info.dtype == DataType::Int => Column::Enumerated(
                    EnumeratedColumn::open(store.clone(), &name, &path, &library_path, len)?,
                ),
                _ => Column::Scalar(ScalarColumn::dataset(store.clone(), &name, &path, len)?),
            };
            trace!("Registered attribute '{}' as {:?}", name, column.kind());
            self.columns.insert(name, column);
            added += 1;
        }
        Ok(added)
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Like [`AttributeCatalog::get`], failing with `AttributeNotFound`.
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.get(name)
            .ok_or_else(|| MvdError::AttributeNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Attribute names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
