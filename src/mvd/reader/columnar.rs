//! Reader for the MVD3 columnar layout, also serving parsed MVD2 files.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info};

use super::CircuitBackend;
use crate::mvd::column::{AttributeCatalog, ScalarColumn};
use crate::mvd::container::{Container, FileContainer};
use crate::mvd::format::legacy;
use crate::mvd::types::error::{MvdError, Result};
use crate::mvd::types::models::CircuitFormat;
use crate::mvd::types::selection::{Selected, Selector};

pub const POSITIONS: &str = "cells/positions";
pub const ORIENTATIONS: &str = "cells/orientations";
pub const PROPERTIES: &str = "cells/properties";
pub const LIBRARY: &str = "library";
pub const SEEDS: &str = "circuit/seeds";

/// Cells of an MVD3-layout container.
#[derive(Debug)]
pub struct ColumnarReader {
    format: CircuitFormat,
    store: Arc<dyn Container>,
    len: usize,
    positions: ScalarColumn,
    orientations: Option<ScalarColumn>,
    attributes: AttributeCatalog,
}

impl ColumnarReader {
    /// Opens an MVD3 container file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = FileContainer::open(path)?;
        Self::from_container(Arc::new(store), CircuitFormat::Mvd3)
    }

    /// Parses an MVD2 file and serves it through the MVD3 layout.
    pub fn open_legacy(path: impl AsRef<Path>) -> Result<Self> {
        let store = legacy::to_container(path)?;
        Self::from_container(Arc::new(store), CircuitFormat::Mvd2)
    }

    /// Builds the reader over any container with the MVD3 layout. The cell
    /// count is the row count of `cells/positions`.
    pub fn from_container(store: Arc<dyn Container>, format: CircuitFormat) -> Result<Self> {
        let info = store
            .dataset(POSITIONS)
            .ok_or_else(|| MvdError::InvalidFormat(format!("Missing dataset '{}'", POSITIONS)))?;
        if info.width != 3 {
            return Err(MvdError::InvalidFormat(format!(
                "'{}' must have 3 columns, found {}",
                POSITIONS, info.width
            )));
        }
        let len = info.rows;
        let positions = ScalarColumn::dataset(store.clone(), "positions", POSITIONS, len)?;

        let orientations = match store.dataset(ORIENTATIONS) {
            Some(info) if info.width != 4 => {
                return Err(MvdError::InvalidFormat(format!(
                    "'{}' must have 4 columns, found {}",
                    ORIENTATIONS, info.width
                )));
            }
            Some(_) => Some(ScalarColumn::dataset(store.clone(), "orientations", ORIENTATIONS, len)?),
            None => {
                debug!("No '{}' dataset", ORIENTATIONS);
                None
            }
        };

        let attributes = AttributeCatalog::discover(&store, PROPERTIES, Some(LIBRARY), len)?;
        info!(
            "Opened {} circuit: {} cells, {} attributes",
            format,
            len,
            attributes.len()
        );

        Ok(Self {
            format,
            store,
            len,
            positions,
            orientations,
            attributes,
        })
    }

    /// Minimum number of values in `circuit/seeds`. MVD2 files declare three.
    fn min_seeds(&self) -> usize {
        match self.format {
            CircuitFormat::Mvd2 => 3,
            _ => 4,
        }
    }
}

impl CircuitBackend for ColumnarReader {
    fn format(&self) -> CircuitFormat {
        self.format
    }

    fn len(&self) -> usize {
        self.len
    }

    fn attributes(&self) -> &AttributeCatalog {
        &self.attributes
    }

    fn positions(&self) -> &ScalarColumn {
        &self.positions
    }

    fn orientations(&self) -> Option<&ScalarColumn> {
        self.orientations.as_ref()
    }

    fn stored_emodels(&self, selector: &Selector) -> Result<Selected<String>> {
        self.attributes.require("emodel")?.texts(selector)
    }

    fn circuit_seeds(&self) -> Result<Vec<f64>> {
        let info = self
            .store
            .dataset(SEEDS)
            .ok_or_else(|| MvdError::AttributeNotFound(SEEDS.to_string()))?;
        let seeds = self.store.read_rows(SEEDS, 0..info.rows)?.into_floats(SEEDS)?;
        if seeds.len() < self.min_seeds() {
            return Err(MvdError::InvalidFormat(format!(
                "'{}' holds {} values, at least {} are required",
                SEEDS,
                seeds.len(),
                self.min_seeds()
            )));
        }
        Ok(seeds)
    }
}
