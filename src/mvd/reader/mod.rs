//! Opened circuit files.
//!
//! [`CircuitFile`] is the entry point: it detects the format, builds the
//! matching backend and serves every per-cell query through a [`Selector`].
//! Backends implement [`CircuitBackend`]; the set of backends is closed and
//! held in [`Backend`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};

use crate::mvd::column::{AttributeCatalog, ScalarColumn};
use crate::mvd::combo::{ComboRow, ComboTable, KeyColumn};
use crate::mvd::container::Container;
use crate::mvd::format::{self, Sniffed};
use crate::mvd::types::error::{MvdError, Result};
use crate::mvd::types::models::{AttributeKind, CircuitFormat, OpenOptions, Value};
use crate::mvd::types::selection::{Selected, Selector};

pub mod columnar;
pub mod sonata;

pub use columnar::ColumnarReader;
pub use sonata::SonataReader;

/// Attribute holding each cell's combo key.
pub const COMBO_KEY: &str = "me_combo";

/// How each cell's side-table key is obtained, chosen when a table is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComboKeySource {
    /// The stored `me_combo` attribute.
    Stored,
    /// `<etype>_<layer>_<morphology>`, matched against combo names.
    Composite,
    /// The stored emodel (`model_template` without its prefix), matched
    /// against the table's emodel column.
    Emodel,
}

impl ComboKeySource {
    pub fn column(self) -> KeyColumn {
        match self {
            ComboKeySource::Stored | ComboKeySource::Composite => KeyColumn::ComboName,
            ComboKeySource::Emodel => KeyColumn::Emodel,
        }
    }
}

/// A side table together with the key source chosen when it was bound.
#[derive(Debug)]
struct BoundTable {
    table: ComboTable,
    source: ComboKeySource,
}

/// What every circuit backend provides.
pub trait CircuitBackend: fmt::Debug + Send + Sync {
    fn format(&self) -> CircuitFormat;

    /// Number of cells, fixed at open.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-cell attributes discovered at open.
    fn attributes(&self) -> &AttributeCatalog;

    /// Three values per cell.
    fn positions(&self) -> &ScalarColumn;

    /// `(x, y, z, w)` quaternions, if the file stores orientations.
    fn orientations(&self) -> Option<&ScalarColumn>;

    /// Emodel names as stored in the file itself.
    fn stored_emodels(&self, selector: &Selector) -> Result<Selected<String>>;

    /// Name of the selected population, for formats that have them.
    fn population(&self) -> Option<&str> {
        None
    }

    /// Seeds for random initialization of the circuit.
    fn circuit_seeds(&self) -> Result<Vec<f64>>;
}

/// The backend of an opened file, one variant per format.
#[derive(Debug)]
pub enum Backend {
    Mvd2(ColumnarReader),
    Mvd3(ColumnarReader),
    Sonata(SonataReader),
}

impl Backend {
    pub fn as_backend(&self) -> &dyn CircuitBackend {
        match self {
            Backend::Mvd2(reader) | Backend::Mvd3(reader) => reader,
            Backend::Sonata(reader) => reader,
        }
    }
}

/// A circuit file opened for reading.
///
/// Immutable after open, apart from binding a [`ComboTable`].
#[derive(Debug)]
pub struct CircuitFile {
    path: Option<PathBuf>,
    backend: Backend,
    combo: Option<BoundTable>,
}

impl CircuitFile {
    /// Opens a circuit file of any supported format.
    ///
    /// `population` selects a SONATA population and is ignored by MVD2 and
    /// MVD3 files.
    ///
    /// # Errors
    /// - `UnrecognizedFormat` if the file matches no known layout
    /// - `PopulationNotFound` / `AmbiguousPopulation` for SONATA files
    /// - I/O and format errors from the backend
    pub fn open(path: impl AsRef<Path>, population: Option<&str>) -> Result<Self> {
        let options = OpenOptions {
            population: population.map(str::to_string),
            combo_table: None,
        };
        Self::open_with(path, &options)
    }

    /// Opens a circuit file and applies `options`.
    pub fn open_with(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening circuit file: {}", path.display());
        let sniffed = format::sniff(path)?
            .ok_or_else(|| MvdError::UnrecognizedFormat(path.to_path_buf()))?;

        let backend = match sniffed {
            Sniffed::Legacy => {
                log_ignored_population(CircuitFormat::Mvd2, options);
                Backend::Mvd2(ColumnarReader::open_legacy(path)?)
            }
            Sniffed::Container(format, store) => backend_for(format, Arc::new(store), options)?,
        };

        let mut file = Self {
            path: Some(path.to_path_buf()),
            backend,
            combo: None,
        };
        if let Some(table) = &options.combo_table {
            file.bind_combo_table(ComboTable::open(table)?)?;
        }
        Ok(file)
    }

    /// Serves an already opened container, classified by its top-level
    /// groups.
    pub fn from_container(store: Arc<dyn Container>, options: &OpenOptions) -> Result<Self> {
        let format = format::classify(store.as_ref())
            .ok_or_else(|| MvdError::InvalidFormat("Container holds no circuit".to_string()))?;
        let mut file = Self {
            path: None,
            backend: backend_for(format, store, options)?,
            combo: None,
        };
        if let Some(table) = &options.combo_table {
            file.bind_combo_table(ComboTable::open(table)?)?;
        }
        Ok(file)
    }

    /// Path the file was opened from, if it came from disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    fn inner(&self) -> &dyn CircuitBackend {
        self.backend.as_backend()
    }

    pub fn format(&self) -> CircuitFormat {
        self.inner().format()
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.inner().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner().is_empty()
    }

    /// Selected SONATA population; `None` for MVD2 and MVD3 files.
    pub fn population(&self) -> Option<&str> {
        self.inner().population()
    }

    pub fn circuit_seeds(&self) -> Result<Vec<f64>> {
        self.inner().circuit_seeds()
    }

    // Geometry

    pub fn positions(&self, selector: &Selector) -> Result<Selected<[f64; 3]>> {
        self.inner().positions().rows::<3>(selector)
    }

    pub fn has_orientations(&self) -> bool {
        self.inner().orientations().is_some()
    }

    /// `(x, y, z, w)` quaternions.
    ///
    /// # Errors
    /// `AttributeNotFound` if the file stores no orientations.
    pub fn orientations(&self, selector: &Selector) -> Result<Selected<[f64; 4]>> {
        self.inner()
            .orientations()
            .ok_or_else(|| MvdError::AttributeNotFound("orientations".to_string()))?
            .rows::<4>(selector)
    }

    // Categorical attributes

    fn texts(&self, name: &str, selector: &Selector) -> Result<Selected<String>> {
        self.inner().attributes().require(name)?.texts(selector)
    }

    pub fn morphologies(&self, selector: &Selector) -> Result<Selected<String>> {
        self.texts("morphology", selector)
    }

    pub fn etypes(&self, selector: &Selector) -> Result<Selected<String>> {
        self.texts("etype", selector)
    }

    pub fn mtypes(&self, selector: &Selector) -> Result<Selected<String>> {
        self.texts("mtype", selector)
    }

    pub fn regions(&self, selector: &Selector) -> Result<Selected<String>> {
        self.texts("region", selector)
    }

    pub fn synapse_classes(&self, selector: &Selector) -> Result<Selected<String>> {
        self.texts("synapse_class", selector)
    }

    /// Stored combo keys. Not affected by a bound side table.
    pub fn me_combos(&self, selector: &Selector) -> Result<Selected<String>> {
        self.texts(COMBO_KEY, selector)
    }

    pub fn raw_morphologies(&self, selector: &Selector) -> Result<Selected<u64>> {
        self.raw("morphology", selector)
    }

    pub fn raw_etypes(&self, selector: &Selector) -> Result<Selected<u64>> {
        self.raw("etype", selector)
    }

    pub fn raw_mtypes(&self, selector: &Selector) -> Result<Selected<u64>> {
        self.raw("mtype", selector)
    }

    pub fn raw_regions(&self, selector: &Selector) -> Result<Selected<u64>> {
        self.raw("region", selector)
    }

    pub fn raw_synapse_classes(&self, selector: &Selector) -> Result<Selected<u64>> {
        self.raw("synapse_class", selector)
    }

    pub fn morphology_library(&self) -> Result<Vec<String>> {
        self.library("morphology")
    }

    pub fn etype_library(&self) -> Result<Vec<String>> {
        self.library("etype")
    }

    pub fn mtype_library(&self) -> Result<Vec<String>> {
        self.library("mtype")
    }

    pub fn region_library(&self) -> Result<Vec<String>> {
        self.library("region")
    }

    pub fn synapse_class_library(&self) -> Result<Vec<String>> {
        self.library("synapse_class")
    }

    // Combo-derived attributes

    /// Layers from the bound side table, else from the file's `layer`
    /// attribute. Integer layers are formatted in decimal.
    pub fn layers(&self, selector: &Selector) -> Result<Selected<String>> {
        match &self.combo {
            Some(bound) => self.join(bound, selector, |row| row.layer.clone()),
            None => self.texts("layer", selector),
        }
    }

    /// Emodels from the bound side table, else as stored in the file.
    pub fn emodels(&self, selector: &Selector) -> Result<Selected<String>> {
        match &self.combo {
            Some(bound) => self.join(bound, selector, |row| row.emodel.clone()),
            None => self.inner().stored_emodels(selector),
        }
    }

    pub fn threshold_currents(&self, selector: &Selector) -> Result<Selected<f64>> {
        match &self.combo {
            Some(bound) => self.join(bound, selector, |row| row.threshold_current),
            None => self.floats("threshold_current", selector),
        }
    }

    pub fn holding_currents(&self, selector: &Selector) -> Result<Selected<f64>> {
        match &self.combo {
            Some(bound) => self.join(bound, selector, |row| row.holding_current),
            None => self.floats("holding_current", selector),
        }
    }

    /// Whether threshold and holding currents can be read.
    pub fn has_currents(&self) -> bool {
        self.combo.is_some()
            || (self.has_attribute("threshold_current") && self.has_attribute("holding_current"))
    }

    // Mini frequencies

    pub fn exc_mini_frequencies(&self, selector: &Selector) -> Result<Selected<f64>> {
        self.floats("exc_mini_frequency", selector)
    }

    pub fn inh_mini_frequencies(&self, selector: &Selector) -> Result<Selected<f64>> {
        self.floats("inh_mini_frequency", selector)
    }

    pub fn has_mini_frequencies(&self) -> bool {
        self.has_attribute("exc_mini_frequency") && self.has_attribute("inh_mini_frequency")
    }

    fn floats(&self, name: &str, selector: &Selector) -> Result<Selected<f64>> {
        self.inner().attributes().require(name)?.floats(selector)
    }

    // Generic access

    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner().attributes().contains(name)
    }

    /// Names of all per-cell attributes, sorted.
    pub fn attribute_names(&self) -> Vec<String> {
        self.inner().attributes().names().map(str::to_string).collect()
    }

    pub fn attribute_kind(&self, name: &str) -> Option<AttributeKind> {
        self.inner().attributes().get(name).map(|column| column.kind())
    }

    /// Values of any attribute. Enumerated attributes are resolved to their
    /// library strings.
    pub fn attribute(&self, name: &str, selector: &Selector) -> Result<Selected<Value>> {
        self.inner().attributes().require(name)?.values(selector)
    }

    /// Library indices of an enumerated attribute.
    ///
    /// # Errors
    /// `NotEnumerated` if `name` is stored as a plain column.
    pub fn raw(&self, name: &str, selector: &Selector) -> Result<Selected<u64>> {
        self.inner().attributes().require(name)?.raw(selector)
    }

    /// Library of an enumerated attribute in on-file order. For a plain
    /// string column, its distinct values in first-occurrence order; this
    /// reads the whole column.
    pub fn library(&self, name: &str) -> Result<Vec<String>> {
        self.inner().attributes().require(name)?.library()
    }

    // Side table

    /// Binds a side table. From then on layers, emodels and currents are
    /// looked up by each cell's key, taken from the first source the file
    /// supports:
    ///
    /// 1. the stored `me_combo`
    /// 2. `<etype>_<layer>_<morphology>`, when all three are stored
    /// 3. the stored emodel, matched against the table's emodel column
    ///
    /// # Errors
    /// `AttributeNotFound` (naming `me_combo`) if the file supports none.
    pub fn bind_combo_table(&mut self, table: ComboTable) -> Result<()> {
        let source = self
            .available_key_source()
            .ok_or_else(|| MvdError::AttributeNotFound(COMBO_KEY.to_string()))?;
        debug!("Bound combo table with {} rows, keyed by {:?}", table.len(), source);
        self.combo = Some(BoundTable { table, source });
        Ok(())
    }

    fn available_key_source(&self) -> Option<ComboKeySource> {
        if self.has_attribute(COMBO_KEY) {
            Some(ComboKeySource::Stored)
        } else if ["etype", "layer", "morphology"].iter().all(|name| self.has_attribute(name)) {
            Some(ComboKeySource::Composite)
        } else if self.has_attribute("model_template") || self.has_attribute("emodel") {
            Some(ComboKeySource::Emodel)
        } else {
            None
        }
    }

    pub fn combo_table(&self) -> Option<&ComboTable> {
        self.combo.as_ref().map(|bound| &bound.table)
    }

    /// Key source of the bound side table.
    pub fn combo_key_source(&self) -> Option<ComboKeySource> {
        self.combo.as_ref().map(|bound| bound.source)
    }

    /// Unbinds and returns the side table.
    pub fn take_combo_table(&mut self) -> Option<ComboTable> {
        self.combo.take().map(|bound| bound.table)
    }

    /// Side-table keys of the selected cells.
    ///
    /// # Errors
    /// `AttributeNotFound` if no table is bound.
    pub fn combo_keys(&self, selector: &Selector) -> Result<Selected<String>> {
        let bound = self
            .combo
            .as_ref()
            .ok_or_else(|| MvdError::AttributeNotFound("combo table".to_string()))?;
        self.keys_from(bound.source, selector)
    }

    fn keys_from(&self, source: ComboKeySource, selector: &Selector) -> Result<Selected<String>> {
        match source {
            ComboKeySource::Stored => self.me_combos(selector),
            ComboKeySource::Composite => {
                let etypes = self.texts("etype", selector)?.into_vec();
                let layers = self.texts("layer", selector)?.into_vec();
                let morphologies = self.texts("morphology", selector)?.into_vec();
                let keys = etypes
                    .into_iter()
                    .zip(layers)
                    .zip(morphologies)
                    .map(|((etype, layer), morphology)| format!("{}_{}_{}", etype, layer, morphology))
                    .collect();
                selector.plan(self.len())?.finish(keys)
            }
            ComboKeySource::Emodel => self.inner().stored_emodels(selector),
        }
    }

    fn join<T>(
        &self,
        bound: &BoundTable,
        selector: &Selector,
        field: impl Fn(&ComboRow) -> T,
    ) -> Result<Selected<T>> {
        let column = bound.source.column();
        self.keys_from(bound.source, selector)?
            .try_map(|key| bound.table.resolve_by(column, &key).map(&field))
    }
}

fn backend_for(format: CircuitFormat, store: Arc<dyn Container>, options: &OpenOptions) -> Result<Backend> {
    match format {
        CircuitFormat::Mvd3 => {
            log_ignored_population(format, options);
            Ok(Backend::Mvd3(ColumnarReader::from_container(store, format)?))
        }
        CircuitFormat::Sonata => Ok(Backend::Sonata(SonataReader::from_container(
            store,
            options.population.as_deref(),
        )?)),
        CircuitFormat::Mvd2 => Err(MvdError::InvalidFormat(
            "MVD2 files are text, not containers".to_string(),
        )),
    }
}

fn log_ignored_population(format: CircuitFormat, options: &OpenOptions) {
    if let Some(population) = &options.population {
        debug!("{} files have no populations, ignoring '{}'", format, population);
    }
}
