//! External me-combo side tables.
//!
//! A side table maps a combo key to the layer, electrical model and injected
//! currents of the cells that carry that key. Two layouts are accepted:
//!
//! ```text
//! morph_name  layer  fullmtype  etype  emodel  combo_name  threshold_current  holding_current
//! <row>...
//! ```
//!
//! a header line naming a `combo_name` (or `me_combo`) column, with columns
//! then matched by name; or headerless positional rows
//! `key layer emodel [threshold_current holding_current]`. Tables without
//! current columns report currents of 0.
//!
//! Fields are separated by runs of tabs when the first line contains a tab,
//! by runs of spaces otherwise.
//!
//! Rows are keyed by combo name alone, and the first row of a key wins. A
//! key repeated under a different `morph_name` is logged at `warn!`, since
//! cells of the second morphology then receive the first row's values.
//! Rows can also be looked up by emodel ([`KeyColumn::Emodel`]), again with
//! the first row of each emodel winning.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use log::{debug, info, trace, warn};
use regex::Regex;

use crate::mvd::types::error::{MvdError, Result};

static TAB_PATTERN: OnceLock<Regex> = OnceLock::new();
static SPACE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn tab_regex() -> &'static Regex {
    TAB_PATTERN.get_or_init(|| Regex::new(r"\t+").expect("Invalid tab delimiter pattern"))
}

fn space_regex() -> &'static Regex {
    SPACE_PATTERN.get_or_init(|| Regex::new(r" +").expect("Invalid space delimiter pattern"))
}

/// Parameters joined onto every cell whose combo key matches.
#[derive(Debug, Clone, PartialEq)]
pub struct ComboRow {
    pub layer: String,
    pub emodel: String,
    pub threshold_current: f64,
    pub holding_current: f64,
}

/// Which column of the table a lookup key is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyColumn {
    ComboName,
    Emodel,
}

/// Column positions of the fields a row provides.
#[derive(Debug, Clone, Copy)]
struct Layout {
    arity: usize,
    key: usize,
    layer: usize,
    emodel: usize,
    morphology: Option<usize>,
    currents: Option<(usize, usize)>,
}

impl Layout {
    /// Builds a layout from a header line, or returns `None` if `fields` is
    /// not a header.
    fn from_header(fields: &[&str], line: usize) -> Result<Option<Self>> {
        let position = |names: &[&str]| fields.iter().position(|field| names.contains(field));
        let Some(key) = position(&["combo_name", "me_combo"]) else {
            return Ok(None);
        };
        let required = |name: &str| {
            position(&[name]).ok_or_else(|| MvdError::MalformedSideTable {
                line,
                reason: format!("header has no '{}' column", name),
            })
        };
        let currents = match (position(&["threshold_current"]), position(&["holding_current"])) {
            (Some(threshold), Some(holding)) => Some((threshold, holding)),
            (None, None) => None,
            _ => {
                return Err(MvdError::MalformedSideTable {
                    line,
                    reason: "header names only one of threshold_current and holding_current"
                        .to_string(),
                });
            }
        };
        Ok(Some(Self {
            arity: fields.len(),
            key,
            layer: required("layer")?,
            emodel: required("emodel")?,
            morphology: position(&["morph_name"]),
            currents,
        }))
    }

    /// Positional layout `key layer emodel [threshold holding]`.
    fn positional(arity: usize, line: usize) -> Result<Self> {
        let currents = match arity {
            3 => None,
            5 => Some((3, 4)),
            _ => {
                return Err(MvdError::MalformedSideTable {
                    line,
                    reason: format!("expected 3 or 5 fields in a headerless table, found {}", arity),
                });
            }
        };
        Ok(Self { arity, key: 0, layer: 1, emodel: 2, morphology: None, currents })
    }
}

/// A side table keyed by combo name.
#[derive(Debug, Clone, Default)]
pub struct ComboTable {
    rows: HashMap<String, ComboRow>,
    /// Emodel to the combo key of its first row.
    emodels: HashMap<String, String>,
}

impl ComboTable {
    /// Reads and parses the side table at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Reading combo table: {}", path.display());
        let file = File::open(path)?;
        Self::parse(BufReader::new(file), &path.display().to_string())
    }

    /// Parses a side table. `origin` only labels log messages.
    ///
    /// # Errors
    /// `MalformedSideTable` for rows whose field count differs from the
    /// first row, unparsable currents, or an unusable header.
    pub fn parse<R: BufRead>(reader: R, origin: &str) -> Result<Self> {
        let mut rows = HashMap::new();
        let mut emodels = HashMap::new();
        // Combo key to the morphology of its first row
        let mut morphologies: HashMap<String, String> = HashMap::new();
        let mut layout: Option<Layout> = None;
        let mut delimiter: Option<&'static Regex> = None;

        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            let number = number + 1;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }

            let delimiter = *delimiter.get_or_insert_with(|| {
                if line.contains('\t') { tab_regex() } else { space_regex() }
            });
            let fields: Vec<&str> = delimiter.split(line.trim()).collect();

            let layout = match layout {
                Some(layout) => layout,
                None => {
                    if let Some(header) = Layout::from_header(&fields, number)? {
                        trace!("{}: header with {} columns", origin, header.arity);
                        layout = Some(header);
                        continue;
                    }
                    *layout.insert(Layout::positional(fields.len(), number)?)
                }
            };

            if fields.len() != layout.arity {
                return Err(MvdError::MalformedSideTable {
                    line: number,
                    reason: format!("expected {} fields, found {}", layout.arity, fields.len()),
                });
            }

            let (threshold_current, holding_current) = match layout.currents {
                Some((threshold, holding)) => (
                    parse_current(fields[threshold], number)?,
                    parse_current(fields[holding], number)?,
                ),
                None => (0.0, 0.0),
            };
            let key = fields[layout.key];
            let morphology = layout.morphology.map(|column| fields[column]);
            if rows.contains_key(key) {
                match (morphologies.get(key), morphology) {
                    (Some(first), Some(other)) if first != other => warn!(
                        "{}: combo key '{}' at line {} is shared by morphologies '{}' and '{}', keeping the first row",
                        origin, key, number, first, other
                    ),
                    _ => debug!("{}: duplicate combo key '{}' at line {} ignored", origin, key, number),
                }
                continue;
            }
            if let Some(morphology) = morphology {
                morphologies.insert(key.to_string(), morphology.to_string());
            }
            emodels
                .entry(fields[layout.emodel].to_string())
                .or_insert_with(|| key.to_string());
            rows.insert(
                key.to_string(),
                ComboRow {
                    layer: fields[layout.layer].to_string(),
                    emodel: fields[layout.emodel].to_string(),
                    threshold_current,
                    holding_current,
                },
            );
        }

        debug!("{}: {} combo rows, {} emodels", origin, rows.len(), emodels.len());
        Ok(Self { rows, emodels })
    }

    pub fn get(&self, key: &str) -> Option<&ComboRow> {
        self.rows.get(key)
    }

    /// First row whose emodel is `emodel`.
    pub fn get_by_emodel(&self, emodel: &str) -> Option<&ComboRow> {
        self.emodels.get(emodel).and_then(|key| self.rows.get(key))
    }

    /// Like [`ComboTable::get`], failing with `UnresolvedComboKey`.
    pub fn resolve(&self, key: &str) -> Result<&ComboRow> {
        self.resolve_by(KeyColumn::ComboName, key)
    }

    /// Looks `key` up in the given column.
    pub fn resolve_by(&self, column: KeyColumn, key: &str) -> Result<&ComboRow> {
        let row = match column {
            KeyColumn::ComboName => self.get(key),
            KeyColumn::Emodel => self.get_by_emodel(key),
        };
        row.ok_or_else(|| MvdError::UnresolvedComboKey(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.rows.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn parse_current(field: &str, line: usize) -> Result<f64> {
    field.parse().map_err(|_| MvdError::MalformedSideTable {
        line,
        reason: format!("invalid current '{}'", field),
    })
}
