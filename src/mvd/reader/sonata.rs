//! Reader for SONATA node files.
//!
//! A file holds one or more populations under `nodes/`, each with its own
//! cell count and attribute set:
//!
//! ```text
//! nodes/<population>/node_type_id
//! nodes/<population>/node_group_id
//! nodes/<population>/<group>/<attribute>
//! nodes/<population>/<group>/@library/<attribute>
//! nodes/<population>/<group>/dynamics_params/<attribute>
//! ```
//!
//! Attributes resolve under the lowest-numbered group.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use super::CircuitBackend;
use crate::mvd::column::{AttributeCatalog, Column, ScalarColumn, ScalarSource};
use crate::mvd::container::{Container, FileContainer, join};
use crate::mvd::types::error::{MvdError, Result};
use crate::mvd::types::models::CircuitFormat;
use crate::mvd::types::selection::{Selected, Selector};

pub const NODES: &str = "nodes";
pub const DEFAULT_POPULATION: &str = "default";

const LIBRARY: &str = "@library";
const DYNAMICS: &str = "dynamics_params";
const ORIENTATION_COMPONENTS: [&str; 4] =
    ["orientation_x", "orientation_y", "orientation_z", "orientation_w"];
const ROTATION_ANGLES: [&str; 3] =
    ["rotation_angle_xaxis", "rotation_angle_yaxis", "rotation_angle_zaxis"];

/// Cells of one population of a SONATA nodes file.
#[derive(Debug)]
pub struct SonataReader {
    population: String,
    available: Vec<String>,
    group: String,
    len: usize,
    positions: ScalarColumn,
    orientations: Option<ScalarColumn>,
    attributes: AttributeCatalog,
}

impl SonataReader {
    pub fn open(path: impl AsRef<Path>, population: Option<&str>) -> Result<Self> {
        let store = FileContainer::open(path)?;
        Self::from_container(Arc::new(store), population)
    }

    /// Selects a population of `store` and discovers its attributes.
    ///
    /// Without an explicit population, `default` is used if present, else
    /// the only population of the file.
    ///
    /// # Errors
    /// - `PopulationNotFound` if the requested population is absent
    /// - `AmbiguousPopulation` if none was requested and several exist
    /// - `InvalidFormat` if the file has no populations, or the population
    ///   has no attribute group
    pub fn from_container(store: Arc<dyn Container>, population: Option<&str>) -> Result<Self> {
        let available = populations(store.as_ref());
        let population = select_population(&available, population)?;
        let root = join(NODES, &population);

        let mut groups: Vec<(usize, String)> = store
            .children(&root)
            .into_iter()
            .filter(|name| store.dataset(&join(&root, name)).is_none())
            .filter_map(|name| name.parse::<usize>().ok().map(|id| (id, name)))
            .collect();
        groups.sort();
        let Some((_, first_group)) = groups.first() else {
            return Err(MvdError::InvalidFormat(format!(
                "Population '{}' has no attribute group",
                population
            )));
        };
        if groups.len() > 1 {
            warn!(
                "Population '{}' has {} groups, reading attributes from group {}",
                population,
                groups.len(),
                first_group
            );
        }
        let group = join(&root, first_group);

        let len = ["node_type_id", "node_group_id"]
            .iter()
            .find_map(|name| store.dataset(&join(&root, name)))
            .or_else(|| store.dataset(&join(&group, "x")))
            .map(|info| info.rows)
            .ok_or_else(|| {
                MvdError::InvalidFormat(format!("Cannot determine the size of population '{}'", population))
            })?;

        let mut attributes =
            AttributeCatalog::discover(&store, &group, Some(&join(&group, LIBRARY)), len)?;
        let dynamics = join(&group, DYNAMICS);
        let added = attributes.extend_from(&store, &dynamics, Some(&join(&dynamics, LIBRARY)), len)?;
        debug!("{} dynamics parameters registered", added);

        let positions = ScalarColumn::components(
            store.clone(),
            "positions",
            ["x", "y", "z"].iter().map(|axis| join(&group, axis)).collect(),
            len,
        )?;
        let orientations = orientation_column(&store, &attributes, len)?;

        info!(
            "Opened SONATA population '{}': {} cells, {} attributes",
            population,
            len,
            attributes.len()
        );
        Ok(Self {
            population,
            available,
            group,
            len,
            positions,
            orientations,
            attributes,
        })
    }

    /// Every population of the file, sorted.
    pub fn available_populations(&self) -> &[String] {
        &self.available
    }

    /// Container path of the group attributes are read from.
    pub fn group_path(&self) -> &str {
        &self.group
    }
}

impl CircuitBackend for SonataReader {
    fn format(&self) -> CircuitFormat {
        CircuitFormat::Sonata
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

    /// Emodels from `model_template` with its `hoc:`-style prefix removed,
    /// or from a plain `emodel` attribute.
    fn stored_emodels(&self, selector: &Selector) -> Result<Selected<String>> {
        if let Some(column) = self.attributes.get("model_template") {
            return Ok(column.texts(selector)?.map(strip_template_prefix));
        }
        self.attributes.require("emodel")?.texts(selector)
    }

    fn population(&self) -> Option<&str> {
        Some(&self.population)
    }

    fn circuit_seeds(&self) -> Result<Vec<f64>> {
        Err(MvdError::AttributeNotFound("circuit seeds".to_string()))
    }
}

/// Names of the populations under `nodes/`.
pub fn populations(store: &dyn Container) -> Vec<String> {
    store
        .children(NODES)
        .into_iter()
        .filter(|name| store.dataset(&join(NODES, name)).is_none())
        .collect()
}

fn select_population(available: &[String], requested: Option<&str>) -> Result<String> {
    match requested {
        Some(name) if available.iter().any(|p| p == name) => Ok(name.to_string()),
        Some(name) => Err(MvdError::PopulationNotFound {
            population: name.to_string(),
            available: available.to_vec(),
        }),
        None if available.is_empty() => {
            Err(MvdError::InvalidFormat("File contains no populations".to_string()))
        }
        None if available.iter().any(|p| p == DEFAULT_POPULATION) => {
            Ok(DEFAULT_POPULATION.to_string())
        }
        None if available.len() == 1 => Ok(available[0].clone()),
        None => Err(MvdError::AmbiguousPopulation(available.to_vec())),
    }
}

/// Quaternions when all four components are stored, else Euler angles when
/// any rotation angle is.
fn orientation_column(
    store: &Arc<dyn Container>,
    attributes: &AttributeCatalog,
    len: usize,
) -> Result<Option<ScalarColumn>> {
    let stored = |name: &str| match attributes.get(name) {
        Some(Column::Scalar(column)) => match column.source() {
            ScalarSource::Dataset(path) => Some(path.clone()),
            _ => None,
        },
        _ => None,
    };

    let components: Vec<String> = ORIENTATION_COMPONENTS.iter().filter_map(|name| stored(name)).collect();
    if components.len() == ORIENTATION_COMPONENTS.len() {
        debug!("Orientations from quaternion components");
        return ScalarColumn::components(store.clone(), "orientations", components, len).map(Some);
    }

    let [x, y, z] = ROTATION_ANGLES.map(stored);
    if x.is_none() && y.is_none() && z.is_none() {
        debug!("No orientation attributes");
        return Ok(None);
    }
    debug!("Orientations from rotation angles");
    ScalarColumn::euler_angles(store.clone(), "orientations", x, y, z, len).map(Some)
}

/// `hoc:dSTUT_321707905` -> `dSTUT_321707905`. Values without a `:` are kept.
pub fn strip_template_prefix(template: String) -> String {
    match template.split_once(':') {
        Some((_, name)) => name.to_string(),
        None => template,
    }
}
