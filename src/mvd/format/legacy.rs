//! MVD2 record files.
//!
//! # File Structure
//! ```text
//! <header line 1>
//! <header line 2>
//! Neurons Loaded
//! <morphology> <database> <hypercolumn> <minicolumn> <layer> <mtype> <etype> <x> <y> <z> <y_rotation_deg> <me_combo>
//! ...
//! MorphTypes
//! <mtype> <second name> <synapse class>
//! ...
//! ElectroTypes
//! <etype>
//! ...
//! CircuitSeeds
//! <seed> <seed> <seed>
//! ```
//!
//! A section starts at its marker line and runs until the next marker.
//! `MicroBox Data` and `MiniColumnsPosition` sections are recognized and
//! skipped. Blank lines and lines starting with `#` are ignored.
//!
//! The mtype and etype fields of a neuron record are indices into the
//! MorphTypes and ElectroTypes sections. The file is read whole and
//! rearranged into the MVD3 dataset layout, so the columnar reader serves it.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use log::{debug, info, trace};

use crate::mvd::container::{Dataset, MemoryContainer};
use crate::mvd::types::error::{MvdError, Result};

/// Marker of the per-neuron section.
pub const NEURON_MARKER: &str = "Neurons Loaded";

const NEURON_FIELDS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Neurons,
    MicroBox,
    MiniColumns,
    Seeds,
    MorphTypes,
    ElectroTypes,
}

impl Section {
    fn from_marker(line: &str) -> Option<Self> {
        const MARKERS: [(&str, Section); 6] = [
            (NEURON_MARKER, Section::Neurons),
            ("MicroBox Data", Section::MicroBox),
            ("MiniColumnsPosition", Section::MiniColumns),
            ("CircuitSeeds", Section::Seeds),
            ("MorphTypes", Section::MorphTypes),
            ("ElectroTypes", Section::ElectroTypes),
        ];
        MARKERS
            .iter()
            .find(|(marker, _)| line.starts_with(marker))
            .map(|(_, section)| *section)
    }
}

#[derive(Debug)]
struct NeuronRecord {
    morphology: String,
    hypercolumn: i64,
    minicolumn: i64,
    layer: i64,
    mtype: i64,
    etype: i64,
    position: [f64; 3],
    y_rotation_deg: f64,
    me_combo: String,
}

#[derive(Debug)]
struct MorphTypeRecord {
    name: String,
    synapse_class: String,
}

#[derive(Debug, Default)]
struct LegacyRecords {
    neurons: Vec<NeuronRecord>,
    morph_types: Vec<MorphTypeRecord>,
    electro_types: Vec<String>,
    seeds: Vec<f64>,
}

/// Whether a file prefix looks like an MVD2 file: UTF-8 text with a
/// `Neurons Loaded` marker line. A multi-byte character cut by the end of the
/// prefix is tolerated.
pub fn has_neuron_section(prefix: &[u8]) -> bool {
    let text = match std::str::from_utf8(prefix) {
        Ok(text) => text,
        Err(e) if e.error_len().is_none() => match std::str::from_utf8(&prefix[..e.valid_up_to()]) {
            Ok(text) => text,
            Err(_) => return false,
        },
        Err(_) => return false,
    };
    text.lines().any(|line| line.starts_with(NEURON_MARKER))
}

/// Parses the MVD2 file at `path` into a container with the MVD3 layout.
pub fn to_container(path: impl AsRef<Path>) -> Result<MemoryContainer> {
    let path = path.as_ref();
    info!("Parsing MVD2 file: {}", path.display());
    parse(BufReader::new(File::open(path)?))
}

/// Parses MVD2 text into a container with the MVD3 layout:
///
/// - `cells/positions` (N x 3) and `cells/orientations` (N x 4, quaternions)
/// - `cells/properties/{morphology, me_combo, mtype, etype, synapse_class}`
///   as index arrays, with their libraries under `library/`
/// - `cells/properties/{hypercolumn, minicolumn, layer}` as plain integers
/// - `circuit/seeds` when the file has a CircuitSeeds section
pub fn parse<R: BufRead>(reader: R) -> Result<MemoryContainer> {
    let records = read_records(reader)?;
    debug!(
        "MVD2 records: {} neurons, {} mtypes, {} etypes, {} seeds",
        records.neurons.len(),
        records.morph_types.len(),
        records.electro_types.len(),
        records.seeds.len()
    );
    build_container(records)
}

fn read_records<R: BufRead>(reader: R) -> Result<LegacyRecords> {
    let mut records = LegacyRecords::default();
    let mut section = Section::Preamble;
    let mut header_lines = 0;

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let number = number + 1;
        if header_lines < 2 {
            header_lines += 1;
            continue;
        }
        if let Some(next) = Section::from_marker(&line) {
            trace!("Line {}: entering section {:?}", number, next);
            section = next;
            continue;
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match section {
            Section::Neurons => records.neurons.push(parse_neuron(line, number)?),
            Section::MorphTypes => records.morph_types.push(parse_morph_type(line, number)?),
            Section::ElectroTypes => records.electro_types.push(line.to_string()),
            Section::Seeds => {
                for field in line.split_whitespace() {
                    records.seeds.push(parse_field(field, "seed", number)?);
                }
            }
            Section::Preamble | Section::MicroBox | Section::MiniColumns => {}
        }
    }

    if header_lines < 2 {
        return Err(MvdError::InvalidFormat("MVD2 file is missing its two header lines".to_string()));
    }
    Ok(records)
}

fn parse_neuron(line: &str, number: usize) -> Result<NeuronRecord> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != NEURON_FIELDS {
        return Err(MvdError::InvalidFormat(format!(
            "Line {}: neuron record has {} fields, expected {}",
            number,
            fields.len(),
            NEURON_FIELDS
        )));
    }
    // fields[1] is the morphology database, which has no counterpart in MVD3
    Ok(NeuronRecord {
        morphology: fields[0].to_string(),
        hypercolumn: parse_field(fields[2], "hypercolumn", number)?,
        minicolumn: parse_field(fields[3], "minicolumn", number)?,
        layer: parse_field(fields[4], "layer", number)?,
        mtype: parse_field(fields[5], "mtype", number)?,
        etype: parse_field(fields[6], "etype", number)?,
        position: [
            parse_field(fields[7], "x", number)?,
            parse_field(fields[8], "y", number)?,
            parse_field(fields[9], "z", number)?,
        ],
        y_rotation_deg: parse_field(fields[10], "rotation", number)?,
        me_combo: fields[11].to_string(),
    })
}

fn parse_morph_type(line: &str, number: usize) -> Result<MorphTypeRecord> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        [name, _, synapse_class] => Ok(MorphTypeRecord {
            name: name.to_string(),
            synapse_class: synapse_class.to_string(),
        }),
        _ => Err(MvdError::InvalidFormat(format!(
            "Line {}: MorphTypes record has {} fields, expected 3",
            number,
            fields.len()
        ))),
    }
}

fn parse_field<T: FromStr>(field: &str, what: &str, number: usize) -> Result<T> {
    field.parse().map_err(|_| {
        MvdError::InvalidFormat(format!("Line {}: invalid {} value '{}'", number, what, field))
    })
}

/// Assigns indices in first-occurrence order.
fn enumerate_values<'a>(values: impl IntoIterator<Item = &'a str>) -> (Vec<i64>, Vec<String>) {
    let mut positions: HashMap<&str, i64> = HashMap::new();
    let mut library = Vec::new();
    let indices = values
        .into_iter()
        .map(|value| {
            *positions.entry(value).or_insert_with(|| {
                library.push(value.to_string());
                library.len() as i64 - 1
            })
        })
        .collect();
    (indices, library)
}

/// Quaternion `(x, y, z, w)` of a rotation around the Y axis.
pub fn y_rotation_quaternion(degrees: f64) -> [f64; 4] {
    let (sin, cos) = (degrees.to_radians() / 2.0).sin_cos();
    [0.0, sin, 0.0, cos]
}

fn check_codes(codes: &[i64], dictionary_len: usize, what: &str) -> Result<()> {
    if let Some((cell, code)) = codes
        .iter()
        .enumerate()
        .find(|(_, code)| usize::try_from(**code).map_or(true, |code| code >= dictionary_len))
    {
        return Err(MvdError::InvalidFormat(format!(
            "Neuron {} refers to {} {}, but only {} are declared",
            cell, what, code, dictionary_len
        )));
    }
    Ok(())
}

fn build_container(records: LegacyRecords) -> Result<MemoryContainer> {
    let neurons = &records.neurons;

    let mtypes: Vec<i64> = neurons.iter().map(|n| n.mtype).collect();
    let etypes: Vec<i64> = neurons.iter().map(|n| n.etype).collect();
    check_codes(&mtypes, records.morph_types.len(), "mtype")?;
    check_codes(&etypes, records.electro_types.len(), "etype")?;

    // Synapse classes are declared per mtype
    let (class_of_mtype, synapse_classes) =
        enumerate_values(records.morph_types.iter().map(|m| m.synapse_class.as_str()));
    let cell_classes: Vec<i64> = mtypes.iter().map(|&mtype| class_of_mtype[mtype as usize]).collect();

    let (morphologies, morphology_library) =
        enumerate_values(neurons.iter().map(|n| n.morphology.as_str()));
    let (me_combos, me_combo_library) = enumerate_values(neurons.iter().map(|n| n.me_combo.as_str()));

    let positions: Vec<[f64; 3]> = neurons.iter().map(|n| n.position).collect();
    let orientations: Vec<[f64; 4]> = neurons
        .iter()
        .map(|n| y_rotation_quaternion(n.y_rotation_deg))
        .collect();

    let mut store = MemoryContainer::new();
    store
        .insert("cells/positions", Dataset::rows(positions.as_slice()))
        .insert("cells/orientations", Dataset::rows(orientations.as_slice()))
        .insert("cells/properties/morphology", Dataset::ints(morphologies))
        .insert("library/morphology", Dataset::texts(morphology_library))
        .insert("cells/properties/me_combo", Dataset::ints(me_combos))
        .insert("library/me_combo", Dataset::texts(me_combo_library))
        .insert("cells/properties/mtype", Dataset::ints(mtypes))
        .insert("library/mtype", Dataset::texts(records.morph_types.iter().map(|m| m.name.as_str())))
        .insert("cells/properties/etype", Dataset::ints(etypes))
        .insert("library/etype", Dataset::texts(records.electro_types.iter().map(String::as_str)))
        .insert("cells/properties/synapse_class", Dataset::ints(cell_classes))
        .insert("library/synapse_class", Dataset::texts(synapse_classes))
        .insert("cells/properties/hypercolumn", Dataset::ints(neurons.iter().map(|n| n.hypercolumn).collect()))
        .insert("cells/properties/minicolumn", Dataset::ints(neurons.iter().map(|n| n.minicolumn).collect()))
        .insert("cells/properties/layer", Dataset::ints(neurons.iter().map(|n| n.layer).collect()));
    if !records.seeds.is_empty() {
        store.insert("circuit/seeds", Dataset::floats(records.seeds));
    }
    Ok(store)
}
