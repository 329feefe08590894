//! On-disk format detection.
//!
//! A file is classified from a fixed-size prefix:
//!
//! 1. Container signature: only the container index is read, and the file is
//!    MVD3 if it has a `cells` group, SONATA if it has a `nodes` group.
//! 2. Otherwise, text with a `Neurons Loaded` section marker is MVD2.
//!
//! Anything else is not a circuit file.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::debug;

use crate::mvd::container::{Container, FileContainer};
use crate::mvd::types::error::Result;
use crate::mvd::types::models::CircuitFormat;

pub mod legacy;

/// Bytes read to classify a file.
pub const SNIFF_LEN: usize = 4096;

/// Outcome of sniffing a file. Container files stay open so the reader does
/// not parse the index twice.
#[derive(Debug)]
pub(crate) enum Sniffed {
    Legacy,
    Container(CircuitFormat, FileContainer),
}

impl Sniffed {
    pub(crate) fn format(&self) -> CircuitFormat {
        match self {
            Sniffed::Legacy => CircuitFormat::Mvd2,
            Sniffed::Container(format, _) => *format,
        }
    }
}

/// Determines the circuit format of the file at `path`.
///
/// Returns `Ok(None)` for files that are readable but match no known layout.
///
/// # Errors
/// I/O failures, and container files whose header or index is corrupt.
pub fn detect_format(path: impl AsRef<Path>) -> Result<Option<CircuitFormat>> {
    Ok(sniff(path.as_ref())?.map(|sniffed| sniffed.format()))
}

/// Returns `true` if the file at `path` is a circuit file of any known format.
pub fn is_circuit_file(path: impl AsRef<Path>) -> Result<bool> {
    Ok(detect_format(path)?.is_some())
}

pub(crate) fn sniff(path: &Path) -> Result<Option<Sniffed>> {
    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?.take(SNIFF_LEN as u64).read_to_end(&mut prefix)?;

    if FileContainer::has_signature(&prefix) {
        let store = FileContainer::open(path)?;
        let format = classify(&store);
        debug!("Container {} classified as {:?}", path.display(), format);
        return Ok(format.map(|format| Sniffed::Container(format, store)));
    }

    if legacy::has_neuron_section(&prefix) {
        debug!("{} classified as MVD2 text", path.display());
        return Ok(Some(Sniffed::Legacy));
    }

    debug!("{} matches no circuit format", path.display());
    Ok(None)
}

/// Classifies an opened container by its top-level groups.
pub fn classify(store: &dyn Container) -> Option<CircuitFormat> {
    if store.contains("cells") {
        Some(CircuitFormat::Mvd3)
    } else if store.contains("nodes") {
        Some(CircuitFormat::Sonata)
    } else {
        None
    }
}
