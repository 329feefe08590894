//! Serialization of a [`MemoryContainer`] to the container file format.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use adler2::adler32_slice;
use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use log::{debug, info};

use super::file::{Codec, ENTRY_FIXED_LEN, FORMAT_VERSION, MAGIC, StorageType};
use super::{ColumnData, Dataset, MemoryContainer};
use crate::mvd::types::error::{MvdError, Result};

/// Writes the datasets of a [`MemoryContainer`] as a container file.
///
/// Integers are stored as i32 when every value fits, i64 otherwise.
/// String datasets can optionally be zlib-compressed; those are then inflated
/// whole on every read, so this suits small dictionaries rather than
/// per-cell columns.
#[derive(Debug)]
pub struct ContainerWriter<'a> {
    store: &'a MemoryContainer,
    compress_text: bool,
}

struct EncodedDataset<'a> {
    path: &'a str,
    storage: StorageType,
    codec: Codec,
    rows: usize,
    width: usize,
    bytes: Vec<u8>,
}

impl<'a> ContainerWriter<'a> {
    pub fn new(store: &'a MemoryContainer) -> Self {
        Self { store, compress_text: false }
    }

    /// Zlib-compress string datasets.
    pub fn compress_text(mut self, compress: bool) -> Self {
        self.compress_text = compress;
        self
    }

    /// Creates (or truncates) `path` and writes the container to it.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("Writing container file: {}", path.display());
        let mut out = BufWriter::new(File::create(path)?);
        self.write_to(&mut out)?;
        out.flush()?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let encoded = self
            .store
            .iter()
            .map(|(path, dataset)| self.encode(path, dataset))
            .collect::<Result<Vec<_>>>()?;

        let index_len: usize = encoded.iter().map(|d| ENTRY_FIXED_LEN + d.path.len()).sum();
        let header_len = MAGIC.len() + 4 * 3;
        let mut data_offset = (header_len + index_len + 4) as u64;

        let mut index = Vec::with_capacity(index_len);
        for dataset in &encoded {
            let path_len = u16::try_from(dataset.path.len()).map_err(|_| {
                MvdError::InvalidFormat(format!("Dataset path too long: {}", dataset.path))
            })?;
            index.write_u16::<LittleEndian>(path_len)?;
            index.write_all(dataset.path.as_bytes())?;
            index.write_u8(dataset.storage.code())?;
            index.write_u8(dataset.codec.code())?;
            index.write_u64::<LittleEndian>(dataset.rows as u64)?;
            index.write_u64::<LittleEndian>(dataset.width as u64)?;
            index.write_u64::<LittleEndian>(data_offset)?;
            index.write_u64::<LittleEndian>(dataset.bytes.len() as u64)?;
            data_offset += dataset.bytes.len() as u64;
        }

        let entry_count = u32::try_from(encoded.len())
            .map_err(|_| MvdError::InvalidFormat("Too many datasets".to_string()))?;
        let index_len = u32::try_from(index.len())
            .map_err(|_| MvdError::InvalidFormat("Container index too large".to_string()))?;

        out.write_all(&MAGIC)?;
        out.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        out.write_u32::<LittleEndian>(entry_count)?;
        out.write_u32::<LittleEndian>(index_len)?;
        out.write_all(&index)?;
        out.write_u32::<LittleEndian>(adler32_slice(&index))?;
        for dataset in &encoded {
            out.write_all(&dataset.bytes)?;
        }
        debug!("Wrote {} datasets, {} bytes of data", encoded.len(), data_offset);
        Ok(())
    }

    fn encode<'p>(&self, path: &'p str, dataset: &Dataset) -> Result<EncodedDataset<'p>> {
        let rows = dataset.rows_len();
        let (storage, raw) = match &dataset.data {
            ColumnData::Int(values) => {
                if values.iter().all(|&v| i32::try_from(v).is_ok()) {
                    let mut bytes = Vec::with_capacity(values.len() * 4);
                    for &value in values {
                        bytes.write_i32::<LittleEndian>(value as i32)?;
                    }
                    (StorageType::I32, bytes)
                } else {
                    let mut bytes = Vec::with_capacity(values.len() * 8);
                    for &value in values {
                        bytes.write_i64::<LittleEndian>(value)?;
                    }
                    (StorageType::I64, bytes)
                }
            }
            ColumnData::Float(values) => {
                let mut bytes = Vec::with_capacity(values.len() * 8);
                for &value in values {
                    bytes.write_f64::<LittleEndian>(value)?;
                }
                (StorageType::F64, bytes)
            }
            ColumnData::Text(values) => {
                if dataset.width != 1 {
                    return Err(MvdError::InvalidFormat(format!(
                        "String dataset '{}' must have width 1",
                        path
                    )));
                }
                let heap_len: usize = values.iter().map(String::len).sum();
                let mut bytes = Vec::with_capacity((values.len() + 1) * 8 + heap_len);
                let mut offset = 0u64;
                bytes.write_u64::<LittleEndian>(offset)?;
                for value in values {
                    offset += value.len() as u64;
                    bytes.write_u64::<LittleEndian>(offset)?;
                }
                for value in values {
                    bytes.write_all(value.as_bytes())?;
                }
                (StorageType::Str, bytes)
            }
        };

        let (codec, bytes) = if storage == StorageType::Str && self.compress_text {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&raw)?;
            (Codec::Zlib, encoder.finish()?)
        } else {
            (Codec::Raw, raw)
        };

        Ok(EncodedDataset {
            path,
            storage,
            codec,
            rows,
            width: dataset.width,
            bytes,
        })
    }
}
