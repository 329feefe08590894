//! Seekable single-file container.
//!
//! # File Structure
//! ```text
//! [8 bytes]  Signature 89 'C' 'C' 'F' 0D 0A 1A 0A
//! [4 bytes]  Format version (little-endian u32, currently 1)
//! [4 bytes]  Number of index entries
//! [4 bytes]  Index length in bytes
//! [N bytes]  Index entries
//! [4 bytes]  Adler32 checksum of the index
//! [....]     Data segments
//! ```
//!
//! Index entry:
//! ```text
//! [2 bytes]  Path length, followed by the UTF-8 path
//! [1 byte]   Storage type (0 = i32, 1 = i64, 2 = f64, 3 = string)
//! [1 byte]   Codec (0 = raw, 1 = zlib)
//! [8 bytes]  Rows
//! [8 bytes]  Values per row
//! [8 bytes]  Absolute offset of the data segment
//! [8 bytes]  Stored length of the data segment
//! ```
//!
//! Numeric segments are packed little-endian rows. String segments hold
//! `rows + 1` u64 offsets into a UTF-8 heap that follows them. A raw segment
//! is read row-range by row-range; a zlib segment is inflated whole on every
//! read.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use adler2::adler32_slice;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use log::{debug, info, trace};

use super::{Container, ColumnData, DatasetInfo, child_names, normalize};
use crate::mvd::types::error::{MvdError, Result};
use crate::mvd::types::models::DataType;

/// Leading bytes of every container file.
pub const MAGIC: [u8; 8] = [0x89, b'C', b'C', b'F', b'\r', b'\n', 0x1A, b'\n'];

/// The only container version this crate reads and writes.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the fixed part of an index entry, excluding the path bytes.
pub(crate) const ENTRY_FIXED_LEN: usize = 2 + 1 + 1 + 8 * 4;

/// On-disk element encoding of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    I32,
    I64,
    F64,
    Str,
}

impl StorageType {
    /// Bytes per element; `None` for variable-length strings.
    pub fn element_size(self) -> Option<usize> {
        match self {
            StorageType::I32 => Some(4),
            StorageType::I64 | StorageType::F64 => Some(8),
            StorageType::Str => None,
        }
    }

    pub fn dtype(self) -> DataType {
        match self {
            StorageType::I32 | StorageType::I64 => DataType::Int,
            StorageType::F64 => DataType::Float,
            StorageType::Str => DataType::Text,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            StorageType::I32 => 0,
            StorageType::I64 => 1,
            StorageType::F64 => 2,
            StorageType::Str => 3,
        }
    }
}

impl TryFrom<u8> for StorageType {
    type Error = MvdError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::I32),
            1 => Ok(Self::I64),
            2 => Ok(Self::F64),
            3 => Ok(Self::Str),
            _ => Err(MvdError::InvalidFormat(format!("Unknown storage type: {}", value))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Raw,
    Zlib,
}

impl Codec {
    pub fn code(self) -> u8 {
        match self {
            Codec::Raw => 0,
            Codec::Zlib => 1,
        }
    }
}

impl TryFrom<u8> for Codec {
    type Error = MvdError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Raw),
            1 => Ok(Self::Zlib),
            _ => Err(MvdError::InvalidFormat(format!("Unknown codec: {}", value))),
        }
    }
}

/// Location and shape of one dataset in the file.
#[derive(Debug, Clone, Copy)]
struct Entry {
    storage: StorageType,
    codec: Codec,
    rows: usize,
    width: usize,
    offset: u64,
    length: u64,
}

/// A container file opened for reading.
///
/// Only the index is read at open; dataset bytes are fetched on demand.
#[derive(Debug)]
pub struct FileContainer {
    path: PathBuf,
    file: Mutex<File>,
    entries: BTreeMap<String, Entry>,
}

impl FileContainer {
    /// Opens a container file and loads its index.
    ///
    /// # Errors
    /// Returns an error if:
    /// - File cannot be opened
    /// - The signature does not match
    /// - Unsupported version
    /// - Index checksum verification fails
    /// - An index entry's size overflows or its segment lies outside the file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening container file: {}", path.display());
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let entries = read_index(&mut file, file_len)?;
        debug!("Container index holds {} datasets", entries.len());
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            entries,
        })
    }

    /// Whether `prefix` starts with the container signature.
    pub fn has_signature(prefix: &[u8]) -> bool {
        prefix.starts_with(&MAGIC)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry(&self, path: &str) -> Result<&Entry> {
        self.entries
            .get(normalize(path))
            .ok_or_else(|| MvdError::AttributeNotFound(path.to_string()))
    }

    /// Reads `len` bytes at `offset` within the raw segment of `entry`.
    fn read_segment_bytes(&self, entry: &Entry, offset: u64, len: usize) -> Result<Vec<u8>> {
        check_segment_bounds(entry, offset, len)?;
        let mut file = self.file.lock().map_err(|_| MvdError::LockPoisoned)?;
        file.seek(SeekFrom::Start(entry.offset + offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn inflate_segment(&self, entry: &Entry) -> Result<Vec<u8>> {
        let compressed = self.read_segment_bytes(entry, 0, entry.length as usize)?;
        let mut inflated = Vec::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut inflated)
            .map_err(|e| MvdError::InvalidFormat(format!("Zlib decompression failed: {}", e)))?;
        trace!("Inflated segment: {} bytes -> {} bytes", entry.length, inflated.len());
        Ok(inflated)
    }
}

impl Container for FileContainer {
    fn dataset(&self, path: &str) -> Option<DatasetInfo> {
        self.entries.get(normalize(path)).map(|entry| DatasetInfo {
            dtype: entry.storage.dtype(),
            rows: entry.rows,
            width: entry.width,
        })
    }

    fn children(&self, group: &str) -> Vec<String> {
        child_names(self.entries.keys(), group)
    }

    fn read_rows(&self, path: &str, rows: Range<usize>) -> Result<ColumnData> {
        let entry = *self.entry(path)?;
        if rows.start > rows.end || rows.end > entry.rows {
            return Err(MvdError::IndexOutOfRange {
                index: rows.end.saturating_sub(1).max(rows.start),
                len: entry.rows,
            });
        }
        trace!("Reading rows {}..{} of '{}' ({:?})", rows.start, rows.end, path, entry.codec);

        match entry.codec {
            Codec::Raw => decode_rows(&entry, rows, |offset, len| {
                self.read_segment_bytes(&entry, offset, len)
            }),
            Codec::Zlib => {
                let segment = self.inflate_segment(&entry)?;
                decode_rows(&entry, rows, |offset, len| {
                    usize::try_from(offset)
                        .ok()
                        .and_then(|start| segment.get(start..start.checked_add(len)?))
                        .map(<[u8]>::to_vec)
                        .ok_or_else(|| MvdError::InvalidFormat(format!(
                            "Inflated segment of {} bytes is too short for {} bytes at {}",
                            segment.len(), len, offset
                        )))
                })
            }
        }
    }
}

fn check_segment_bounds(entry: &Entry, offset: u64, len: usize) -> Result<()> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= entry.length => Ok(()),
        _ => Err(MvdError::InvalidFormat(format!(
            "Read of {} bytes at {} exceeds segment length {}",
            len, offset, entry.length
        ))),
    }
}

/// Byte length of `rows` rows of `width` elements, `None` on overflow.
fn span_len(rows: usize, width: usize, element_size: usize) -> Option<usize> {
    rows.checked_mul(width)?.checked_mul(element_size)
}

fn overflow(what: &str) -> MvdError {
    MvdError::InvalidFormat(format!("{} overflows the addressable range", what))
}

/// Decodes rows of a segment, fetching bytes by offset within the segment.
fn decode_rows(
    entry: &Entry,
    rows: Range<usize>,
    mut fetch: impl FnMut(u64, usize) -> Result<Vec<u8>>,
) -> Result<ColumnData> {
    let count = rows.end - rows.start;

    let Some(element_size) = entry.storage.element_size() else {
        // Offsets table first, then only the heap bytes those offsets span
        let table_start = span_len(rows.start, 1, 8).ok_or_else(|| overflow("String offset table"))?;
        let table_len = span_len(count + 1, 1, 8).ok_or_else(|| overflow("String offset table"))?;
        let offset_bytes = fetch(table_start as u64, table_len)?;
        let mut offsets = vec![0u64; count + 1];
        LittleEndian::read_u64_into(&offset_bytes, &mut offsets);

        let heap_start = span_len(entry.rows + 1, 1, 8).ok_or_else(|| overflow("String heap"))? as u64;
        let (first, last) = (offsets[0], offsets[count]);
        if last < first {
            return Err(MvdError::InvalidFormat("String offsets are not monotonic".to_string()));
        }
        let heap_offset = heap_start.checked_add(first).ok_or_else(|| overflow("String heap offset"))?;
        let heap_len = usize::try_from(last - first).map_err(|_| overflow("String heap length"))?;
        let heap = fetch(heap_offset, heap_len)?;

        let mut values = Vec::with_capacity(count);
        for pair in offsets.windows(2) {
            let bytes = (pair[0] <= pair[1])
                .then(|| heap.get((pair[0] - first) as usize..(pair[1] - first) as usize))
                .flatten()
                .ok_or_else(|| MvdError::InvalidFormat("String offsets are not monotonic".to_string()))?;
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|e| MvdError::InvalidFormat(format!("Invalid UTF-8 in string dataset: {}", e)))?;
            values.push(text);
        }
        return Ok(ColumnData::Text(values));
    };

    let values = count.checked_mul(entry.width).ok_or_else(|| overflow("Row range"))?;
    let start = span_len(rows.start, entry.width, element_size).ok_or_else(|| overflow("Row offset"))?;
    let len = span_len(count, entry.width, element_size).ok_or_else(|| overflow("Row range"))?;
    let bytes = fetch(start as u64, len)?;
    Ok(match entry.storage {
        StorageType::I32 => {
            let mut out = vec![0i32; values];
            LittleEndian::read_i32_into(&bytes, &mut out);
            ColumnData::Int(out.into_iter().map(i64::from).collect())
        }
        StorageType::I64 => {
            let mut out = vec![0i64; values];
            LittleEndian::read_i64_into(&bytes, &mut out);
            ColumnData::Int(out)
        }
        StorageType::F64 => {
            let mut out = vec![0f64; values];
            LittleEndian::read_f64_into(&bytes, &mut out);
            ColumnData::Float(out)
        }
        StorageType::Str => unreachable!("strings are handled above"),
    })
}

/// Reads and verifies the signature, header and index. Every segment must
/// end within `file_len` bytes.
fn read_index<R: Read>(reader: &mut R, file_len: u64) -> Result<BTreeMap<String, Entry>> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(MvdError::InvalidFormat("Missing container signature".to_string()));
    }

    let version = reader.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(MvdError::UnsupportedVersion(version));
    }
    let count = reader.read_u32::<LittleEndian>()?;
    let index_len = reader.read_u32::<LittleEndian>()?;
    trace!("Container header: version={}, entries={}, index={} bytes", version, count, index_len);

    let mut index = vec![0u8; index_len as usize];
    reader.read_exact(&mut index)?;

    let checksum_expected = reader.read_u32::<LittleEndian>()?;
    let checksum_actual = adler32_slice(index.as_slice());
    trace!("Index checksum: expected={:#010x}, actual={:#010x}", checksum_expected, checksum_actual);
    if checksum_actual != checksum_expected {
        return Err(MvdError::ChecksumMismatch {
            expected: checksum_expected,
            actual: checksum_actual,
        });
    }

    let mut cursor = index.as_slice();
    let mut entries = BTreeMap::new();
    for _ in 0..count {
        let (path, entry) = parse_entry(&mut cursor, file_len)?;
        entries.insert(path, entry);
    }
    if !cursor.is_empty() {
        return Err(MvdError::InvalidFormat(format!(
            "{} trailing bytes after container index",
            cursor.len()
        )));
    }
    Ok(entries)
}

fn parse_entry(reader: &mut &[u8], file_len: u64) -> Result<(String, Entry)> {
    let path_len = reader.read_u16::<LittleEndian>()? as usize;
    if reader.len() < path_len {
        return Err(MvdError::InvalidFormat("Incomplete dataset path in index".to_string()));
    }
    let path = std::str::from_utf8(&reader[..path_len])
        .map_err(|e| MvdError::InvalidFormat(format!("Invalid UTF-8 in dataset path: {}", e)))?;
    let path = normalize(path).to_string();
    *reader = &reader[path_len..];

    let storage = StorageType::try_from(reader.read_u8()?)?;
    let codec = Codec::try_from(reader.read_u8()?)?;
    let rows = read_count(reader, "rows", &path)?;
    let width = read_count(reader, "width", &path)?;
    let offset = reader.read_u64::<LittleEndian>()?;
    let length = reader.read_u64::<LittleEndian>()?;

    if width == 0 || (storage == StorageType::Str && width != 1) {
        return Err(MvdError::InvalidFormat(format!(
            "Invalid row width {} for dataset '{}'",
            width, path
        )));
    }

    // Decoded size: packed rows, or the offsets table in front of a string heap
    let decoded_len = match storage.element_size() {
        Some(size) => span_len(rows, width, size),
        None => rows.checked_add(1).and_then(|n| span_len(n, 1, 8)),
    };
    let decoded_len = decoded_len
        .ok_or_else(|| overflow(&format!("Dataset '{}' of {} x {} values", path, rows, width)))?
        as u64;
    let size_ok = match (storage, codec) {
        (_, Codec::Zlib) => true,
        (StorageType::Str, Codec::Raw) => decoded_len <= length,
        (_, Codec::Raw) => decoded_len == length,
    };
    if !size_ok {
        return Err(MvdError::InvalidFormat(format!(
            "Dataset '{}' stores {} bytes, expected {}",
            path, length, decoded_len
        )));
    }

    match offset.checked_add(length) {
        Some(end) if end <= file_len => {}
        _ => {
            return Err(MvdError::InvalidFormat(format!(
                "Dataset '{}' segment of {} bytes at {} lies outside the {}-byte file",
                path, length, offset, file_len
            )));
        }
    }

    Ok((path, Entry { storage, codec, rows, width, offset, length }))
}

fn read_count(reader: &mut &[u8], what: &str, path: &str) -> Result<usize> {
    let value = reader.read_u64::<LittleEndian>()?;
    usize::try_from(value).map_err(|_| {
        MvdError::InvalidFormat(format!("Dataset '{}' has {} {}, too many to address", path, value, what))
    })
}
