mod common;

use std::fs;

use adler2::adler32_slice;
use common::*;
use mvd_reader::mvd::container::Dataset;
use mvd_reader::mvd::container::file::{FORMAT_VERSION, MAGIC};
use mvd_reader::mvd::types::models::DataType;
use mvd_reader::{
    CircuitFile, Container, FileContainer, MemoryContainer, MvdError, detect_format, is_circuit_file,
};

#[test]
fn unknown_files_are_not_circuits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notes.txt");
    fs::write(&path, "just some text\nwith lines\n").expect("write");

    assert_eq!(detect_format(&path).expect("detect"), None);
    assert!(!is_circuit_file(&path).expect("is_circuit_file"));
    match CircuitFile::open(&path, None) {
        Err(MvdError::UnrecognizedFormat(reported)) => assert_eq!(reported, path),
        other => panic!("expected UnrecognizedFormat, got {:?}", other),
    }
}

#[test]
fn missing_files_are_io_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("absent.mvd3");
    assert!(matches!(detect_format(&path), Err(MvdError::Io(_))));
    assert!(matches!(CircuitFile::open(&path, None), Err(MvdError::Io(_))));
}

#[test]
fn containers_without_circuit_groups_are_not_circuits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = MemoryContainer::new();
    store.insert("misc/values", Dataset::ints(vec![1, 2, 3]));
    let path = write_store(dir.path(), "other.bin", &store, false);

    assert_eq!(detect_format(&path).expect("detect"), None);
    assert!(matches!(CircuitFile::open(&path, None), Err(MvdError::UnrecognizedFormat(_))));
}

#[test]
fn corrupted_index_fails_the_checksum() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = mvd3_file(dir.path());
    let mut bytes = fs::read(&path).expect("read");
    // First byte of the first dataset path
    bytes[MAGIC.len() + 12 + 2] ^= 0x20;
    fs::write(&path, &bytes).expect("write");

    assert!(matches!(FileContainer::open(&path), Err(MvdError::ChecksumMismatch { .. })));
    assert!(matches!(CircuitFile::open(&path, None), Err(MvdError::ChecksumMismatch { .. })));
}

#[test]
fn unsupported_container_version() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = mvd3_file(dir.path());
    let mut bytes = fs::read(&path).expect("read");
    bytes[MAGIC.len()..MAGIC.len() + 4].copy_from_slice(&7u32.to_le_bytes());
    fs::write(&path, &bytes).expect("write");

    assert!(matches!(FileContainer::open(&path), Err(MvdError::UnsupportedVersion(7))));
}

#[test]
fn file_container_reads_partial_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = MemoryContainer::new();
    store
        .insert("group/small", Dataset::ints(vec![1, -2, 3, 4]))
        .insert("group/large", Dataset::ints(vec![i64::MAX, 0, i64::MIN]))
        .insert("group/words", Dataset::texts(["alpha", "", "gamma", "δέλτα"]))
        .insert("group/nested/rows", Dataset::rows([[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]].as_slice()))
        .insert("/top", Dataset::floats(vec![0.5]));
    let path = write_store(dir.path(), "store.bin", &store, false);

    let file = FileContainer::open(&path).expect("open container");
    assert_eq!(file.children(""), vec!["group", "top"]);
    assert_eq!(file.children("/group/"), vec!["large", "nested", "small", "words"]);
    assert!(file.contains("group/nested"));
    assert!(!file.contains("group/absent"));

    let info = file.dataset("group/nested/rows").expect("rows info");
    assert_eq!((info.dtype, info.rows, info.width), (DataType::Float, 3, 2));

    assert_eq!(
        file.read_rows("group/small", 1..3).expect("small").into_ints("small").expect("ints"),
        vec![-2, 3]
    );
    assert_eq!(
        file.read_rows("group/large", 0..3).expect("large").into_ints("large").expect("ints"),
        vec![i64::MAX, 0, i64::MIN]
    );
    assert_eq!(
        file.read_rows("group/words", 1..4).expect("words").into_texts("words").expect("texts"),
        vec!["", "gamma", "δέλτα"]
    );
    assert_eq!(
        file.read_rows("group/nested/rows", 2..3).expect("rows").into_floats("rows").expect("floats"),
        vec![5.0, 6.0]
    );
    assert!(matches!(
        file.read_rows("group/small", 2..5),
        Err(MvdError::IndexOutOfRange { len: 4, .. })
    ));
    assert!(matches!(file.read_rows("group/absent", 0..1), Err(MvdError::AttributeNotFound(_))));
}

/// Container bytes with one raw index entry and no data segments.
fn single_entry_container(path: &str, storage: u8, rows: u64, width: u64, offset: u64, length: u64) -> Vec<u8> {
    let mut index = Vec::new();
    index.extend_from_slice(&(path.len() as u16).to_le_bytes());
    index.extend_from_slice(path.as_bytes());
    index.extend_from_slice(&[storage, 0]);
    for field in [rows, width, offset, length] {
        index.extend_from_slice(&field.to_le_bytes());
    }

    let mut bytes = MAGIC.to_vec();
    for field in [FORMAT_VERSION, 1, index.len() as u32] {
        bytes.extend_from_slice(&field.to_le_bytes());
    }
    bytes.extend_from_slice(&index);
    bytes.extend_from_slice(&adler32_slice(&index).to_le_bytes());
    bytes
}

fn header_len(path: &str) -> u64 {
    (MAGIC.len() + 12 + 2 + path.len() + 2 + 8 * 4 + 4) as u64
}

fn write_bytes(dir: &std::path::Path, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join("crafted.mvd3");
    fs::write(&path, bytes).expect("write");
    path
}

#[test]
fn oversized_row_counts_are_rejected_at_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = "cells/positions";
    let bytes = single_entry_container(dataset, 2, 1 << 62, 3, header_len(dataset), 0);
    let path = write_bytes(dir.path(), &bytes);

    assert!(matches!(FileContainer::open(&path), Err(MvdError::InvalidFormat(_))));
    assert!(matches!(CircuitFile::open(&path, None), Err(MvdError::InvalidFormat(_))));

    // The offsets table of a string dataset needs one more entry than rows
    let bytes = single_entry_container("library/mtype", 3, u64::MAX, 1, header_len("library/mtype"), 0);
    let path = write_bytes(dir.path(), &bytes);
    assert!(matches!(FileContainer::open(&path), Err(MvdError::InvalidFormat(_))));
}

#[test]
fn segments_must_lie_within_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = "cells/positions";
    let data_start = header_len(dataset);

    // Two rows of three floats declared, none written
    let bytes = single_entry_container(dataset, 2, 2, 3, data_start, 48);
    assert_eq!(bytes.len() as u64, data_start);
    let path = write_bytes(dir.path(), &bytes);
    assert!(matches!(FileContainer::open(&path), Err(MvdError::InvalidFormat(_))));

    let bytes = single_entry_container(dataset, 2, 2, 3, u64::MAX - 8, 48);
    let path = write_bytes(dir.path(), &bytes);
    assert!(matches!(FileContainer::open(&path), Err(MvdError::InvalidFormat(_))));

    // Same entry with its data appended
    let mut bytes = single_entry_container(dataset, 2, 2, 3, data_start, 48);
    for value in [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0] {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    let path = write_bytes(dir.path(), &bytes);
    let file = FileContainer::open(&path).expect("open container");
    assert_eq!(
        file.read_rows(dataset, 1..2).expect("row").into_floats("positions").expect("floats"),
        vec![4.0, 5.0, 6.0]
    );
}
