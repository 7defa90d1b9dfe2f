#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Property tests for the index decoder
//!
//! Streams are produced the way the dataset writers produce them: a
//! sequence of named MessagePack maps with no framing.

use proptest::prelude::*;
use serde::Serialize;
use ultar_index::{IndexError, decode_all, resolve};

#[derive(Debug, Clone, Serialize)]
struct FlatRecord {
    offset: u64,
    str_idx: String,
    iidx: i64,
    keys: Vec<String>,
    offsets: Vec<u64>,
    sizes: Vec<u64>,
}

#[derive(Debug, Clone, Serialize)]
struct NestedEntry {
    key: String,
    offset: u64,
    size: u64,
}

#[derive(Debug, Clone, Serialize)]
struct NestedRecord {
    offset: u64,
    str_idx: String,
    iidx: i64,
    entries: Vec<NestedEntry>,
}

fn flat_record() -> impl Strategy<Value = FlatRecord> {
    (
        0u64..1 << 40,
        "[a-z0-9_]{1,12}",
        any::<i64>(),
        prop::collection::vec(("[a-z]{1,5}", 0u64..1 << 20, 0u64..1 << 20), 0..6),
    )
        .prop_map(|(offset, str_idx, iidx, entries)| FlatRecord {
            offset,
            str_idx,
            iidx,
            keys: entries.iter().map(|e| e.0.clone()).collect(),
            offsets: entries.iter().map(|e| e.1).collect(),
            sizes: entries.iter().map(|e| e.2).collect(),
        })
}

fn encode<T: Serialize>(records: &[T]) -> Vec<u8> {
    let mut buf = Vec::new();
    for r in records {
        rmp_serde::encode::write_named(&mut buf, r).unwrap();
    }
    buf
}

proptest! {
    #[test]
    fn test_decodes_exactly_n_rows_in_order(records in prop::collection::vec(flat_record(), 0..24)) {
        let rows = decode_all(encode(&records).as_slice()).unwrap();

        prop_assert_eq!(rows.len(), records.len());
        for (row, record) in rows.iter().zip(&records) {
            prop_assert_eq!(row.base_offset, record.offset);
            prop_assert_eq!(&row.row_id, &record.str_idx);
            prop_assert_eq!(row.row_ordinal, record.iidx);
            prop_assert_eq!(row.entries.len(), record.keys.len());
        }
    }

    #[test]
    fn test_truncation_fails_without_rows(records in prop::collection::vec(flat_record(), 1..8), cut in 1usize..8) {
        let mut data = encode(&records);
        let cut = cut.min(data.len());
        data.truncate(data.len() - cut);

        let err = decode_all(data.as_slice()).unwrap_err();
        prop_assert!(err.is_malformed());
    }
}

#[test]
fn test_nested_and_flat_records_mix_in_one_stream() {
    let mut data = encode(&[FlatRecord {
        offset: 0,
        str_idx: "legacy".to_string(),
        iidx: 0,
        keys: vec!["jpg".to_string()],
        offsets: vec![0],
        sizes: vec![500],
    }]);
    data.extend(encode(&[NestedRecord {
        offset: 0x1000,
        str_idx: "current".to_string(),
        iidx: 1,
        entries: vec![NestedEntry {
            key: "a".to_string(),
            offset: 0x10,
            size: 0x20,
        }],
    }]));

    let rows = decode_all(data.as_slice()).unwrap();
    assert_eq!(rows.len(), 2);

    let legacy = resolve(&rows[0], "jpg").unwrap();
    assert_eq!((legacy.start, legacy.end), (0, 0x1f4));

    let current = resolve(&rows[1], "a").unwrap();
    assert_eq!((current.start, current.end), (0x1010, 0x1030));
    assert!(matches!(
        resolve(&rows[1], "missing"),
        Err(IndexError::KeyNotFound(_))
    ));
}

#[test]
fn test_missing_required_field_is_malformed() {
    #[derive(Serialize)]
    struct NoRowId {
        offset: u64,
        iidx: i64,
        keys: Vec<String>,
        offsets: Vec<u64>,
        sizes: Vec<u64>,
    }
    let data = encode(&[NoRowId {
        offset: 0,
        iidx: 0,
        keys: Vec::new(),
        offsets: Vec::new(),
        sizes: Vec::new(),
    }]);

    let err = decode_all(data.as_slice()).unwrap_err();
    assert!(err.is_malformed(), "{err}");
}
