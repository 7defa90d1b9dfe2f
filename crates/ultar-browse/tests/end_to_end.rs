#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! End-to-end tests: dataset on disk -> browse -> index -> read

use pretty_assertions::assert_eq;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use ultar_browse::request::{UNRESOLVED_CELL, browse, load_index, read_bytes};
use ultar_browse::{
    BrowseConfig, BrowseError, BrowseService, BufferedResponse, EntryKind, QueryParams,
    StatusClass,
};

#[derive(Serialize)]
struct FlatRecord<'a> {
    offset: u64,
    str_idx: &'a str,
    iidx: i64,
    keys: Vec<&'a str>,
    offsets: Vec<u64>,
    sizes: Vec<u64>,
}

fn write_index(path: &Path, records: &[FlatRecord<'_>]) {
    let mut buf = Vec::new();
    for record in records {
        rmp_serde::encode::write_named(&mut buf, record).unwrap();
    }
    fs::write(path, buf).unwrap();
}

fn shard_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

/// `shard.tar` (1000 bytes) with a one-row index exposing `jpg` at 0..500.
fn dataset() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("shard.tar"), shard_bytes(1000)).unwrap();
    write_index(
        &dir.path().join("shard.tar.utix"),
        &[FlatRecord {
            offset: 0,
            str_idx: "sample-0",
            iidx: 0,
            keys: vec!["jpg"],
            offsets: vec![0],
            sizes: vec![500],
        }],
    );
    dir
}

fn service(dir: &TempDir) -> BrowseService {
    BrowseService::new(&BrowseConfig::new(dir.path()).with_watch(false)).unwrap()
}

#[test]
fn test_index_link_reads_first_500_bytes() {
    let dir = dataset();
    let service = service(&dir);

    let view = load_index(&service, &QueryParams::default().with("path", "shard.tar.utix")).unwrap();
    assert_eq!(view.archive_path, "shard.tar");
    assert_eq!(view.columns, vec!["id", "idx", "jpg"]);
    assert_eq!(view.rows.len(), 1);

    let row = &view.rows[0];
    assert_eq!(row.fields["jpg"], "00000000..000001F4");
    assert_eq!(row.fields["id"], "sample-0");
    let link = &row.links["jpg"];
    assert_eq!(
        (link.file.as_str(), link.base.as_str(), link.end.as_str()),
        ("shard.tar", "0", "1f4")
    );

    let mut response = BufferedResponse::default();
    read_bytes(
        &service,
        &QueryParams::parse(&link.query_string()),
        &mut response,
    )
    .unwrap();

    assert_eq!(response.body.len(), 500);
    assert_eq!(&response.body[..], &shard_bytes(1000)[..500]);
    assert_eq!(response.mime_hint, "jpg");
}

#[test]
fn test_empty_root_lists_nothing() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);

    let entries = browse(&service, &QueryParams::default()).unwrap();
    assert!(entries.is_empty());
}

#[test]
fn test_browse_nested_directories() {
    let dir = dataset();
    fs::create_dir_all(dir.path().join("train/part-0")).unwrap();
    fs::write(dir.path().join("train/a.tar.utix"), b"").unwrap();
    let service = service(&dir);

    let root = browse(&service, &QueryParams::default().with("path", "")).unwrap();
    let root: Vec<(EntryKind, &str)> = root
        .iter()
        .map(|e| (e.kind, e.relative_path.as_str()))
        .collect();
    assert_eq!(
        root,
        vec![
            (EntryKind::Dir, "train"),
            (EntryKind::File, "shard.tar.utix"),
        ]
    );

    let train = browse(&service, &QueryParams::default().with("path", "train/")).unwrap();
    let names: Vec<&str> = train.iter().map(|e| e.relative_path.as_str()).collect();
    assert_eq!(names, vec!["train/part-0", "train/a.tar.utix"]);
}

#[test]
fn test_malformed_index_renders_as_empty_view() {
    let dir = dataset();
    fs::write(dir.path().join("broken.tar.utix"), [0x85, 0xa6, b'o']).unwrap();
    let service = service(&dir);

    let view = load_index(&service, &QueryParams::default().with("path", "broken.tar.utix")).unwrap();
    assert!(view.is_empty());
    assert_eq!(view.archive_path, "broken.tar");

    assert!(matches!(
        service.load_index("broken.tar.utix"),
        Err(BrowseError::MalformedIndex { .. })
    ));
}

#[test]
fn test_load_index_path_errors() {
    let dir = dataset();
    let service = service(&dir);

    assert!(matches!(
        load_index(&service, &QueryParams::default()),
        Err(BrowseError::BadArgument(_))
    ));
    assert!(matches!(
        load_index(&service, &QueryParams::default().with("path", "shard.tar")),
        Err(BrowseError::Path { .. })
    ));
    assert!(matches!(
        load_index(&service, &QueryParams::default().with("path", "absent.tar.utix")),
        Err(BrowseError::Open { .. })
    ));
}

#[test]
fn test_read_bytes_rejects_missing_arguments_before_touching_caches() {
    let dir = dataset();
    let service = service(&dir);
    let params = QueryParams::default()
        .with("file", "shard.tar")
        .with("base", "0");

    let mut response = BufferedResponse::default();
    let err = read_bytes(&service, &params, &mut response).unwrap_err();
    match err {
        BrowseError::BadArgument(msg) => assert_eq!(msg, "missing parameter(s): end, k"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(service.archives().stats().misses, 0);
    assert!(service.archives().is_empty());
}

#[test]
fn test_read_bytes_range_and_open_errors() {
    let dir = dataset();
    fs::write(dir.path().join("empty.tar"), b"").unwrap();
    let service = service(&dir);
    let params = |file: &str, base: &str, end: &str| {
        QueryParams::default()
            .with("file", file)
            .with("base", base)
            .with("end", end)
            .with("k", "bin")
    };
    let mut response = BufferedResponse::default();

    let err = read_bytes(&service, &params("shard.tar", "0", "3e9"), &mut response).unwrap_err();
    assert!(matches!(err, BrowseError::Range { len: 1000, .. }));
    assert!(service.archives().contains(&dir.path().canonicalize().unwrap().join("shard.tar")));

    let err = read_bytes(&service, &params("missing.tar", "0", "1"), &mut response).unwrap_err();
    assert!(matches!(err, BrowseError::Open { .. }));

    let err = read_bytes(&service, &params("empty.tar", "0", "0"), &mut response).unwrap_err();
    assert!(matches!(err, BrowseError::Map { .. }));

    let err = read_bytes(&service, &params("../shard.tar", "0", "1"), &mut response).unwrap_err();
    assert!(matches!(err, BrowseError::Path { .. }));

    let err = read_bytes(&service, &params("shard.tar", "xyz", "1"), &mut response).unwrap_err();
    assert!(matches!(err, BrowseError::BadArgument(_)));
}

#[test]
fn test_nested_index_shape_resolves_like_flat() {
    #[derive(Serialize)]
    struct NestedEntry {
        key: &'static str,
        offset: u64,
        size: u64,
    }
    #[derive(Serialize)]
    struct NestedRecord {
        offset: u64,
        str_idx: &'static str,
        iidx: i64,
        entries: Vec<NestedEntry>,
    }

    let dir = dataset();
    let mut buf = Vec::new();
    rmp_serde::encode::write_named(
        &mut buf,
        &NestedRecord {
            offset: 0x100,
            str_idx: "nested",
            iidx: 7,
            entries: vec![
                NestedEntry {
                    key: "cls",
                    offset: 0x10,
                    size: 4,
                },
                NestedEntry {
                    key: "json",
                    offset: 0x20,
                    size: 0x30,
                },
            ],
        },
    )
    .unwrap();
    fs::write(dir.path().join("shard.tar.utix"), buf).unwrap();
    let service = service(&dir);

    let index = service.load_index("shard.tar.utix").unwrap();
    assert_eq!(index.rows.len(), 1);
    let ranges: Vec<(&str, u64, u64)> = index.rows[0]
        .ranges
        .iter()
        .map(|(k, r)| {
            let r = r.unwrap();
            (k.as_str(), r.start, r.end)
        })
        .collect();
    assert_eq!(ranges, vec![("cls", 0x110, 0x114), ("json", 0x120, 0x150)]);

    let bytes = service.read(&index.archive_path, 0x110, 0x114).unwrap();
    assert_eq!(&bytes[..], &shard_bytes(1000)[0x110..0x114]);
}

#[test]
fn test_entry_range_looks_up_single_entry() {
    let dir = dataset();
    let service = service(&dir);

    let range = service
        .entry_range("shard.tar.utix", "sample-0", "jpg")
        .unwrap();
    assert_eq!((range.start, range.end), (0, 500));

    assert!(matches!(
        service.entry_range("shard.tar.utix", "sample-0", "png"),
        Err(BrowseError::NotFound(_))
    ));
    assert!(matches!(
        service.entry_range("shard.tar.utix", "sample-9", "jpg"),
        Err(BrowseError::NotFound(_))
    ));
}

#[test]
fn test_overflowing_entry_leaves_other_rows_visible() {
    let dir = dataset();
    write_index(
        &dir.path().join("shard.tar.utix"),
        &[
            FlatRecord {
                offset: 0,
                str_idx: "good",
                iidx: 0,
                keys: vec!["jpg"],
                offsets: vec![0],
                sizes: vec![500],
            },
            FlatRecord {
                offset: u64::MAX - 1,
                str_idx: "bad",
                iidx: 1,
                keys: vec!["jpg"],
                offsets: vec![0],
                sizes: vec![10],
            },
        ],
    );
    let service = service(&dir);

    let view = load_index(&service, &QueryParams::default().with("path", "shard.tar.utix")).unwrap();
    assert_eq!(view.rows.len(), 2);

    let good = &view.rows[0];
    assert_eq!(good.fields["jpg"], "00000000..000001F4");
    assert_eq!(good.links["jpg"].end, "1f4");

    let bad = &view.rows[1];
    assert_eq!(bad.fields["id"], "bad");
    assert_eq!(bad.fields["jpg"], UNRESOLVED_CELL);
    assert!(bad.links.is_empty());

    assert!(matches!(
        service.entry_range("shard.tar.utix", "bad", "jpg"),
        Err(BrowseError::MalformedIndex { .. })
    ));
}

#[test]
fn test_browsing_missing_or_file_path_is_client_error() {
    let dir = dataset();
    let service = service(&dir);

    for path in ["nope", "shard.tar"] {
        let err = browse(&service, &QueryParams::default().with("path", path)).unwrap_err();
        assert!(matches!(err, BrowseError::Scan { .. }), "{path}: {err}");
        assert_eq!(err.status_class(), StatusClass::ClientError, "{path}");
    }
}
