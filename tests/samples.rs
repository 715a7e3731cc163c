use std::fs::File;
use std::io::Write;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::tempdir;

use envtriad::domain::SampleRecord;
use envtriad::error::TriadError;
use envtriad::samples::{SampleFormat, import_samples};
use envtriad::store::{SAMPLES, Store};

fn utf8(path: std::path::PathBuf) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path).unwrap()
}

#[test]
fn import_json_lines() {
    let dir = tempdir().unwrap();
    let source = utf8(dir.path().join("samples.jsonl"));
    std::fs::write(
        &source,
        "{\"accession\":\"SAMN1\",\"env_medium\":\"soil\"}\n\n{\"accession\":\"SAMN2\",\"env_broad_scale\":7}\n",
    )
    .unwrap();
    let store = Store::open(utf8(dir.path().join("store")));

    let summary = import_samples(&store, &source).unwrap();
    assert_eq!(summary.rows, 2);
    assert_eq!(summary.format, SampleFormat::JsonLines);

    let records: Vec<SampleRecord> = store.read(SAMPLES).unwrap();
    assert_eq!(records[0].env_medium.as_deref(), Some("soil"));
    assert_eq!(records[1].env_broad_scale.as_deref(), Some("7"));
}

#[test]
fn import_gzipped_tsv() {
    let dir = tempdir().unwrap();
    let source = utf8(dir.path().join("samples.tsv.gz"));
    let mut encoder = GzEncoder::new(File::create(&source).unwrap(), Compression::default());
    encoder
        .write_all(b"accession\tenv_broad_scale\tenv_local_scale\tenv_medium\nSAMN1\tforest biome\t\tsoil\n")
        .unwrap();
    encoder.finish().unwrap();
    let store = Store::open(utf8(dir.path().join("store")));

    let summary = import_samples(&store, &source).unwrap();
    assert_eq!(summary.format, SampleFormat::Tsv);
    let records: Vec<SampleRecord> = store.read(SAMPLES).unwrap();
    assert_eq!(
        records,
        vec![SampleRecord {
            accession: "SAMN1".to_string(),
            env_broad_scale: Some("forest biome".to_string()),
            env_local_scale: None,
            env_medium: Some("soil".to_string()),
        }]
    );
}

#[test]
fn uppercase_gzip_suffix_is_decompressed() {
    let dir = tempdir().unwrap();
    let source = utf8(dir.path().join("samples.TSV.GZ"));
    let mut encoder = GzEncoder::new(File::create(&source).unwrap(), Compression::default());
    encoder
        .write_all(b"accession\tenv_medium\nSAMN9\tsea water\n")
        .unwrap();
    encoder.finish().unwrap();
    let store = Store::open(utf8(dir.path().join("store")));

    let summary = import_samples(&store, &source).unwrap();
    assert_eq!(summary.format, SampleFormat::Tsv);
    assert_eq!(summary.rows, 1);
    let records: Vec<SampleRecord> = store.read(SAMPLES).unwrap();
    assert_eq!(records[0].accession, "SAMN9");
    assert_eq!(records[0].env_medium.as_deref(), Some("sea water"));
}

#[test]
fn malformed_line_reports_its_number() {
    let dir = tempdir().unwrap();
    let source = utf8(dir.path().join("samples.jsonl"));
    std::fs::write(&source, "{\"accession\":\"SAMN1\"}\n{\"env_medium\":\"soil\"}\n").unwrap();
    let store = Store::open(utf8(dir.path().join("store")));

    let err = import_samples(&store, &source).unwrap_err();
    assert_matches!(err, TriadError::SampleParse { line: 2, .. });
}

#[test]
fn missing_source_is_a_filesystem_error() {
    let dir = tempdir().unwrap();
    let store = Store::open(utf8(dir.path().join("store")));
    let err = import_samples(&store, Utf8Path::new("/nonexistent/samples.jsonl")).unwrap_err();
    assert_matches!(err, TriadError::Filesystem(_));
}
