use std::fs::File;
use std::io::{BufRead, BufReader, Read};

use camino::Utf8Path;
use flate2::read::GzDecoder;
use serde::Serialize;

use crate::domain::{SampleRecord, TriadField};
use crate::error::TriadError;
use crate::store::{SAMPLES, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    JsonLines,
    Tsv,
}

impl SampleFormat {
    /// Picks the format from the file name, looking through a `.gz` suffix.
    pub fn detect(path: &Utf8Path) -> Self {
        let name = path.as_str().to_ascii_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        if name.ends_with(".tsv") || name.ends_with(".txt") {
            SampleFormat::Tsv
        } else {
            SampleFormat::JsonLines
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub source: String,
    pub format: SampleFormat,
    pub rows: usize,
}

/// Loads sample records into the flattened samples collection, replacing
/// whatever was there.
pub fn import_samples(store: &Store, path: &Utf8Path) -> Result<ImportSummary, TriadError> {
    let format = SampleFormat::detect(path);
    let reader = open_reader(path)?;
    let records = match format {
        SampleFormat::JsonLines => read_json_lines(reader)?,
        SampleFormat::Tsv => read_tsv(reader)?,
    };
    store.ensure_root()?;
    store.write_collection(SAMPLES, &records)?;
    tracing::info!(source = %path, rows = records.len(), "imported samples");
    Ok(ImportSummary {
        source: path.to_string(),
        format,
        rows: records.len(),
    })
}

fn open_reader(path: &Utf8Path) -> Result<Box<dyn BufRead>, TriadError> {
    let file = File::open(path.as_std_path())
        .map_err(|err| TriadError::Filesystem(format!("open {path}: {err}")))?;
    let gzipped = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    let inner: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(inner)))
}

pub fn read_json_lines(reader: impl BufRead) -> Result<Vec<SampleRecord>, TriadError> {
    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| TriadError::Filesystem(err.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|err| TriadError::SampleParse {
            line: line_no + 1,
            message: err.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Tab separated with a header row. Columns other than `accession` and the
/// three triad fields are ignored; empty cells read as null.
pub fn read_tsv(reader: impl BufRead) -> Result<Vec<SampleRecord>, TriadError> {
    let mut lines = reader.lines().enumerate();
    let header = match lines.next() {
        Some((_, line)) => line.map_err(|err| TriadError::Filesystem(err.to_string()))?,
        None => return Ok(Vec::new()),
    };
    let columns = header
        .trim_end_matches(['\r', '\n'])
        .split('\t')
        .map(str::trim)
        .collect::<Vec<_>>();
    let position = |name: &str| columns.iter().position(|column| *column == name);
    let accession_col = position("accession").ok_or_else(|| TriadError::SampleParse {
        line: 1,
        message: "header has no accession column".to_string(),
    })?;
    let triad_cols = TriadField::ALL.map(|field| position(field.as_str()));

    let mut records = Vec::new();
    for (line_no, line) in lines {
        let line = line.map_err(|err| TriadError::Filesystem(err.to_string()))?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let cells = line.split('\t').collect::<Vec<_>>();
        let cell = |column: Option<usize>| -> Option<String> {
            column
                .and_then(|index| cells.get(index))
                .filter(|value| !value.is_empty())
                .map(|value| value.to_string())
        };
        let accession = cell(Some(accession_col)).ok_or_else(|| TriadError::SampleParse {
            line: line_no + 1,
            message: "empty accession".to_string(),
        })?;
        records.push(SampleRecord {
            accession,
            env_broad_scale: cell(triad_cols[0]),
            env_local_scale: cell(triad_cols[1]),
            env_medium: cell(triad_cols[2]),
        });
    }
    Ok(records)
}
