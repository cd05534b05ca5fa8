use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind, Write};

use camino::Utf8Path;
use clap::ValueEnum;
use csv::WriterBuilder;
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::domain::CollatedRow;
use crate::error::CollectorError;
use crate::mapping::ColumnMapping;
use crate::pipeline::{ProgressEvent, ProgressSink};

/// What happens to the first line of each FASTA file on copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HeaderMode {
    /// Replaced by `>{identifier}`.
    #[default]
    Replace,
    /// Copied as-is with the rest of the file.
    Keep,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceWrite {
    pub written: usize,
    pub missing: usize,
}

/// Columns of `metadata.tsv`: canonical names in mapping order that any loaded
/// table carried, whether or not a collated row has a value for them.
pub fn metadata_columns<'a>(mapping: &'a ColumnMapping, loaded: &[String]) -> Vec<&'a str> {
    mapping
        .targets()
        .into_iter()
        .filter(|column| loaded.iter().any(|name| name == column))
        .collect()
}

/// Writes collated rows as a tab-separated table under `columns`. Missing
/// values are empty; the header is written even when there are no rows.
pub fn write_metadata(
    path: &Utf8Path,
    rows: &[CollatedRow],
    columns: &[&str],
) -> Result<(), CollectorError> {
    info!("generating {path}");
    let mut temp = temp_file_beside(path)?;
    {
        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(BufWriter::new(temp.as_file_mut()));
        writer
            .write_record(columns)
            .map_err(|err| write_error(path, err))?;
        for row in rows {
            writer
                .write_record(columns.iter().map(|column| row.get(column).unwrap_or("")))
                .map_err(|err| write_error(path, err))?;
        }
        writer.flush().map_err(|err| write_error(path, err))?;
    }
    persist(temp, path)
}

/// Concatenates each row's FASTA file into one output. With
/// [`HeaderMode::Replace`] the first line of every file becomes `>{identifier}`.
///
/// Files that disappeared since resolution are skipped and counted as missing.
pub fn write_sequences(
    path: &Utf8Path,
    rows: &[CollatedRow],
    headers: HeaderMode,
    sink: &dyn ProgressSink,
) -> Result<SequenceWrite, CollectorError> {
    info!("generating {path}");
    let mut temp = temp_file_beside(path)?;
    let mut report = SequenceWrite::default();
    {
        let mut out = BufWriter::new(temp.as_file_mut());
        let total = rows.len();
        for (index, row) in rows.iter().enumerate() {
            match append_record(&mut out, row, headers) {
                Ok(()) => report.written += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    report.missing += 1;
                    warn!("{}", CollectorError::MissingFile(row.fasta_path.clone()));
                }
                Err(err) => {
                    return Err(CollectorError::Filesystem(format!(
                        "{}: {err}",
                        row.fasta_path
                    )));
                }
            }
            sink.event(ProgressEvent {
                message: format!("writing FASTAs {}/{total}", index + 1),
                position: Some((index + 1, total)),
            });
        }
        out.flush().map_err(|err| write_error(path, err))?;
    }
    persist(temp, path)?;
    Ok(report)
}

fn append_record(out: &mut impl Write, row: &CollatedRow, headers: HeaderMode) -> io::Result<()> {
    let file = File::open(row.fasta_path.as_std_path())?;
    let mut reader: Box<dyn BufRead> = if row.fasta_path.extension() == Some("gz") {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    if headers == HeaderMode::Replace {
        let mut header = Vec::new();
        reader.read_until(b'\n', &mut header)?;
        writeln!(out, ">{}", row.identifier())?;
    }

    let mut last = None;
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        out.write_all(buf)?;
        last = buf.last().copied();
        let len = buf.len();
        reader.consume(len);
    }
    if last.is_some_and(|byte| byte != b'\n') {
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn temp_file_beside(path: &Utf8Path) -> Result<NamedTempFile, CollectorError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    tempfile::Builder::new()
        .prefix(".collector")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| write_error(path, err))
}

fn persist(temp: NamedTempFile, path: &Utf8Path) -> Result<(), CollectorError> {
    if path.as_std_path().exists() {
        fs::remove_file(path.as_std_path()).map_err(|err| write_error(path, err))?;
    }
    temp.persist(path.as_std_path())
        .map_err(|err| write_error(path, err))?;
    Ok(())
}

fn write_error(path: &Utf8Path, err: impl std::fmt::Display) -> CollectorError {
    CollectorError::Filesystem(format!("write {path}: {err}"))
}
