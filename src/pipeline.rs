use std::fs;

use camino::Utf8Path;
use serde::Serialize;
use tracing::info;

use crate::catalog::{self, FileCatalog};
use crate::collate::collate;
use crate::config::ResolvedConfig;
use crate::dates::normalize_dates;
use crate::error::CollectorError;
use crate::metadata::load_patient_metadata;
use crate::sequence::load_sequencing_data;
use crate::writer::{metadata_columns, write_metadata, write_sequences};

pub const METADATA_FILE: &str = "metadata.tsv";
pub const SEQUENCES_FILE: &str = "sequences.fasta";

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    /// `(done, total)` while writing per-sample output.
    pub position: Option<(usize, usize)>,
}

impl ProgressEvent {
    pub fn phase(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectSummary {
    pub sequences_found: usize,
    pub patient_entries_found: usize,
    pub matched: usize,
    pub sequences_written: usize,
    pub missing_fasta: usize,
    pub unresolved_fasta: usize,
    pub skipped_rows: usize,
    pub metadata_path: String,
    pub sequences_path: String,
}

pub struct Collector {
    config: ResolvedConfig,
    catalog: Box<dyn FileCatalog>,
}

impl Collector {
    pub fn new(config: ResolvedConfig, catalog: Box<dyn FileCatalog>) -> Self {
        Self { config, catalog }
    }

    /// Opens the FASTA catalog named in the config.
    pub fn from_config(config: ResolvedConfig) -> Result<Self, CollectorError> {
        let catalog = catalog::open(&config.fasta_catalog)?;
        Ok(Self::new(config, catalog))
    }

    /// Runs the whole collation and writes `metadata.tsv` and `sequences.fasta`
    /// into `output`, creating it if needed.
    pub fn run(
        &self,
        output: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<CollectSummary, CollectorError> {
        let config = &self.config;
        let tie_break = config.tie_break.tie_break();

        sink.event(ProgressEvent::phase("retrieving sequencing data"));
        let sequences = load_sequencing_data(
            &config.seq_data_path,
            self.catalog.as_ref(),
            &config.columns,
            tie_break.as_ref(),
            &config.match_field,
        )?;

        sink.event(ProgressEvent::phase("retrieving patient metadata"));
        let patients = load_patient_metadata(
            &config.patient_data_dir,
            &config.columns,
            &config.patient_file_marker,
            &config.match_field,
        )?;

        fs::create_dir_all(output.as_std_path())
            .map_err(|err| CollectorError::Filesystem(format!("create {output}: {err}")))?;
        let metadata_path = output.join(METADATA_FILE);
        let sequences_path = output.join(SEQUENCES_FILE);

        sink.event(ProgressEvent::phase("collating"));
        let rows = collate(&sequences.records, &patients.records, &config.match_field);
        let rows = normalize_dates(rows, config.date_mode);

        sink.event(ProgressEvent::phase(format!("generating {METADATA_FILE}")));
        let loaded = [sequences.columns.as_slice(), patients.columns.as_slice()].concat();
        let columns = metadata_columns(&config.columns, &loaded);
        write_metadata(&metadata_path, &rows, &columns)?;

        sink.event(ProgressEvent::phase(format!("generating {SEQUENCES_FILE}")));
        let written = write_sequences(&sequences_path, &rows, config.fasta_headers, sink)?;

        let summary = CollectSummary {
            sequences_found: sequences.records.len(),
            patient_entries_found: patients.records.len(),
            matched: rows.len(),
            sequences_written: written.written,
            missing_fasta: written.missing,
            unresolved_fasta: sequences.unresolved,
            skipped_rows: sequences.skipped_rows + patients.skipped_rows,
            metadata_path: metadata_path.to_string(),
            sequences_path: sequences_path.to_string(),
        };
        info!(
            matched = summary.matched,
            written = summary.sequences_written,
            "collation finished"
        );
        Ok(summary)
    }
}
