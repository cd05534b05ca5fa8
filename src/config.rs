use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::dates::DateMode;
use crate::domain::FASTA_FIELD;
use crate::error::CollectorError;
use crate::mapping::{ColumnMapping, DEFAULT_CANONICAL_FIELDS};
use crate::writer::HeaderMode;

pub const DEFAULT_MATCH_FIELD: &str = "accession";
pub const DEFAULT_PATIENT_FILE_MARKER: &str = "lab_covid19_cust_tab_output";

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub seq_data_path: String,
    pub patient_data_dir: String,
    #[serde(rename = "routineSeqDB")]
    pub routine_seq_db: String,
    #[serde(default)]
    pub columns: Option<ColumnMapping>,
    #[serde(default)]
    pub match_field: Option<String>,
    #[serde(default)]
    pub patient_file_marker: Option<String>,
    #[serde(default)]
    pub tie_break: Option<TieBreakPolicy>,
    #[serde(default)]
    pub date_mode: Option<DateMode>,
    #[serde(default)]
    pub fasta_headers: Option<HeaderMode>,
}

/// How the resolver picks between FASTA candidates that share a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TieBreakPolicy {
    /// A path containing "consensus" wins; otherwise the lexicographically first.
    #[default]
    Consensus,
    /// The lexicographically first path wins.
    Lexicographic,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub seq_data_path: Utf8PathBuf,
    pub patient_data_dir: Utf8PathBuf,
    pub fasta_catalog: Utf8PathBuf,
    pub columns: ColumnMapping,
    pub match_field: String,
    pub patient_file_marker: String,
    pub tie_break: TieBreakPolicy,
    pub date_mode: DateMode,
    pub fasta_headers: HeaderMode,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: &str) -> Result<ResolvedConfig, CollectorError> {
        let config_path = PathBuf::from(path);
        let content = fs::read_to_string(&config_path)
            .map_err(|_| CollectorError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CollectorError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CollectorError> {
        let columns = config
            .columns
            .unwrap_or_else(|| ColumnMapping::identity(DEFAULT_CANONICAL_FIELDS));
        let match_field = config
            .match_field
            .unwrap_or_else(|| DEFAULT_MATCH_FIELD.to_string());

        if columns.entries().is_empty() {
            return Err(CollectorError::ConfigInvalid(
                "column mapping is empty".to_string(),
            ));
        }
        for required in [FASTA_FIELD, match_field.as_str()] {
            if !columns.produces(required) {
                return Err(CollectorError::ConfigInvalid(format!(
                    "column mapping does not produce the '{required}' field"
                )));
            }
        }

        Ok(ResolvedConfig {
            seq_data_path: non_empty_path("seqDataPath", config.seq_data_path)?,
            patient_data_dir: non_empty_path("patientDataDir", config.patient_data_dir)?,
            fasta_catalog: non_empty_path("routineSeqDB", config.routine_seq_db)?,
            columns,
            match_field,
            patient_file_marker: config
                .patient_file_marker
                .unwrap_or_else(|| DEFAULT_PATIENT_FILE_MARKER.to_string()),
            tie_break: config.tie_break.unwrap_or_default(),
            date_mode: config.date_mode.unwrap_or_default(),
            fasta_headers: config.fasta_headers.unwrap_or_default(),
        })
    }
}

fn non_empty_path(key: &str, value: String) -> Result<Utf8PathBuf, CollectorError> {
    if value.trim().is_empty() {
        return Err(CollectorError::ConfigInvalid(format!("{key} is empty")));
    }
    Ok(Utf8PathBuf::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_keys() {
        let config: Config = serde_json::from_str(
            r#"{
                "seqDataPath": "/data/BNexport",
                "patientDataDir": "/data/metadata",
                "routineSeqDB": "/data/routineSeqDB.txt"
            }"#,
        )
        .unwrap();

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.match_field, "accession");
        assert_eq!(resolved.patient_file_marker, DEFAULT_PATIENT_FILE_MARKER);
        assert_eq!(resolved.tie_break, TieBreakPolicy::Consensus);
        assert_eq!(resolved.date_mode, DateMode::Iso);
        assert_eq!(resolved.fasta_headers, HeaderMode::Replace);
        assert!(resolved.columns.produces("strain"));
        assert_eq!(resolved.fasta_catalog, Utf8PathBuf::from("/data/routineSeqDB.txt"));
    }
}
