use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CollectorError {
    #[error("directory does not exist: {0}")]
    #[diagnostic(help("check the input paths in the config file"))]
    NotFound(Utf8PathBuf),

    #[error("required column '{column}' is missing from {context}")]
    Schema { column: String, context: String },

    #[error("malformed row {line} in {path}: {message}")]
    Parse {
        path: Utf8PathBuf,
        line: u64,
        message: String,
    },

    #[error("FASTA file no longer exists: {0}")]
    MissingFile(Utf8PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("failed to read table {path}: {message}")]
    TableRead { path: Utf8PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl CollectorError {
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            CollectorError::ConfigRead(_)
                | CollectorError::ConfigParse(_)
                | CollectorError::ConfigInvalid(_)
        )
    }
}
