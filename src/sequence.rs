use camino::Utf8Path;
use tracing::{debug, info};

use crate::catalog::{DirectoryCatalog, FileCatalog, base_name};
use crate::domain::{FASTA_FIELD, SequenceRecord};
use crate::error::CollectorError;
use crate::mapping::{ColumnMapping, map_and_subset};
use crate::reader::{TableFormat, read_all};
use crate::resolver::{TieBreak, resolve};

#[derive(Debug, Clone, Default)]
pub struct SequenceLoad {
    pub records: Vec<SequenceRecord>,
    /// Malformed rows plus rows without a match-field value.
    pub skipped_rows: usize,
    /// Canonical columns the mapped exports carried.
    pub columns: Vec<String>,
    /// Rows whose FASTA file is not in the catalog.
    pub unresolved: usize,
}

/// Loads every sequencing export below `dir` and resolves each row to one
/// FASTA file from `fasta_catalog`.
///
/// Resolution runs on the raw columns, before the mapping drops anything, so
/// the file-name column is still there when it is needed.
pub fn load_sequencing_data(
    dir: &Utf8Path,
    fasta_catalog: &dyn FileCatalog,
    mapping: &ColumnMapping,
    tie_break: &dyn TieBreak,
    match_field: &str,
) -> Result<SequenceLoad, CollectorError> {
    info!("retrieving sequencing data from {dir}");
    let exports = DirectoryCatalog::scan(dir)?;
    let files = exports
        .entries()
        .iter()
        .filter(|path| {
            let supported = TableFormat::detect(path).is_some();
            if !supported {
                debug!("ignoring {path}: not a table");
            }
            supported
        })
        .collect::<Vec<_>>();

    let loaded = read_all(files, &|column| mapping.is_known(column));
    let resolution = resolve(&loaded.table, mapping, fasta_catalog, tie_break)?;
    let table = map_and_subset(&loaded.table, mapping);

    let mut skipped_rows = loaded.skipped_rows;
    let mut records = Vec::with_capacity(resolution.matches.len());
    for (index, fasta_path) in resolution.matches {
        let fields = table.fields(index);
        let Some(accession) = fields.get(match_field).cloned() else {
            skipped_rows += 1;
            continue;
        };
        let fasta = fields
            .get(FASTA_FIELD)
            .cloned()
            .unwrap_or_else(|| base_name(fasta_path.as_str()).to_string());
        records.push(SequenceRecord {
            accession,
            fasta,
            fasta_path,
            fields,
        });
    }

    info!("found {} sequences", records.len());
    Ok(SequenceLoad {
        records,
        skipped_rows,
        unresolved: resolution.unresolved,
        columns: table.columns().to_vec(),
    })
}
