use camino::Utf8Path;
use tracing::{debug, info};

use crate::catalog::{DirectoryCatalog, FileCatalog};
use crate::domain::{AGE_FIELD, AgeBand, PatientRecord};
use crate::error::CollectorError;
use crate::mapping::{ColumnMapping, map_and_subset};
use crate::reader::{TableFormat, read_all};

#[derive(Debug, Clone, Default)]
pub struct PatientLoad {
    pub records: Vec<PatientRecord>,
    /// Malformed rows plus rows without a match-field value.
    pub skipped_rows: usize,
    /// Canonical columns the mapped exports carried.
    pub columns: Vec<String>,
}

/// Loads every patient export below `dir` whose file name contains `marker`.
///
/// Files are read in sorted path order and concatenated before the column
/// mapping is applied. A canonical `age` is replaced by its band label; ages
/// that are non-numeric or outside every band become missing.
pub fn load_patient_metadata(
    dir: &Utf8Path,
    mapping: &ColumnMapping,
    marker: &str,
    match_field: &str,
) -> Result<PatientLoad, CollectorError> {
    info!("retrieving patient metadata from {dir}");
    let catalog = DirectoryCatalog::scan(dir)?;
    let files = catalog
        .search(marker)
        .into_iter()
        .filter(|path| {
            let supported = TableFormat::detect(path).is_some();
            if !supported {
                debug!("ignoring {path}: not a table");
            }
            supported
        })
        .collect::<Vec<_>>();

    let loaded = read_all(files, &|column| mapping.is_known(column));
    let table = map_and_subset(&loaded.table, mapping);

    let mut skipped_rows = loaded.skipped_rows;
    let mut records = Vec::with_capacity(table.len());
    for index in 0..table.len() {
        let mut fields = table.fields(index);
        let Some(accession) = fields.get(match_field).cloned() else {
            skipped_rows += 1;
            continue;
        };
        if let Some(raw) = fields.remove(AGE_FIELD)
            && let Some(band) = AgeBand::parse(&raw)
        {
            fields.insert(AGE_FIELD.to_string(), band.label().to_string());
        }
        records.push(PatientRecord { accession, fields });
    }

    info!("found {} patient metadata entries", records.len());
    Ok(PatientLoad {
        records,
        skipped_rows,
        columns: table.columns().to_vec(),
    })
}
