use std::collections::HashMap;

use camino::Utf8PathBuf;
use tracing::{debug, info};

use crate::catalog::{FileCatalog, base_name};
use crate::config::TieBreakPolicy;
use crate::domain::FASTA_FIELD;
use crate::error::CollectorError;
use crate::mapping::ColumnMapping;
use crate::table::Table;

pub const CONSENSUS_MARKER: &str = "consensus";

/// Picks one FASTA file among candidates sharing a file name.
pub trait TieBreak {
    fn choose<'a>(&self, candidates: &[&'a Utf8PathBuf]) -> Option<&'a Utf8PathBuf>;
}

/// Any path containing "consensus" beats the rest; ties inside either group go
/// to the lexicographically smallest path.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferConsensus;

impl TieBreak for PreferConsensus {
    fn choose<'a>(&self, candidates: &[&'a Utf8PathBuf]) -> Option<&'a Utf8PathBuf> {
        candidates
            .iter()
            .copied()
            .filter(|path| path.as_str().contains(CONSENSUS_MARKER))
            .min()
            .or_else(|| Lexicographic.choose(candidates))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Lexicographic;

impl TieBreak for Lexicographic {
    fn choose<'a>(&self, candidates: &[&'a Utf8PathBuf]) -> Option<&'a Utf8PathBuf> {
        candidates.iter().copied().min()
    }
}

impl TieBreakPolicy {
    pub fn tie_break(self) -> Box<dyn TieBreak> {
        match self {
            TieBreakPolicy::Consensus => Box::new(PreferConsensus),
            TieBreakPolicy::Lexicographic => Box::new(Lexicographic),
        }
    }
}

/// Rows that found a FASTA file, by row index, in input order.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub matches: Vec<(usize, Utf8PathBuf)>,
    pub unresolved: usize,
}

/// Attaches exactly one catalog path to each row whose FASTA file name is known
/// to the catalog. Rows without a candidate are dropped.
///
/// The file-name column is the canonical `fasta` column, or any source column
/// the mapping renames to it.
pub fn resolve(
    table: &Table,
    mapping: &ColumnMapping,
    catalog: &dyn FileCatalog,
    tie_break: &dyn TieBreak,
) -> Result<Resolution, CollectorError> {
    info!("retrieving FASTA files");
    let column = fasta_column(table, mapping).ok_or_else(|| CollectorError::Schema {
        column: FASTA_FIELD.to_string(),
        context: "sequencing data".to_string(),
    })?;

    let groups = catalog.group_by_name();
    let mut chosen: HashMap<&str, Option<&Utf8PathBuf>> = HashMap::new();
    let mut resolution = Resolution::default();

    for (index, row) in table.rows().iter().enumerate() {
        let Some(name) = row[column].as_deref().map(base_name) else {
            resolution.unresolved += 1;
            continue;
        };
        let pick = *chosen.entry(name).or_insert_with(|| {
            let candidates = groups.get(name).map(Vec::as_slice).unwrap_or(&[]);
            if candidates.len() > 1 {
                debug!("{} candidates for {name}", candidates.len());
            }
            tie_break.choose(candidates)
        });
        match pick {
            Some(path) => resolution.matches.push((index, path.clone())),
            None => {
                debug!("no FASTA file in catalog for {name}");
                resolution.unresolved += 1;
            }
        }
    }

    info!(
        "resolved {} FASTA files, {} rows without a file",
        resolution.matches.len(),
        resolution.unresolved
    );
    Ok(resolution)
}

fn fasta_column(table: &Table, mapping: &ColumnMapping) -> Option<usize> {
    table.column_index(FASTA_FIELD).or_else(|| {
        table
            .columns()
            .iter()
            .position(|column| mapping.canonical_for(column) == Some(FASTA_FIELD))
    })
}
