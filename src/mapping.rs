use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::table::Table;

pub const DEFAULT_CANONICAL_FIELDS: &[&str] = &[
    "strain", "accession", "fasta", "date", "age", "gender", "region", "country", "division",
    "lineage",
];

/// Ordered mapping from source column names to canonical field names.
///
/// Entry order is significant: it decides the column order of `metadata.tsv`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnMapping {
    entries: Vec<(String, String)>,
}

impl ColumnMapping {
    pub fn new<S, T>(entries: impl IntoIterator<Item = (S, T)>) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(source, target)| (source.into(), target.into()))
                .collect(),
        }
    }

    pub fn identity(fields: &[&str]) -> Self {
        Self::new(fields.iter().map(|field| (*field, *field)))
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Canonical name a source column maps to. Columns that are already
    /// canonical map to themselves; anything else is unmapped.
    pub fn canonical_for(&self, column: &str) -> Option<&str> {
        if let Some((_, target)) = self.entries.iter().find(|(source, _)| source == column) {
            return Some(target.as_str());
        }
        self.entries
            .iter()
            .find(|(_, target)| target == column)
            .map(|(_, target)| target.as_str())
    }

    /// True when the column is a mapping key or an already-canonical name.
    pub fn is_known(&self, column: &str) -> bool {
        self.canonical_for(column).is_some()
    }

    pub fn produces(&self, canonical: &str) -> bool {
        self.entries.iter().any(|(_, target)| target == canonical)
    }

    /// Canonical names in first-seen order, without repeats.
    pub fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();
        for (_, target) in &self.entries {
            if !targets.contains(&target.as_str()) {
                targets.push(target);
            }
        }
        targets
    }
}

/// Renames mapped columns to their canonical names and drops every column that
/// is neither a mapping key nor a canonical name.
///
/// When several columns land on the same canonical name (e.g. two exports
/// spelling "age" differently) the cells are coalesced: the first non-missing
/// value in column order wins.
pub fn map_and_subset(table: &Table, mapping: &ColumnMapping) -> Table {
    let mut columns: Vec<String> = Vec::new();
    let mut sources: Vec<(usize, usize)> = Vec::new();

    for (index, column) in table.columns().iter().enumerate() {
        let Some(target) = mapping.canonical_for(column) else {
            continue;
        };
        let position = match columns.iter().position(|existing| existing == target) {
            Some(position) => position,
            None => {
                columns.push(target.to_string());
                columns.len() - 1
            }
        };
        sources.push((index, position));
    }

    let mut mapped = Table::new(columns);
    let width = mapped.columns().len();
    for row in table.rows() {
        let mut out: Vec<Option<String>> = vec![None; width];
        for &(index, position) in &sources {
            if out[position].is_none() {
                out[position] = row.get(index).cloned().flatten();
            }
        }
        mapped.push_row(out);
    }
    mapped
}

impl Serialize for ColumnMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (source, target) in &self.entries {
            map.serialize_entry(source, target)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ColumnMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = ColumnMapping;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "an object of source column -> canonical field names")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((source, target)) = access.next_entry::<String, String>()? {
                    entries.push((source, target));
                }
                Ok(ColumnMapping { entries })
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}
