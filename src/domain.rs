use std::collections::BTreeMap;
use std::fmt;

use camino::Utf8PathBuf;
use serde::Serialize;

/// Canonical field values of one record. Absent keys are missing values.
pub type Fields = BTreeMap<String, String>;

pub const FASTA_FIELD: &str = "fasta";
pub const AGE_FIELD: &str = "age";
pub const STRAIN_FIELD: &str = "strain";

/// One sequenced sample, resolved to a single FASTA file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    pub accession: String,
    pub fasta: String,
    pub fasta_path: Utf8PathBuf,
    pub fields: Fields,
}

/// One patient metadata entry. `fields["age"]`, when present, already holds an
/// [`AgeBand`] label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientRecord {
    pub accession: String,
    pub fields: Fields,
}

/// The join of one [`SequenceRecord`] and one [`PatientRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollatedRow {
    pub accession: String,
    pub fasta_path: Utf8PathBuf,
    pub fields: Fields,
}

impl CollatedRow {
    /// Name written to the FASTA header: the strain if known, else the accession.
    pub fn identifier(&self) -> &str {
        self.fields
            .get(STRAIN_FIELD)
            .map(String::as_str)
            .unwrap_or(&self.accession)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AgeBand {
    Under20,
    From20To40,
    From40To60,
    From60To80,
    From80To100,
    Over100,
}

impl AgeBand {
    const BINS: [(f64, f64, AgeBand); 6] = [
        (0.0, 20.0, AgeBand::Under20),
        (20.0, 40.0, AgeBand::From20To40),
        (40.0, 60.0, AgeBand::From40To60),
        (60.0, 80.0, AgeBand::From60To80),
        (80.0, 100.0, AgeBand::From80To100),
        (100.0, 1000.0, AgeBand::Over100),
    ];

    /// Buckets an age into a closed-open band. Ages below 0 or at/above 1000
    /// fall outside every band.
    pub fn from_age(age: f64) -> Option<Self> {
        Self::BINS
            .iter()
            .find(|(lower, upper, _)| age >= *lower && age < *upper)
            .map(|(_, _, band)| *band)
    }

    /// Parses a raw cell. Non-numeric values have no band.
    pub fn parse(raw: &str) -> Option<Self> {
        let age = raw.trim().parse::<f64>().ok()?;
        if age.is_nan() {
            return None;
        }
        Self::from_age(age)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeBand::Under20 => "0-20",
            AgeBand::From20To40 => "20-40",
            AgeBand::From40To60 => "40-60",
            AgeBand::From60To80 => "60-80",
            AgeBand::From80To100 => "80-100",
            AgeBand::Over100 => "100+",
        }
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_band_edges() {
        assert_eq!(AgeBand::parse("19"), Some(AgeBand::Under20));
        assert_eq!(AgeBand::parse("20"), Some(AgeBand::From20To40));
        assert_eq!(AgeBand::parse("0"), Some(AgeBand::Under20));
        assert_eq!(AgeBand::parse("99.5"), Some(AgeBand::From80To100));
        assert_eq!(AgeBand::parse("100"), Some(AgeBand::Over100));
        assert_eq!(AgeBand::parse("999"), Some(AgeBand::Over100));
    }

    #[test]
    fn age_band_out_of_range_or_non_numeric() {
        assert_eq!(AgeBand::parse("-5"), None);
        assert_eq!(AgeBand::parse("1000"), None);
        assert_eq!(AgeBand::parse("unknown"), None);
        assert_eq!(AgeBand::parse("NaN"), None);
    }

    #[test]
    fn identifier_prefers_strain() {
        let mut row = CollatedRow {
            accession: "A".to_string(),
            fasta_path: Utf8PathBuf::from("/data/A.fasta"),
            fields: Fields::new(),
        };
        assert_eq!(row.identifier(), "A");
        row.fields
            .insert(STRAIN_FIELD.to_string(), "Canada/AB-A/2023".to_string());
        assert_eq!(row.identifier(), "Canada/AB-A/2023");
    }
}
