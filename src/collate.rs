use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::domain::{CollatedRow, PatientRecord, SequenceRecord};

/// Keeps the first record for every key, preserving input order.
pub fn deduplicate<T: Clone>(records: &[T], key: impl Fn(&T) -> &str) -> Vec<T> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|record| seen.insert(key(*record).to_string()))
        .cloned()
        .collect()
}

/// Inner-joins sequencing and patient records on their match-field value after
/// de-duplicating both sides. Output follows sequencing order.
///
/// Where both sides carry the same field, the sequencing value wins and the
/// patient value only fills gaps.
pub fn collate(
    sequences: &[SequenceRecord],
    patients: &[PatientRecord],
    match_field: &str,
) -> Vec<CollatedRow> {
    let sequences = deduplicate(sequences, |record| record.accession.as_str());
    let patients = deduplicate(patients, |record| record.accession.as_str());
    let by_accession: HashMap<&str, &PatientRecord> = patients
        .iter()
        .map(|record| (record.accession.as_str(), record))
        .collect();

    let rows = sequences
        .into_iter()
        .filter_map(|sequence| {
            let patient = by_accession.get(sequence.accession.as_str())?;
            let mut fields = patient.fields.clone();
            fields.extend(sequence.fields);
            fields.insert(match_field.to_string(), sequence.accession.clone());
            Some(CollatedRow {
                accession: sequence.accession,
                fasta_path: sequence.fasta_path,
                fields,
            })
        })
        .collect::<Vec<_>>();

    info!("matched {} sequences to metadata", rows.len());
    rows
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;
    use crate::domain::Fields;

    fn sequence(accession: &str, lineage: &str) -> SequenceRecord {
        let mut fields = Fields::new();
        fields.insert("accession".to_string(), accession.to_string());
        fields.insert("lineage".to_string(), lineage.to_string());
        SequenceRecord {
            accession: accession.to_string(),
            fasta: format!("{accession}.fasta"),
            fasta_path: Utf8PathBuf::from(format!("/db/{accession}.fasta")),
            fields,
        }
    }

    fn patient(accession: &str, region: &str) -> PatientRecord {
        let mut fields = Fields::new();
        fields.insert("accession".to_string(), accession.to_string());
        fields.insert("region".to_string(), region.to_string());
        fields.insert("lineage".to_string(), "from-patient".to_string());
        PatientRecord {
            accession: accession.to_string(),
            fields,
        }
    }

    #[test]
    fn deduplicate_keeps_first_occurrence() {
        let records = vec![sequence("B", "1"), sequence("A", "2"), sequence("B", "3")];
        let unique = deduplicate(&records, |r| r.accession.as_str());
        let seen: Vec<(&str, &str)> = unique
            .iter()
            .map(|r| (r.accession.as_str(), r.fields["lineage"].as_str()))
            .collect();
        assert_eq!(seen, [("B", "1"), ("A", "2")]);
    }

    #[test]
    fn inner_join_drops_one_sided_rows() {
        let sequences = vec![sequence("A", "BA.2"), sequence("B", "XBB"), sequence("B", "XBB")];
        let patients = vec![patient("A", "North"), patient("C", "South"), patient("A", "Edmonton")];

        let rows = collate(&sequences, &patients, "accession");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].accession, "A");
        assert_eq!(rows[0].get("region"), Some("North"));
        assert_eq!(rows[0].get("lineage"), Some("BA.2"));
        assert_eq!(rows[0].fasta_path.as_str(), "/db/A.fasta");
    }

    #[test]
    fn output_never_exceeds_either_distinct_side() {
        let sequences = vec![sequence("A", "x"), sequence("B", "x"), sequence("C", "x")];
        let patients = vec![patient("B", "r"), patient("C", "r"), patient("C", "r"), patient("D", "r")];

        let rows = collate(&sequences, &patients, "accession");

        let accessions: Vec<&str> = rows.iter().map(|r| r.accession.as_str()).collect();
        assert_eq!(accessions, ["B", "C"]);
    }
}
