use std::fs;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use nextstrain_collector::catalog::FlatFileCatalog;
use nextstrain_collector::config::{ResolvedConfig, TieBreakPolicy};
use nextstrain_collector::dates::DateMode;
use nextstrain_collector::error::CollectorError;
use nextstrain_collector::mapping::ColumnMapping;
use nextstrain_collector::pipeline::{Collector, ProgressEvent, ProgressSink};
use nextstrain_collector::writer::HeaderMode;

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

struct Fixture {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        for dir in ["BNexport", "metadata", "fasta/run1", "fasta/run2/consensus"] {
            fs::create_dir_all(root.join(dir).as_std_path()).unwrap();
        }
        Self { _temp: temp, root }
    }

    fn write(&self, relative: &str, content: &str) -> Utf8PathBuf {
        let path = self.root.join(relative);
        fs::write(path.as_std_path(), content).unwrap();
        path
    }

    fn config(&self, catalog: &Utf8Path) -> ResolvedConfig {
        ResolvedConfig {
            seq_data_path: self.root.join("BNexport"),
            patient_data_dir: self.root.join("metadata"),
            fasta_catalog: catalog.to_path_buf(),
            columns: ColumnMapping::new([
                ("Key", "accession"),
                ("FASTA", "fasta"),
                ("Collection Date", "date"),
                ("ACCESSION", "accession"),
                ("AGE", "age"),
                ("ZONE", "region"),
            ]),
            match_field: "accession".to_string(),
            patient_file_marker: "lab_covid19_cust_tab_output".to_string(),
            tie_break: TieBreakPolicy::Consensus,
            date_mode: DateMode::Iso,
            fasta_headers: HeaderMode::Replace,
        }
    }

    fn output(&self) -> Utf8PathBuf {
        self.root.join("out/nested")
    }
}

fn seed_scenario(fixture: &Fixture) -> Utf8PathBuf {
    fixture.write(
        "BNexport/export.csv",
        "Key,FASTA,Collection Date\nA,A.fasta,2023/03/05\nB,B.fasta,03/06/2023\nB,B.fasta,03/06/2023\n",
    );
    fixture.write(
        "metadata/2023_lab_covid19_cust_tab_output.tsv",
        "ACCESSION\tAGE\tZONE\nA\t19\tNorth\nC\t70\tSouth\n",
    );
    let a = fixture.write("fasta/run1/A.fasta", ">A_raw header\nACGTACGT\n");
    let b = fixture.write("fasta/run1/B.fasta", ">B_raw header\nTTTT\n");
    fixture.write(
        "catalog.txt",
        &format!("{a}\n{b}\n"),
    )
}

#[test]
fn collates_matching_samples_end_to_end() {
    let fixture = Fixture::new();
    let catalog_path = seed_scenario(&fixture);
    let config = fixture.config(&catalog_path);
    let collector = Collector::from_config(config).unwrap();
    let sink = RecordingSink::default();

    let summary = collector.run(&fixture.output(), &sink).unwrap();

    assert_eq!(summary.sequences_found, 3);
    assert_eq!(summary.patient_entries_found, 2);
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.sequences_written, 1);
    assert_eq!(summary.missing_fasta, 0);

    let metadata = fs::read_to_string(fixture.output().join("metadata.tsv").as_std_path()).unwrap();
    assert_eq!(
        metadata,
        "accession\tfasta\tdate\tage\tregion\nA\tA.fasta\t2023-03-05\t0-20\tNorth\n"
    );
    let sequences =
        fs::read_to_string(fixture.output().join("sequences.fasta").as_std_path()).unwrap();
    assert_eq!(sequences, ">A\nACGTACGT\n");

    let messages = sink.messages.lock().unwrap();
    assert_eq!(messages.first().map(String::as_str), Some("retrieving sequencing data"));
    assert!(messages.iter().any(|m| m == "writing FASTAs 1/1"));
}

#[test]
fn deleted_fasta_is_skipped_but_metadata_kept() {
    let fixture = Fixture::new();
    fixture.write("BNexport/export.tsv", "Key\tFASTA\nA\tA.fasta\nD\tD.fasta\n");
    fixture.write(
        "metadata/lab_covid19_cust_tab_output.csv",
        "ACCESSION,AGE\nA,30\nD,40\n",
    );
    let a = fixture.write("fasta/run1/A.fasta", ">x\nAAAA\n");
    let d = fixture.write("fasta/run1/D.fasta", ">y\nCCCC\n");
    let catalog = FlatFileCatalog::from_lines(&format!("{a}\n{d}\n"));
    let collector = Collector::new(fixture.config(&fixture.root.join("unused")), Box::new(catalog));
    fs::remove_file(d.as_std_path()).unwrap();

    let summary = collector.run(&fixture.output(), &RecordingSink::default()).unwrap();

    assert_eq!(summary.matched, 2);
    assert_eq!(summary.sequences_written, 1);
    assert_eq!(summary.missing_fasta, 1);
    let metadata = fs::read_to_string(fixture.output().join("metadata.tsv").as_std_path()).unwrap();
    assert_eq!(metadata.lines().count(), 3);
    let sequences =
        fs::read_to_string(fixture.output().join("sequences.fasta").as_std_path()).unwrap();
    assert_eq!(sequences, ">A\nAAAA\n");
}

#[test]
fn loaded_columns_stay_in_header_when_every_value_is_missing() {
    let fixture = Fixture::new();
    fixture.write("BNexport/export.csv", "Key,FASTA,Collection Date\nA,A.fasta,N/A\n");
    fixture.write(
        "metadata/lab_covid19_cust_tab_output.csv",
        "ACCESSION,AGE,ZONE\nA,30,\n",
    );
    let a = fixture.write("fasta/run1/A.fasta", ">x\nAAAA\n");
    let catalog = fixture.write("catalog.txt", &format!("{a}\n"));
    let collector = Collector::from_config(fixture.config(&catalog)).unwrap();

    collector.run(&fixture.output(), &RecordingSink::default()).unwrap();

    let metadata = fs::read_to_string(fixture.output().join("metadata.tsv").as_std_path()).unwrap();
    assert_eq!(
        metadata,
        "accession\tfasta\tdate\tage\tregion\nA\tA.fasta\t\t20-40\t\n"
    );
}

#[test]
fn no_matches_still_writes_header() {
    let fixture = Fixture::new();
    fixture.write("BNexport/export.csv", "Key,FASTA\nA,A.fasta\n");
    fixture.write("metadata/lab_covid19_cust_tab_output.csv", "ACCESSION,AGE\nZ,30\n");
    let a = fixture.write("fasta/run1/A.fasta", ">x\nAAAA\n");
    let catalog = fixture.write("catalog.txt", &format!("{a}\n"));
    let collector = Collector::from_config(fixture.config(&catalog)).unwrap();

    let summary = collector.run(&fixture.output(), &RecordingSink::default()).unwrap();

    assert_eq!(summary.matched, 0);
    let metadata = fs::read_to_string(fixture.output().join("metadata.tsv").as_std_path()).unwrap();
    assert_eq!(metadata, "accession\tfasta\tage\n");
    let sequences =
        fs::read_to_string(fixture.output().join("sequences.fasta").as_std_path()).unwrap();
    assert!(sequences.is_empty());
}

#[test]
fn keep_headers_copies_fasta_verbatim() {
    let fixture = Fixture::new();
    let catalog_path = seed_scenario(&fixture);
    let mut config = fixture.config(&catalog_path);
    config.fasta_headers = HeaderMode::Keep;
    let collector = Collector::from_config(config).unwrap();

    collector.run(&fixture.output(), &RecordingSink::default()).unwrap();

    let sequences =
        fs::read_to_string(fixture.output().join("sequences.fasta").as_std_path()).unwrap();
    assert_eq!(sequences, ">A_raw header\nACGTACGT\n");
}

#[test]
fn directory_catalog_prefers_consensus_copy() {
    let fixture = Fixture::new();
    fixture.write("BNexport/export.csv", "Key,FASTA\nA,A.fasta\n");
    fixture.write("metadata/lab_covid19_cust_tab_output.tsv", "ACCESSION\nA\n");
    fixture.write("fasta/run1/A.fasta", ">draft\nNNNN\n");
    fixture.write("fasta/run2/consensus/A.fasta", ">final\nACGT\n");
    let config = fixture.config(&fixture.root.join("fasta"));
    let collector = Collector::from_config(config).unwrap();

    collector.run(&fixture.output(), &RecordingSink::default()).unwrap();

    let sequences =
        fs::read_to_string(fixture.output().join("sequences.fasta").as_std_path()).unwrap();
    assert_eq!(sequences, ">A\nACGT\n");
}

#[test]
fn rerun_overwrites_existing_output() {
    let fixture = Fixture::new();
    let catalog_path = seed_scenario(&fixture);
    let collector = Collector::from_config(fixture.config(&catalog_path)).unwrap();

    collector.run(&fixture.output(), &RecordingSink::default()).unwrap();
    let summary = collector.run(&fixture.output(), &RecordingSink::default()).unwrap();

    assert_eq!(summary.sequences_written, 1);
    let sequences =
        fs::read_to_string(fixture.output().join("sequences.fasta").as_std_path()).unwrap();
    assert_eq!(sequences, ">A\nACGTACGT\n");
}

#[test]
fn decimal_date_mode() {
    let fixture = Fixture::new();
    let catalog_path = seed_scenario(&fixture);
    let mut config = fixture.config(&catalog_path);
    config.date_mode = DateMode::Decimal;
    let collector = Collector::from_config(config).unwrap();

    collector.run(&fixture.output(), &RecordingSink::default()).unwrap();

    let metadata = fs::read_to_string(fixture.output().join("metadata.tsv").as_std_path()).unwrap();
    let row = metadata.lines().nth(1).unwrap();
    let date: f64 = row.split('\t').nth(2).unwrap().parse().unwrap();
    assert!((date - (2023.0 + 63.0 / 365.0)).abs() < 1e-9);
}

#[test]
fn missing_sequencing_directory_aborts() {
    let fixture = Fixture::new();
    let catalog_path = fixture.write("catalog.txt", "");
    let mut config = fixture.config(&catalog_path);
    config.seq_data_path = fixture.root.join("nope");
    let collector = Collector::from_config(config).unwrap();

    let err = collector
        .run(&fixture.output(), &RecordingSink::default())
        .unwrap_err();

    assert_matches!(err, CollectorError::NotFound(_));
    assert!(!fixture.output().as_std_path().exists());
}

#[test]
fn missing_catalog_is_not_found() {
    let fixture = Fixture::new();
    let config = fixture.config(&fixture.root.join("missing.txt"));
    let err = Collector::from_config(config).err().unwrap();
    assert_matches!(err, CollectorError::NotFound(_));
}
