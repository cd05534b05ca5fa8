use std::io::{self, Write};

use serde::Serialize;

use crate::pipeline::{CollectSummary, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &CollectSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable progress on stderr. Row-level events are throttled.
pub struct TextProgress {
    every: usize,
}

impl TextProgress {
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
        }
    }

    pub fn print_summary(summary: &CollectSummary) -> io::Result<()> {
        let mut stdout = io::stdout();
        write!(stdout, "{}", render_summary(summary))?;
        stdout.flush()
    }
}

impl Default for TextProgress {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ProgressSink for TextProgress {
    fn event(&self, event: ProgressEvent) {
        let mut stderr = io::stderr();
        let _ = match event.position {
            Some((done, total)) if done == total => writeln!(stderr, "\r{}", event.message),
            Some((done, _)) if done % self.every == 0 => write!(stderr, "\r{}", event.message),
            Some(_) => Ok(()),
            None => writeln!(stderr, "{}", event.message),
        };
    }
}

pub fn render_summary(summary: &CollectSummary) -> String {
    let mut text = String::new();
    text.push_str("\nAuspice output generated!\n");
    text.push_str("-------------------------\n");
    text.push_str(&format!("Found {} sequences\n", summary.sequences_found));
    text.push_str(&format!(
        "Found {} patient metadata entries\n",
        summary.patient_entries_found
    ));
    text.push_str(&format!(
        "Matched {} sequences to metadata\n",
        summary.matched
    ));
    text.push_str(&format!(
        "Wrote {} sequences ({} FASTA files missing)\n",
        summary.sequences_written, summary.missing_fasta
    ));
    if summary.unresolved_fasta > 0 || summary.skipped_rows > 0 {
        text.push_str(&format!(
            "Skipped {} rows without a FASTA file and {} malformed rows\n",
            summary.unresolved_fasta, summary.skipped_rows
        ));
    }
    text.push_str("-------------------------\n");
    text.push_str("Saved to:\n");
    text.push_str(&format!("Sequences: {}\n", summary.sequences_path));
    text.push_str(&format!("Metadata: {}\n", summary.metadata_path));
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_reports_counts() {
        let summary = CollectSummary {
            sequences_found: 3,
            patient_entries_found: 2,
            matched: 1,
            sequences_written: 1,
            missing_fasta: 0,
            unresolved_fasta: 0,
            skipped_rows: 0,
            metadata_path: "out/metadata.tsv".to_string(),
            sequences_path: "out/sequences.fasta".to_string(),
        };

        let text = render_summary(&summary);

        assert!(text.contains("Found 3 sequences"));
        assert!(text.contains("Found 2 patient metadata entries"));
        assert!(text.contains("Matched 1 sequences to metadata"));
        assert!(!text.contains("Skipped"));
        assert!(text.ends_with("Metadata: out/metadata.tsv\n"));
    }
}
