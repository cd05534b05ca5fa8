use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use nextstrain_collector::config::{ConfigLoader, TieBreakPolicy};
use nextstrain_collector::dates::DateMode;
use nextstrain_collector::error::CollectorError;
use nextstrain_collector::output::{JsonOutput, OutputMode, TextProgress};
use nextstrain_collector::pipeline::Collector;
use nextstrain_collector::writer::HeaderMode;

#[derive(Parser)]
#[command(name = "collector")]
#[command(
    about = "Collect SARS-CoV-2 sequencing data and patient metadata into Nextstrain's sequences.fasta and metadata.tsv"
)]
#[command(version, author)]
struct Cli {
    /// JSON config with seqDataPath, patientDataDir, routineSeqDB and optional columns.
    #[arg(short, long)]
    config: String,

    /// Output folder; created if missing.
    #[arg(short, long)]
    output: Utf8PathBuf,

    /// Print the run summary as JSON and suppress progress output.
    #[arg(long)]
    json: bool,

    #[arg(long, value_enum)]
    tie_break: Option<TieBreakPolicy>,

    #[arg(long, value_enum)]
    date_mode: Option<DateMode>,

    /// Keep each FASTA file's own header line instead of writing `>{strain}`.
    #[arg(long)]
    keep_headers: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CollectorError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CollectorError) -> u8 {
    match error {
        err if err.is_config() => 2,
        CollectorError::NotFound(_) => 2,
        CollectorError::Schema { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let mut config = ConfigLoader::resolve(&cli.config)?;
    if let Some(tie_break) = cli.tie_break {
        config.tie_break = tie_break;
    }
    if let Some(date_mode) = cli.date_mode {
        config.date_mode = date_mode;
    }
    if cli.keep_headers {
        config.fasta_headers = HeaderMode::Keep;
    }

    let collector = Collector::from_config(config)?;
    match output_mode {
        OutputMode::Interactive => {
            let progress = TextProgress::default();
            let summary = collector.run(&cli.output, &progress)?;
            TextProgress::print_summary(&summary).into_diagnostic()?;
        }
        OutputMode::NonInteractive => {
            let summary = collector.run(&cli.output, &JsonOutput)?;
            JsonOutput::print_summary(&summary).into_diagnostic()?;
        }
    }
    Ok(())
}
