use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, ValueHint};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use trailkit::qr::{parse_jobs, run_batch, JobOutcome, SkippedLine};

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate one QR-code PNG per name,link input line", long_about = None)]
struct Cli {
    /// Input text file, one `name,link` record per line
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Directory for the generated PNG files
    #[arg(value_hint = ValueHint::DirPath)]
    out_dir: Option<PathBuf>,

    /// Write skipped lines and per-job outcomes as JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    report: Option<PathBuf>,

    /// Exit non-zero when the batch aborts or any job fails
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Serialize)]
struct BatchReport<'a> {
    skipped: &'a [SkippedLine],
    outcomes: &'a [JobOutcome],
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let (Some(input), Some(out_dir)) = (cli.input.as_deref(), cli.out_dir.as_deref()) else {
        println!("Usage: qr_batch <input.txt> <output_dir>");
        println!();
        println!("Example: qr_batch trails.csv qr_codes");
        return ExitCode::from(1);
    };

    match run(input, out_dir, cli.report.as_deref()) {
        Ok(failed_jobs) => {
            if cli.strict && failed_jobs > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            error!("{:#}", err);
            if cli.strict {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    }
}

/// Run the batch and return the number of failed jobs.
fn run(input: &Path, out_dir: &Path, report: Option<&Path>) -> Result<usize> {
    if !input.exists() {
        bail!("input data file not found: {}", input.display());
    }

    if !out_dir.exists() {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;
        info!("Created output directory: {}", out_dir.display());
    }

    let file =
        File::open(input).with_context(|| format!("failed to open {}", input.display()))?;
    let parsed = parse_jobs(BufReader::new(file))
        .with_context(|| format!("failed to read {}", input.display()))?;

    for skip in &parsed.skipped {
        warn!(
            "Line {}: {}; expected format: name,link",
            skip.line, skip.reason
        );
    }

    if parsed.jobs.is_empty() {
        bail!("{} contains no valid data", input.display());
    }
    info!("Found {} records to process", parsed.jobs.len());

    let outcomes = run_batch(&parsed.jobs, out_dir);

    let mut written = 0usize;
    let mut failed = 0usize;
    for outcome in &outcomes {
        match outcome {
            JobOutcome::Written { label, path } => {
                written += 1;
                info!("Wrote QR code for '{}': {}", label, path.display());
            }
            JobOutcome::Failed {
                label,
                payload,
                reason,
            } => {
                failed += 1;
                error!(
                    "QR generation failed for '{}' (payload '{}'): {}",
                    label, payload, reason
                );
            }
        }
    }
    info!(
        "QR batch complete: {} written, {} failed, {} lines skipped",
        written,
        failed,
        parsed.skipped.len()
    );

    if let Some(report_path) = report {
        let report_file = File::create(report_path)
            .with_context(|| format!("failed to create {}", report_path.display()))?;
        serde_json::to_writer_pretty(
            report_file,
            &BatchReport {
                skipped: &parsed.skipped,
                outcomes: &outcomes,
            },
        )?;
        info!("Wrote batch report: {}", report_path.display());
    }

    Ok(failed)
}
