use crate::engine::LibraryOptimizer;
use crate::ingest;
use crate::model::{FailurePolicy, InputBatch, RunConfig, RunMode, MAX_COMPOUNDS};
use crate::orchestrator::{self, JobSession};
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use rand::RngCore;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

/// Mid-batch compound failure handling, see `--on-error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnError {
    /// Abort the run and discard everything accumulated so far
    Abort,
    /// Skip the failing compound and keep going
    Skip,
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "mrm-tune",
    version,
    about = "MRM transition parameter optimizer with optional TUI"
)]
pub struct Cli {
    /// Optimize a single compound by InChIKey
    #[arg(long, conflicts_with = "batch_file")]
    pub inchikey: Option<String>,

    /// Batch file of InChIKeys (.csv with an InChIKey column, or .txt with one key per line)
    #[arg(long)]
    pub batch_file: Option<PathBuf>,

    /// Reference transition library CSV
    #[arg(long, default_value = "transition_library.csv")]
    pub library: PathBuf,

    /// Print the run summary as JSON and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print a text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// M/z tolerance for interference matching, 0 to 10
    #[arg(long, default_value_t = 0.7, value_parser = parse_mz_tolerance)]
    pub mz_tolerance: f64,

    /// RT tolerance for interference matching, 0 to 10
    #[arg(long, default_value_t = 2.0, value_parser = parse_rt_tolerance)]
    pub rt_tolerance: f64,

    /// Offset applied to reported retention times, -10 to 10
    #[arg(long, default_value_t = 0.0, value_parser = parse_rt_offset, allow_hyphen_values = true)]
    pub rt_offset: f64,

    /// Weight of the specificity term in transition scoring, 0 to 1
    #[arg(long, default_value_t = 0.2, value_parser = parse_specificity_weight)]
    pub specificity_weight: f64,

    /// Output CSV for the optimized transitions
    #[arg(long, default_value = "mrm_tune_output.csv")]
    pub output: PathBuf,

    /// What to do when a compound fails mid-batch
    #[arg(long, value_enum, default_value_t = OnError::Abort)]
    pub on_error: OnError,

    /// Progress poll interval for text mode
    #[arg(long, default_value = "100ms")]
    pub poll_interval: humantime::Duration,

    /// Export the run summary as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,

    /// Automatically start the calculation when the TUI launches
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub run_on_launch: bool,
}

fn parse_in_range(s: &str, low: f64, high: f64) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("{s} is not a number"))?;
    if (low..=high).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is outside [{low}, {high}]"))
    }
}

fn parse_mz_tolerance(s: &str) -> Result<f64, String> {
    parse_in_range(s, 0.0, 10.0)
}

fn parse_rt_tolerance(s: &str) -> Result<f64, String> {
    parse_in_range(s, 0.0, 10.0)
}

fn parse_rt_offset(s: &str) -> Result<f64, String> {
    parse_in_range(s, -10.0, 10.0)
}

fn parse_specificity_weight(s: &str) -> Result<f64, String> {
    parse_in_range(s, 0.0, 1.0)
}

pub async fn run(args: Cli) -> Result<()> {
    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_text(args).await;
        }
    }

    if args.json {
        return run_json(args).await;
    }

    run_text(args).await
}

/// Generate a random run ID.
fn gen_run_id() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    u64::from_le_bytes(b).to_string()
}

/// Ingest the run input from CLI arguments.
pub(crate) fn ingest_from_args(args: &Cli) -> Result<InputBatch> {
    match (&args.inchikey, &args.batch_file) {
        (Some(raw), None) => ingest::ingest_single(raw).context("invalid --inchikey"),
        (None, Some(path)) => ingest::ingest_batch(path).context("invalid --batch-file"),
        (Some(_), Some(_)) => bail!("--inchikey conflicts with --batch-file"),
        (None, None) => bail!("provide --inchikey or --batch-file"),
    }
}

/// Build a `RunConfig` from CLI arguments and the ingested input.
///
/// Range enforcement already happened in the argument parsers; this is a
/// pure assembly step.
pub fn build_config(args: &Cli, batch: &InputBatch) -> RunConfig {
    RunConfig {
        run_id: gen_run_id(),
        mz_tolerance: args.mz_tolerance,
        rt_tolerance: args.rt_tolerance,
        rt_offset: args.rt_offset,
        specificity_weight: args.specificity_weight,
        max_compounds: MAX_COMPOUNDS,
        output_path: args.output.clone(),
        mode: match batch {
            InputBatch::Single { inchikey } => RunMode::Single {
                inchikey: inchikey.clone(),
            },
            InputBatch::Table { .. } => RunMode::Batch,
        },
        failure_policy: match args.on_error {
            OnError::Abort => FailurePolicy::Abort,
            OnError::Skip => FailurePolicy::Skip,
        },
    }
}

async fn run_text(args: Cli) -> Result<()> {
    let batch = ingest_from_args(&args)?;
    let cfg = build_config(&args, &batch);
    let (out_tx, out_handle) = spawn_output_writer();

    let mut session = JobSession::new();
    let progress = session.progress();
    let optimizer = Box::new(LibraryOptimizer::new(&cfg, &args.library));
    session
        .start(cfg.clone(), batch, optimizer)
        .context("failed to start the calculation")?;

    // Poll on our own schedule; the worker never pushes to us.
    let poll = Duration::from(args.poll_interval);
    let mut last_percent = None;
    loop {
        let snap = progress.snapshot();
        if last_percent != Some(snap.percent) {
            let _ = out_tx.send(OutputLine::Stderr(format!("Progress: {}%", snap.percent)));
            last_percent = Some(snap.percent);
        }
        if !snap.running {
            break;
        }
        tokio::time::sleep(poll).await;
    }

    let results = session.wait().await;

    if let Some(message) = progress.snapshot().error {
        drop(out_tx);
        let _ = out_handle.await;
        bail!("calculation failed: {message}");
    }

    let processed = orchestrator::process_run_completion(
        &cfg,
        args.export_json.as_deref(),
        args.auto_save,
        results.unwrap_or_default(),
    );
    let summary = crate::text_summary::build_text_summary(&cfg, &processed);
    for line in summary.lines {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }
    send_run_messages(&out_tx, &processed);
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

/// Report persistence/export outcomes on stderr.
fn send_run_messages(
    out_tx: &mpsc::UnboundedSender<OutputLine>,
    processed: &orchestrator::ProcessedRun,
) {
    if let Some(path) = processed.persisted_path.as_ref() {
        let _ = out_tx.send(OutputLine::Stderr(format!(
            "Results written: {}",
            path.display()
        )));
    }
    for message in &processed.messages {
        let _ = out_tx.send(OutputLine::Stderr(message.clone()));
    }
    if let Some(path) = processed.auto_saved_path.as_ref() {
        let _ = out_tx.send(OutputLine::Stderr(format!("Saved: {}", path.display())));
    }
}

async fn run_json(args: Cli) -> Result<()> {
    let batch = ingest_from_args(&args)?;
    let cfg = build_config(&args, &batch);
    let (out_tx, out_handle) = spawn_output_writer();

    let mut session = JobSession::new();
    let progress = session.progress();
    let optimizer = Box::new(LibraryOptimizer::new(&cfg, &args.library));
    session
        .start(cfg.clone(), batch, optimizer)
        .context("failed to start the calculation")?;

    let results = session.wait().await;

    if let Some(message) = progress.snapshot().error {
        drop(out_tx);
        let _ = out_handle.await;
        bail!("calculation failed: {message}");
    }

    let processed = orchestrator::process_run_completion(
        &cfg,
        args.export_json.as_deref(),
        args.auto_save,
        results.unwrap_or_default(),
    );
    let summary = orchestrator::build_summary(&cfg, &processed.results);
    let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&summary)?));
    send_run_messages(&out_tx, &processed);
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}
