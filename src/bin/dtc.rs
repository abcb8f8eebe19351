//! CLI binary for aparavi-dtc.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `ClientConfig`, runs one task lifecycle, and prints the result.

use anyhow::{Context, Result};
use aparavi_dtc::{
    run_batch, run_task, start_task, ClientConfig, HttpTransport, Operation, Payload, PiiPolicy,
    TaskStatus,
};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR a scanned document
  dtc simple-ocr scan.pdf

  # Parse a document, structured JSON output
  dtc advanced-parse report.docx --json

  # Transcribe an audio file (binary poll ceiling applies)
  dtc audio-transcribe call.wav

  # Anonymize PII in plain text
  dtc anonymize-pii --text "John Doe, SSN 078-05-1120"

  # Censor PII under the HIPAA policy with a custom mask character
  dtc pii-censor records.pdf --pii-policy hipaa --censor-char '#'

  # Run several files sequentially, continuing past failures
  dtc simple-parse a.pdf b.pdf c.pdf --continue-on-fail

  # Submit a custom pipeline and keep the task alive
  dtc custom --pipeline-file graph.json --no-release

ENVIRONMENT VARIABLES:
  APARAVI_API_KEY    API key (required)
  APARAVI_BASE_URL   Override the task endpoint
  RUST_LOG           Tracing filter (overrides -v/-q)

SETUP:
  1. Set API key:    export APARAVI_API_KEY=...
  2. Run:            dtc simple-ocr document.pdf
"#;

/// Run document-processing pipelines against the Aparavi Data Toolchain.
#[derive(Parser, Debug)]
#[command(
    name = "dtc",
    version,
    about = "Run document-processing pipelines against the Aparavi Data Toolchain",
    long_about = "Submit a processing pipeline (OCR, parsing, audio transcription, PII \
handling) to the Aparavi task service, upload one or more payloads, poll for results, \
and release the task.",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Operation to run.
    #[arg(value_enum)]
    operation: OperationArg,

    /// Input files. Each file runs as its own task, sequentially.
    files: Vec<PathBuf>,

    /// Process this text instead of files.
    #[arg(long, conflicts_with = "files")]
    text: Option<String>,

    /// Path to a custom pipeline descriptor (custom operation only).
    #[arg(long)]
    pipeline_file: Option<PathBuf>,

    /// Task endpoint base URL. WebSocket-style URLs are normalized.
    #[arg(long, env = "APARAVI_BASE_URL")]
    base_url: Option<String>,

    /// API key; prefer the environment variable over the flag.
    #[arg(long, env = "APARAVI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Worker threads requested for the remote task.
    #[arg(long)]
    threads: Option<u32>,

    /// Poll ceiling override in seconds (replaces both text and binary ceilings).
    #[arg(long)]
    timeout: Option<u64>,

    /// PII jurisdiction policy for pii-censor.
    #[arg(long, value_enum, default_value = "usa")]
    pii_policy: PolicyArg,

    /// Replacement character for censored PII spans.
    #[arg(long)]
    censor_char: Option<char>,

    /// Keep the remote task alive after completion.
    #[arg(long)]
    no_release: bool,

    /// Keep processing remaining files after a failure.
    #[arg(long)]
    continue_on_fail: bool,

    /// Output the full result body as pretty-printed JSON.
    #[arg(long)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OperationArg {
    SimpleOcr,
    SimpleParse,
    AdvancedParse,
    AudioTranscribe,
    AudioSummary,
    AnonymizePii,
    PiiCensor,
    Custom,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    Usa,
    International,
    Hipaa,
}

impl From<PolicyArg> for PiiPolicy {
    fn from(v: PolicyArg) -> Self {
        match v {
            PolicyArg::Usa => PiiPolicy::UnitedStates,
            PolicyArg::International => PiiPolicy::International,
            PolicyArg::Hipaa => PiiPolicy::Hipaa,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let operation = build_operation(&cli).await?;
    let config = build_config(&cli)?;
    let transport = HttpTransport::new(&config).context("Failed to build HTTP client")?;

    // Custom pipeline with no payload is submit-only: print the token and
    // leave the task running for out-of-band collection.
    if matches!(cli.operation, OperationArg::Custom) && cli.files.is_empty() && cli.text.is_none() {
        let outcome = start_task(&transport, &config, &operation)
            .await
            .context("Pipeline submission failed")?;
        println!("{}", outcome.token);
        return Ok(());
    }

    let payloads = collect_payloads(&cli).await?;

    if payloads.len() == 1 {
        let payload = payloads.into_iter().next().map(|(_, p)| p);
        let outcome = run_task(
            &transport,
            &config,
            &operation,
            payload.context("no payload")?,
        )
        .await
        .context("Task failed")?;
        print_outcome(&cli, &outcome.body, outcome.status)?;
        return Ok(());
    }

    // Multiple files: strictly sequential batch.
    let items: Vec<(Operation, Payload)> = payloads
        .into_iter()
        .map(|(_, p)| (operation.clone(), p))
        .collect();
    let names: Vec<String> = cli
        .files
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    let results = run_batch(&transport, &config, items).await;

    let mut failures = 0usize;
    for (name, result) in names.iter().zip(results) {
        match result {
            Ok(outcome) => {
                if !cli.quiet {
                    eprintln!("{name}: {:?}", outcome.status);
                }
                print_outcome(&cli, &outcome.body, outcome.status)?;
            }
            Err(e) => {
                failures += 1;
                eprintln!("{name}: error: {e}");
                if !cli.continue_on_fail {
                    anyhow::bail!("aborting after failure on {name} (use --continue-on-fail)");
                }
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} item(s) failed");
    }
    Ok(())
}

/// Map CLI args to an `Operation`.
async fn build_operation(cli: &Cli) -> Result<Operation> {
    Ok(match cli.operation {
        OperationArg::SimpleOcr => Operation::SimpleOcr,
        OperationArg::SimpleParse => Operation::SimpleParse,
        OperationArg::AdvancedParse => Operation::AdvancedParse,
        OperationArg::AudioTranscribe => Operation::AudioTranscribe,
        OperationArg::AudioSummary => Operation::AudioSummary,
        OperationArg::AnonymizePii => Operation::AnonymizePii,
        OperationArg::PiiCensor => Operation::PiiCensor {
            policy: cli.pii_policy.into(),
            censor_char: cli.censor_char,
        },
        OperationArg::Custom => {
            let path = cli
                .pipeline_file
                .as_ref()
                .context("custom operation requires --pipeline-file")?;
            let descriptor_json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read pipeline from {}", path.display()))?;
            Operation::Custom { descriptor_json }
        }
    })
}

/// Map CLI args to a `ClientConfig`.
fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let mut builder = ClientConfig::builder(&cli.api_key).release_tasks(!cli.no_release);
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url);
    }
    if let Some(threads) = cli.threads {
        builder = builder.threads(threads);
    }
    if let Some(secs) = cli.timeout {
        let ceiling = Duration::from_secs(secs);
        builder = builder.text_poll_ceiling(ceiling).binary_poll_ceiling(ceiling);
    }
    builder.build().context("Invalid configuration")
}

/// Read the inputs into payloads, keyed by display name for reporting.
async fn collect_payloads(cli: &Cli) -> Result<Vec<(String, Payload)>> {
    if let Some(ref text) = cli.text {
        return Ok(vec![("<text>".to_string(), Payload::Text(text.clone()))]);
    }
    if cli.files.is_empty() {
        anyhow::bail!("no input: pass one or more files, or --text");
    }

    let mut payloads = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        payloads.push((path.display().to_string(), Payload::File { bytes, filename }));
    }
    Ok(payloads)
}

fn print_outcome(cli: &Cli, body: &serde_json::Value, status: TaskStatus) -> Result<()> {
    if status == TaskStatus::Processing && !cli.quiet {
        eprintln!("task still processing at the poll ceiling; partial result follows");
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if cli.json {
        let json = serde_json::to_string_pretty(body).context("Failed to serialize result")?;
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
        return Ok(());
    }

    // Plain mode: print extracted text when the body has a recognizable
    // text field, otherwise fall back to compact JSON.
    match body.get("text") {
        Some(serde_json::Value::String(s)) => {
            writeln!(handle, "{s}").context("Failed to write to stdout")?
        }
        Some(serde_json::Value::Array(parts)) => {
            for part in parts {
                match part {
                    serde_json::Value::String(s) => {
                        writeln!(handle, "{s}").context("Failed to write to stdout")?
                    }
                    other => writeln!(handle, "{other}").context("Failed to write to stdout")?,
                }
            }
        }
        _ => writeln!(handle, "{body}").context("Failed to write to stdout")?,
    }
    Ok(())
}
