//! # aparavi-dtc
//!
//! Client for the Aparavi Data Toolchain: run document-processing
//! pipelines (OCR, parsing, audio transcription, PII handling) against the
//! hosted task service.
//!
//! ## Why this crate?
//!
//! The toolchain API is small — three endpoints — but using it correctly
//! is not: pipeline descriptors must be fixed up before submission, the
//! ingress takes a moment to provision after a task is created, uploads
//! fail transiently while it does, results arrive either inline in the
//! upload response or only later via status polling, and tasks keep
//! billing until released. This crate owns that whole lifecycle so the
//! host application sees one call per document.
//!
//! ## Task Lifecycle
//!
//! ```text
//! Operation + Payload
//!  │
//!  ├─ 1. Build     descriptor template → webhook fixup → validate
//!  ├─ 2. Submit    POST /task → token
//!  ├─ 3. Upload    POST /task/data, retried with exponential backoff
//!  ├─ 4. Poll      GET /task until terminal state or ceiling
//!  └─ 5. Release   DELETE /task on every exit path after submit
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aparavi_dtc::{run_task, ClientConfig, HttpTransport, Operation, Payload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder(std::env::var("APARAVI_API_KEY")?).build()?;
//!     let transport = HttpTransport::new(&config)?;
//!
//!     let bytes = std::fs::read("invoice.pdf")?;
//!     let outcome = run_task(
//!         &transport,
//!         &config,
//!         &Operation::SimpleOcr,
//!         Payload::File { bytes, filename: "invoice.pdf".into() },
//!     )
//!     .await?;
//!
//!     println!("{}", serde_json::to_string_pretty(&outcome.body)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `dtc` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! aparavi-dtc = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod poller;
pub mod retry;
pub mod task;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_BASE_URL};
pub use error::DtcError;
pub use pipeline::{Operation, PiiPolicy, PipelineDescriptor};
pub use poller::{wait_for_result, PollOutcome};
pub use retry::RetryPolicy;
pub use task::{run_batch, run_task, start_task, Payload, TaskOutcome, TaskStatus};
pub use transport::{Body, HttpTransport, SubmitOptions, Transport, TransportResult, UploadMetadata};
