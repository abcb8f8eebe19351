//! The task lifecycle: submit → upload → poll, with guaranteed teardown.
//!
//! ## Lifecycle of one item
//!
//! ```text
//! Operation + Payload
//!  │
//!  ├─ 1. Build     descriptor template → webhook fixup → validate
//!  ├─ 2. Submit    POST /task → token
//!  ├─ 3. Readiness bounded status probes while the ingress provisions
//!  ├─ 4. Upload    POST /task/data, retried on connection-class errors
//!  ├─ 5. Poll      until terminal state or ceiling (partial, not error)
//!  └─ 6. Release   DELETE /task on every exit path after submit
//! ```
//!
//! Batches run strictly sequentially — one full lifecycle at a time, a
//! fresh token and retry budget per item, errors captured per item so the
//! host decides whether to continue past a failure.

use crate::config::ClientConfig;
use crate::error::DtcError;
use crate::pipeline::{prepare_for_submission, Operation};
use crate::poller::{wait_for_result, PollOutcome};
use crate::retry::RetryPolicy;
use crate::transport::{SubmitOptions, Transport, UploadMetadata};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Readiness probes attempted before the first upload. Non-fatal if the
/// state never clears up — the upload retry policy absorbs a slow ingress.
const READINESS_PROBES: u32 = 3;

/// The payload pushed into a task's ingress.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Raw file bytes with their original filename.
    File { bytes: Vec<u8>, filename: String },
    /// Plain UTF-8 text.
    Text(String),
    /// A JSON document, serialized and uploaded as `data.json`.
    Json(Value),
}

impl Payload {
    /// Binary payloads get the longer poll ceiling; scanned documents and
    /// audio routinely outlast the text ceiling.
    pub fn is_binary(&self) -> bool {
        matches!(self, Payload::File { .. })
    }

    fn bytes(&self) -> Vec<u8> {
        match self {
            Payload::File { bytes, .. } => bytes.clone(),
            Payload::Text(s) => s.as_bytes().to_vec(),
            Payload::Json(v) => v.to_string().into_bytes(),
        }
    }

    fn metadata(&self) -> UploadMetadata {
        match self {
            Payload::File { filename, .. } => UploadMetadata::for_file(filename.clone()),
            Payload::Text(_) => UploadMetadata::for_text(),
            Payload::Json(_) => UploadMetadata::for_file("data.json"),
        }
    }
}

/// Whether the task finished within the poll ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// A terminal-success result was collected.
    Completed,
    /// The ceiling elapsed first; `body` is the best partial result.
    /// The task may still finish remotely.
    Processing,
}

/// The per-item result handed back to the host.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub token: String,
    pub status: TaskStatus,
    pub body: Value,
}

/// Run one full task lifecycle for `operation` with `payload`.
///
/// The remote task is released on every exit path once submission
/// succeeded (unless [`ClientConfig::release_tasks`] is off); teardown
/// failures are logged and never override the primary outcome.
///
/// # Errors
/// * [`DtcError::Configuration`] — descriptor invalid; nothing submitted.
/// * [`DtcError::Submission`] — task creation rejected.
/// * [`DtcError::Upload`] — upload failed after the retry budget.
/// * [`DtcError::Processing`] — remote task reported terminal failure.
///
/// A poll-ceiling timeout is **not** an error: the outcome comes back
/// with [`TaskStatus::Processing`] and whatever partial body exists.
pub async fn run_task(
    transport: &dyn Transport,
    config: &ClientConfig,
    operation: &Operation,
    payload: Payload,
) -> Result<TaskOutcome, DtcError> {
    let mut descriptor = operation.descriptor(payload.is_binary())?;
    prepare_for_submission(&mut descriptor);

    info!(operation = operation.name(), "submitting pipeline");
    let token = transport
        .submit(
            &descriptor,
            &SubmitOptions {
                token: None,
                threads: config.threads,
            },
        )
        .await?;
    info!(operation = operation.name(), token, "task created");

    let result = drive_lifecycle(transport, config, &token, &payload).await;
    release(transport, config, &token).await;
    result.map(|(status, body)| TaskOutcome {
        token,
        status,
        body,
    })
}

/// Submit a pipeline without uploading any payload — fire-and-forget.
///
/// The caller keeps the token and collects results out of band, so the
/// task is *not* released here regardless of [`ClientConfig::release_tasks`].
pub async fn start_task(
    transport: &dyn Transport,
    config: &ClientConfig,
    operation: &Operation,
) -> Result<TaskOutcome, DtcError> {
    let mut descriptor = operation.descriptor(false)?;
    prepare_for_submission(&mut descriptor);

    info!(operation = operation.name(), "submitting pipeline (no payload)");
    let token = transport
        .submit(
            &descriptor,
            &SubmitOptions {
                token: None,
                threads: config.threads,
            },
        )
        .await?;
    info!(token, "task started");

    Ok(TaskOutcome {
        body: serde_json::json!({ "token": token, "status": "started" }),
        token,
        status: TaskStatus::Processing,
    })
}

/// Run a batch of items strictly sequentially, one lifecycle at a time.
///
/// Each item gets a fresh token and retry budget; a failed item never
/// aborts the rest. The host inspects the per-item `Result`s to decide
/// between continue-on-failure and halt.
pub async fn run_batch(
    transport: &dyn Transport,
    config: &ClientConfig,
    items: Vec<(Operation, Payload)>,
) -> Vec<Result<TaskOutcome, DtcError>> {
    let total = items.len();
    let mut results = Vec::with_capacity(total);
    for (index, (operation, payload)) in items.into_iter().enumerate() {
        debug!(index, total, operation = operation.name(), "batch item start");
        let result = run_task(transport, config, &operation, payload).await;
        if let Err(ref e) = result {
            warn!(index, "batch item failed: {e}");
        }
        results.push(result);
    }
    results
}

// ── Internal phases ──────────────────────────────────────────────────────

async fn drive_lifecycle(
    transport: &dyn Transport,
    config: &ClientConfig,
    token: &str,
    payload: &Payload,
) -> Result<(TaskStatus, Value), DtcError> {
    await_ready(transport, token, config.poll_interval).await;

    let bytes = payload.bytes();
    let metadata = payload.metadata();
    debug!(
        token,
        size = bytes.len(),
        mimetype = %metadata.mimetype,
        "uploading payload"
    );

    let policy = RetryPolicy::from_config(config);
    let upload_response = policy
        .run(|| transport.upload(token, &bytes, &metadata))
        .await?;

    let ceiling = if payload.is_binary() {
        config.binary_poll_ceiling
    } else {
        config.text_poll_ceiling
    };

    match wait_for_result(transport, token, &upload_response, config.poll_interval, ceiling).await?
    {
        PollOutcome::Completed(body) => Ok((TaskStatus::Completed, body)),
        PollOutcome::Partial(body) => Ok((TaskStatus::Processing, body)),
    }
}

/// Probe the task state a bounded number of times before uploading. The
/// ingress needs a moment to provision after submission; pushing data too
/// early lands on a refused connection. Never fatal — an unclear state
/// just means the upload retry policy does the waiting instead.
async fn await_ready(transport: &dyn Transport, token: &str, interval: Duration) {
    for probe in 1..=READINESS_PROBES {
        sleep(interval).await;
        match transport.poll_status(token).await {
            Ok(result) => {
                let state = result
                    .body
                    .as_json()
                    .and_then(|b| b.get("status").or_else(|| b.pointer("/data/status")))
                    .and_then(Value::as_str)
                    .map(str::to_lowercase);
                match state.as_deref() {
                    Some("processing") | Some("ready") | Some("active") => {
                        debug!(token, probe, "ingress ready");
                        return;
                    }
                    other => {
                        debug!(token, probe, state = other.unwrap_or("unknown"), "not ready yet");
                    }
                }
            }
            Err(e) => {
                debug!(token, probe, "readiness probe failed: {e}");
            }
        }
    }
    warn!(token, "task state unclear after readiness probes, proceeding to upload");
}

/// Best-effort task teardown; failures are logged, never propagated.
async fn release(transport: &dyn Transport, config: &ClientConfig, token: &str) {
    if !config.release_tasks {
        return;
    }
    match transport.terminate(token).await {
        Ok(()) => debug!(token, "task released"),
        Err(e) => warn!(token, "task teardown failed: {e}"),
    }
}
