//! Completion polling: wait for a task to produce a usable result.
//!
//! The upload response itself often carries the output (the `response`
//! sink writes result fields straight into it), in which case no status
//! poll ever happens. Otherwise the poller sleeps a fixed interval, asks
//! `GET /task` for the state, and keeps going until a terminal state or
//! the caller's ceiling.
//!
//! A ceiling hit is not a failure. Large scans legitimately outlast any
//! reasonable wait, and the task keeps running remotely — so the poller
//! hands back whatever partial result it has and lets the caller decide
//! whether "still processing" is acceptable.

use crate::error::DtcError;
use crate::transport::{Transport, TransportResult};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Response-body fields that mark a usable result.
pub const RESULT_FIELDS: [&str; 6] = ["text", "table", "tables", "documents", "result", "data"];

/// Task states after which no further progress will occur.
const TERMINAL_SUCCESS: &str = "completed";
const TERMINAL_FAILURE: &str = "failed";

/// The poller's verdict. A remote terminal failure is not an outcome —
/// it surfaces as [`DtcError::Processing`] instead.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The task produced a result; the body that carried it.
    Completed(Value),
    /// The ceiling elapsed first. Carries the last upload response, or a
    /// synthetic `{token, status: "processing"}` marker when the upload
    /// response had no body.
    Partial(Value),
}

/// Whether any recognized result field is present in the body.
pub fn has_result_fields(body: &Value) -> bool {
    let Value::Object(map) = body else {
        return false;
    };
    RESULT_FIELDS
        .iter()
        .any(|f| map.get(*f).is_some_and(|v| !v.is_null()))
}

/// Unwrap the `data` envelope some deployments put around the status
/// object, when it actually holds one.
fn status_object(body: &Value) -> &Value {
    match body.get("data") {
        Some(inner) if inner.get("status").is_some() => inner,
        _ => body,
    }
}

/// The task state reported in a status body, lowercased for comparison.
/// The service is inconsistent about casing (`Processing` from readiness
/// probes, `completed` at the end).
fn reported_state(body: &Value) -> Option<String> {
    status_object(body)
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_lowercase)
}

/// Poll until the task reaches a terminal state or `ceiling` elapses.
///
/// Short-circuits to `Completed` when `upload_response` already carries a
/// result field — no status call is made in that case. Status-endpoint
/// failures while polling are logged and treated as "state unknown";
/// polling continues until the ceiling.
///
/// # Errors
/// [`DtcError::Processing`] when the remote task reports terminal failure,
/// carrying the remote detail.
pub async fn wait_for_result(
    transport: &dyn Transport,
    token: &str,
    upload_response: &TransportResult,
    interval: Duration,
    ceiling: Duration,
) -> Result<PollOutcome, DtcError> {
    if let Some(body) = upload_response.body.as_json() {
        if has_result_fields(body) {
            debug!(token, "result fields present in upload response, skipping poll");
            return Ok(PollOutcome::Completed(body.clone()));
        }
    }

    let partial_fallback = || {
        let last = upload_response.body.clone().into_value();
        if last.is_null() {
            json!({ "token": token, "status": "processing" })
        } else {
            last
        }
    };

    let entered = Instant::now();
    loop {
        if entered.elapsed() >= ceiling {
            warn!(
                token,
                ceiling_secs = ceiling.as_secs(),
                "poll ceiling elapsed, returning partial result"
            );
            return Ok(PollOutcome::Partial(partial_fallback()));
        }

        sleep(interval).await;

        let status = match transport.poll_status(token).await {
            Ok(result) => result,
            Err(e) => {
                // State unknown is not terminal; keep polling.
                warn!(token, "status check failed, continuing to poll: {e}");
                continue;
            }
        };

        let Some(body) = status.body.as_json() else {
            debug!(token, "status response had no JSON body");
            continue;
        };

        match reported_state(body).as_deref() {
            Some(TERMINAL_SUCCESS) => {
                debug!(token, "task completed");
                return Ok(PollOutcome::Completed(status_object(body).clone()));
            }
            Some(TERMINAL_FAILURE) => {
                let detail = status
                    .body
                    .remote_message()
                    .unwrap_or_else(|| "task reported failure with no detail".to_string());
                return Err(DtcError::Processing { detail });
            }
            state => {
                debug!(token, state = state.unwrap_or("unknown"), "still polling");
            }
        }
    }
}
