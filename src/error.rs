//! Error types for the aparavi-dtc library.
//!
//! The taxonomy follows the task lifecycle, because each phase has a
//! different recovery story:
//!
//! * [`DtcError::Configuration`] — the descriptor itself is bad. Fails fast,
//!   never retried; no network call was made.
//! * [`DtcError::Submission`] — `POST /task` was rejected or returned no
//!   token. Not retried: a rejected descriptor will be rejected again.
//! * [`DtcError::Upload`] — `POST /task/data` failed. Retried by
//!   [`crate::retry::RetryPolicy`] when the failure is connection-class
//!   (the ingress may still be provisioning); fatal otherwise.
//! * [`DtcError::Status`] — `GET /task` failed. The poller logs it and keeps
//!   polling until its ceiling; it only surfaces if nothing else resolves.
//! * [`DtcError::Processing`] — the remote task reached a terminal failure
//!   state. Fatal; carries the remote-reported detail verbatim.
//!
//! A poll-ceiling timeout is deliberately *not* an error — the task may
//! still finish remotely, so [`crate::task::run_task`] degrades to a
//! partial [`crate::task::TaskOutcome`] instead.

use thiserror::Error;

/// All errors returned by the aparavi-dtc library.
#[derive(Debug, Error)]
pub enum DtcError {
    /// The pipeline descriptor is invalid (bad custom JSON, dangling input
    /// edge, missing source component). No remote call was made.
    #[error("Invalid pipeline configuration: {detail}")]
    Configuration { detail: String },

    /// The task-creation endpoint rejected the descriptor or returned a
    /// body without a token.
    #[error("Task submission failed (status {status}): {detail}")]
    Submission { status: u16, detail: String },

    /// The data-upload endpoint failed. `detail` carries the structured
    /// remote error message when the response body had one, or the raw
    /// transport failure otherwise.
    #[error("Data upload failed: {detail}")]
    Upload { detail: String },

    /// The status endpoint returned non-200. Treated as "state unknown"
    /// while polling.
    #[error("Status check failed (status {status}): {detail}")]
    Status { status: u16, detail: String },

    /// The remote task reached a terminal failure state.
    #[error("Remote processing failed: {detail}")]
    Processing { detail: String },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DtcError {
    /// Whether this error indicates the remote endpoint was unreachable,
    /// refused the connection, or timed out — as opposed to an
    /// application-level rejection.
    ///
    /// Only connection-class upload failures are worth retrying: the task's
    /// ingress may simply not have finished provisioning yet.
    pub fn is_connection_class(&self) -> bool {
        let DtcError::Upload { detail } = self else {
            return false;
        };
        let lower = detail.to_lowercase();
        lower.contains("connection refused")
            || lower.contains("econnrefused")
            || lower.contains("timed out")
            || lower.contains("etimedout")
            || lower.contains("unreachable")
            || lower.contains("connect error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_display_carries_remote_detail() {
        let e = DtcError::Submission {
            status: 403,
            detail: "invalid API key".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("403"), "got: {msg}");
        assert!(msg.contains("invalid API key"), "got: {msg}");
    }

    #[test]
    fn connection_refused_upload_is_connection_class() {
        let e = DtcError::Upload {
            detail: "error sending request: Connection refused (os error 111)".into(),
        };
        assert!(e.is_connection_class());
    }

    #[test]
    fn timed_out_upload_is_connection_class() {
        let e = DtcError::Upload {
            detail: "operation timed out".into(),
        };
        assert!(e.is_connection_class());
    }

    #[test]
    fn application_level_upload_is_not_connection_class() {
        let e = DtcError::Upload {
            detail: "payload exceeds plan limit".into(),
        };
        assert!(!e.is_connection_class());
    }

    #[test]
    fn non_upload_errors_are_never_connection_class() {
        let e = DtcError::Status {
            status: 503,
            detail: "connection refused".into(),
        };
        assert!(!e.is_connection_class());
    }
}
