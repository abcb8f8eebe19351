//! The transport client: the only module that talks to the network.
//!
//! Three endpoint operations cover the whole task lifecycle — submit a
//! descriptor (`POST /task`), push payload bytes (`POST /task/data`), and
//! fetch status (`GET /task`) — plus a best-effort teardown. Everything is
//! expressed through the [`Transport`] trait so the poller, retry policy,
//! and orchestrator can be driven against a scripted double in tests.
//!
//! ## Lenient body decoding
//!
//! The remote service is inconsistent about response bodies: some endpoints
//! return JSON, some plain text, some nothing at all. A body that fails to
//! parse as JSON is **never** a transport failure — it degrades to the raw
//! string so the caller still sees whatever the server said.

use crate::config::ClientConfig;
use crate::error::DtcError;
use crate::pipeline::PipelineDescriptor;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// The parsed-or-raw payload of one HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Response had no body (or only whitespace).
    Empty,
    /// Body was present but not valid JSON; kept verbatim.
    Text(String),
    /// Body parsed as JSON.
    Json(Value),
}

impl Body {
    /// Decode a raw response body, degrading gracefully on non-JSON.
    pub fn decode(raw: &str) -> Body {
        if raw.trim().is_empty() {
            return Body::Empty;
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(v) => Body::Json(v),
            Err(_) => Body::Text(raw.to_string()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Convert to a JSON value for returning to the host: raw text becomes
    /// a JSON string, an empty body becomes null.
    pub fn into_value(self) -> Value {
        match self {
            Body::Empty => Value::Null,
            Body::Text(s) => Value::String(s),
            Body::Json(v) => v,
        }
    }

    /// Extract the structured error message a failing endpoint may embed
    /// (`body.error.message` or `body.message`), falling back to the raw
    /// body text.
    pub fn remote_message(&self) -> Option<String> {
        match self {
            Body::Empty => None,
            Body::Text(s) => Some(s.clone()),
            Body::Json(v) => v
                .pointer("/error/message")
                .or_else(|| v.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| Some(v.to_string())),
        }
    }
}

/// Status code and decoded body of one HTTP call. Ephemeral — consumed by
/// the caller, never retained.
#[derive(Debug, Clone)]
pub struct TransportResult {
    pub status: u16,
    pub body: Body,
}

/// Optional query parameters for task submission.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Resume/attach to an existing task instead of creating one.
    pub token: Option<String>,
    /// Worker threads requested for the remote task.
    pub threads: Option<u32>,
}

/// Filename and content-type hints forwarded with an upload.
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub filename: Option<String>,
    pub mimetype: String,
}

impl UploadMetadata {
    /// Metadata for a named file, with the mimetype detected from its
    /// extension.
    pub fn for_file(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        Self {
            mimetype: detect_mimetype(&filename).to_string(),
            filename: Some(filename),
        }
    }

    /// Metadata for raw UTF-8 text.
    pub fn for_text() -> Self {
        Self {
            filename: None,
            mimetype: "text/plain".to_string(),
        }
    }
}

/// Map a filename extension to a content type. Unknown extensions fall
/// back to `application/octet-stream`.
pub fn detect_mimetype(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    match lower.rsplit('.').next() {
        Some("pdf") => "application/pdf",
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Pull the task token out of a submission response. The service nests it
/// at `body.data.token` in newer deployments and `body.token` in older
/// ones; both are accepted.
pub fn extract_token(result: &TransportResult) -> Option<String> {
    let body = result.body.as_json()?;
    body.pointer("/data/token")
        .or_else(|| body.get("token"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Map a task-creation response to its token: 200 with a non-empty body
/// carrying a token at either known nesting depth, anything else is a
/// [`DtcError::Submission`].
fn submit_token(result: &TransportResult) -> Result<String, DtcError> {
    if result.status != 200 {
        return Err(DtcError::Submission {
            status: result.status,
            detail: result
                .body
                .remote_message()
                .unwrap_or_else(|| "pipeline execution failed".to_string()),
        });
    }
    if matches!(result.body, Body::Empty) {
        return Err(DtcError::Submission {
            status: result.status,
            detail: "no response data returned from task creation".to_string(),
        });
    }
    extract_token(result).ok_or_else(|| DtcError::Submission {
        status: result.status,
        detail: format!(
            "no token in task-creation response: {}",
            result.body.clone().into_value()
        ),
    })
}

/// The task endpoint operations, as a seam for testing.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit a pipeline descriptor, returning the task token.
    async fn submit(
        &self,
        descriptor: &PipelineDescriptor,
        options: &SubmitOptions,
    ) -> Result<String, DtcError>;

    /// Push payload bytes into the running task's ingress.
    async fn upload(
        &self,
        token: &str,
        data: &[u8],
        metadata: &UploadMetadata,
    ) -> Result<TransportResult, DtcError>;

    /// Fetch the task's current status.
    async fn poll_status(&self, token: &str) -> Result<TransportResult, DtcError>;

    /// Release the remote task. Best-effort; callers log and move on.
    async fn terminate(&self, token: &str) -> Result<(), DtcError>;
}

/// [`Transport`] implementation over HTTPS.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTransport {
    /// Build a transport from the client configuration. The base URL is
    /// already normalized by the config builder.
    pub fn new(config: &ClientConfig) -> Result<Self, DtcError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| DtcError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Read a response into a [`TransportResult`], never failing on the
    /// body itself.
    async fn read_response(response: reqwest::Response) -> TransportResult {
        let status = response.status().as_u16();
        let raw = response.text().await.unwrap_or_default();
        TransportResult {
            status,
            body: Body::decode(&raw),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(
        &self,
        descriptor: &PipelineDescriptor,
        options: &SubmitOptions,
    ) -> Result<String, DtcError> {
        let mut request = self
            .client
            .post(self.url("/task"))
            .bearer_auth(&self.api_key)
            .json(descriptor);
        if let Some(ref token) = options.token {
            request = request.query(&[("token", token.as_str())]);
        }
        if let Some(threads) = options.threads {
            request = request.query(&[("threads", threads)]);
        }

        let response = request.send().await.map_err(|e| DtcError::Submission {
            status: 0,
            detail: e.to_string(),
        })?;
        let result = Self::read_response(response).await;
        debug!(status = result.status, "submit response");
        submit_token(&result)
    }

    async fn upload(
        &self,
        token: &str,
        data: &[u8],
        metadata: &UploadMetadata,
    ) -> Result<TransportResult, DtcError> {
        let mut request = self
            .client
            .post(self.url("/task/data"))
            .bearer_auth(&self.api_key)
            .header("Content-Type", &metadata.mimetype)
            .query(&[("token", token)])
            .body(data.to_vec());
        if let Some(ref filename) = metadata.filename {
            request = request
                .query(&[("filename", filename.as_str())])
                .header(
                    "Content-Disposition",
                    format!("attachment; filename=\"{filename}\""),
                );
        }

        let response = request.send().await.map_err(|e| DtcError::Upload {
            // Keep reqwest's connection-failure wording intact: the retry
            // policy classifies connection-class errors by this text.
            detail: e.to_string(),
        })?;
        let result = Self::read_response(response).await;
        debug!(status = result.status, "upload response");

        if result.status != 200 {
            return Err(DtcError::Upload {
                detail: result
                    .body
                    .remote_message()
                    .unwrap_or_else(|| format!("data upload failed (status {})", result.status)),
            });
        }
        Ok(result)
    }

    async fn poll_status(&self, token: &str) -> Result<TransportResult, DtcError> {
        let response = self
            .client
            .get(self.url("/task"))
            .bearer_auth(&self.api_key)
            .query(&[("token", token)])
            .send()
            .await
            .map_err(|e| DtcError::Status {
                status: 0,
                detail: e.to_string(),
            })?;
        let result = Self::read_response(response).await;

        if result.status != 200 {
            return Err(DtcError::Status {
                status: result.status,
                detail: result
                    .body
                    .remote_message()
                    .unwrap_or_else(|| "status check failed".to_string()),
            });
        }
        Ok(result)
    }

    async fn terminate(&self, token: &str) -> Result<(), DtcError> {
        let response = self
            .client
            .delete(self.url("/task"))
            .bearer_auth(&self.api_key)
            .query(&[("token", token)])
            .send()
            .await
            .map_err(|e| DtcError::Status {
                status: 0,
                detail: e.to_string(),
            })?;
        let result = Self::read_response(response).await;
        if result.status != 200 {
            return Err(DtcError::Status {
                status: result.status,
                detail: result
                    .body
                    .remote_message()
                    .unwrap_or_else(|| "task teardown failed".to_string()),
            });
        }
        Ok(())
    }
}
