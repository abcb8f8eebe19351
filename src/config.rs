//! Configuration for the Aparavi task client.
//!
//! All client behaviour is controlled through [`ClientConfig`], built via
//! its [`ClientConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config across a batch run, log it, and diff two runs
//! to understand why their outcomes differ.
//!
//! # Design choice: builder over constructor
//! Most callers only set an API key and maybe a base URL; the remaining
//! timing knobs have defaults that match the remote service's observed
//! provisioning behaviour and should rarely change.

use crate::error::DtcError;
use std::time::Duration;

/// Default task endpoint.
pub const DEFAULT_BASE_URL: &str = "https://eaas-dev.aparavi.com";

/// Configuration for a [`crate::transport::HttpTransport`] and the task
/// lifecycle driven through it.
///
/// # Example
/// ```rust
/// use aparavi_dtc::ClientConfig;
///
/// let config = ClientConfig::builder("my-api-key")
///     .base_url("wss://eaas.aparavi.com:443")
///     .threads(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.base_url, "https://eaas.aparavi.com");
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Bearer token sent on every request.
    pub api_key: String,

    /// Normalized base URL of the task endpoint. Default: [`DEFAULT_BASE_URL`].
    ///
    /// The service advertises a WebSocket URI in some dashboards; the
    /// builder rewrites `ws://`/`wss://` schemes to HTTP(S) and strips a
    /// trailing `:port` suffix so either form works.
    pub base_url: String,

    /// Worker threads requested for the remote task, forwarded as a query
    /// parameter on submission. Default: None (server default).
    pub threads: Option<u32>,

    /// Maximum upload attempts on connection-class failures. Default: 5.
    ///
    /// The upload is the step most prone to transient failure: the remote
    /// endpoint accepts the descriptor before the task's ingress has
    /// finished provisioning, so the first data push can be refused.
    pub upload_attempts: u32,

    /// Initial delay before the first upload retry. Default: 2000 ms.
    /// Multiplied by [`Self::backoff_multiplier`] after each failed attempt.
    pub initial_backoff: Duration,

    /// Backoff growth factor. Default: 1.5 (2 s → 3 s → 4.5 s → 6.75 s).
    pub backoff_multiplier: f64,

    /// Interval between status polls. Default: 2000 ms.
    pub poll_interval: Duration,

    /// Poll ceiling for plain-text payloads. Default: 60 s.
    pub text_poll_ceiling: Duration,

    /// Poll ceiling for binary payloads (scanned documents, audio).
    /// Default: 120 s. Longer because OCR and transcription of large files
    /// routinely outlast the text ceiling.
    pub binary_poll_ceiling: Duration,

    /// Terminate the remote task on every exit path once submitted.
    /// Default: true. Disable for fire-and-forget custom pipelines where
    /// the caller keeps the token and collects results later.
    pub release_tasks: bool,
}

impl ClientConfig {
    /// Create a new builder with the given API key.
    pub fn builder(api_key: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: ClientConfig {
                api_key: api_key.into(),
                base_url: DEFAULT_BASE_URL.to_string(),
                threads: None,
                upload_attempts: 5,
                initial_backoff: Duration::from_millis(2000),
                backoff_multiplier: 1.5,
                poll_interval: Duration::from_millis(2000),
                text_poll_ceiling: Duration::from_secs(60),
                binary_poll_ceiling: Duration::from_secs(120),
                release_tasks: true,
            },
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("threads", &self.threads)
            .field("upload_attempts", &self.upload_attempts)
            .field("initial_backoff", &self.initial_backoff)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("poll_interval", &self.poll_interval)
            .field("text_poll_ceiling", &self.text_poll_ceiling)
            .field("binary_poll_ceiling", &self.binary_poll_ceiling)
            .field("release_tasks", &self.release_tasks)
            .finish()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Override the base URL. WebSocket schemes and `:port` suffixes are
    /// normalized away.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = normalize_base_url(&url.into());
        self
    }

    pub fn threads(mut self, n: u32) -> Self {
        self.config.threads = Some(n);
        self
    }

    pub fn upload_attempts(mut self, n: u32) -> Self {
        self.config.upload_attempts = n.max(1);
        self
    }

    pub fn initial_backoff(mut self, d: Duration) -> Self {
        self.config.initial_backoff = d;
        self
    }

    pub fn backoff_multiplier(mut self, m: f64) -> Self {
        self.config.backoff_multiplier = m;
        self
    }

    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.config.poll_interval = d;
        self
    }

    pub fn text_poll_ceiling(mut self, d: Duration) -> Self {
        self.config.text_poll_ceiling = d;
        self
    }

    pub fn binary_poll_ceiling(mut self, d: Duration) -> Self {
        self.config.binary_poll_ceiling = d;
        self
    }

    pub fn release_tasks(mut self, v: bool) -> Self {
        self.config.release_tasks = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, DtcError> {
        let c = &self.config;
        if c.api_key.trim().is_empty() {
            return Err(DtcError::Configuration {
                detail: "API key must not be empty".into(),
            });
        }
        if !c.base_url.starts_with("http://") && !c.base_url.starts_with("https://") {
            return Err(DtcError::Configuration {
                detail: format!("base URL must be http(s), got '{}'", c.base_url),
            });
        }
        if c.backoff_multiplier < 1.0 {
            return Err(DtcError::Configuration {
                detail: format!(
                    "backoff multiplier must be >= 1.0, got {}",
                    c.backoff_multiplier
                ),
            });
        }
        Ok(self.config)
    }
}

/// Rewrite a WebSocket-style URL to HTTP(S), strip any trailing slash and
/// any trailing `:port`. Endpoint paths are appended verbatim, so a
/// trailing slash here would produce `//task` URLs.
pub fn normalize_base_url(url: &str) -> String {
    let rewritten = if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        url.to_string()
    };
    let rewritten = rewritten.trim_end_matches('/').to_string();

    // Strip a trailing :port suffix (e.g. ":443") but not the scheme colon.
    match rewritten.rfind(':') {
        Some(idx) if idx > "https".len() && rewritten[idx + 1..].chars().all(|c| c.is_ascii_digit()) && !rewritten[idx + 1..].is_empty() => {
            rewritten[..idx].to_string()
        }
        _ => rewritten,
    }
}
