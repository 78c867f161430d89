use thiserror::Error;

/// Longest slice of a remote response body quoted in a diagnostic.
pub const DIAGNOSTIC_LIMIT: usize = 200;

/// Startup-time pool configuration problems. Never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read pool config {path}: {message}")]
    Unreadable { path: String, message: String },

    #[error("pool config is not valid JSON: {0}")]
    Malformed(String),

    #[error("endpoint pool is empty, configure at least one endpoint with a base_url")]
    EmptyPool,

    #[error("endpoint pool invalid: {}", .0.join("; "))]
    InvalidPool(Vec<String>),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Failure of one (job, endpoint) attempt. Every variant triggers failover.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("reference upload failed: {0}")]
    Upload(String),

    #[error("queue/join failed: {0}")]
    Join(String),

    #[error("queue/data failed: {0}")]
    Stream(String),

    #[error("process_completed but success=false: {0}")]
    JobFailed(String),

    #[error("process_completed but output.data empty: {0}")]
    EmptyOutput(String),

    #[error("no terminal event: {0}")]
    NoTerminalEvent(String),

    #[error("no downloadable address in artifact: {0}")]
    UnresolvableArtifact(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("invalid audio data ({len} < {min} bytes)")]
    InvalidArtifact { len: usize, min: usize },
}

/// One endpoint's failed attempt, kept for the aggregated pool error.
#[derive(Debug)]
pub struct EndpointFailure {
    pub endpoint: String,
    pub error: AttemptError,
}

impl std::fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.endpoint, self.error)
    }
}

/// The only error a caller of the orchestrator ever sees.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("all endpoints currently busy ({skipped} skipped)")]
    AllBusy { skipped: usize },

    #[error("all endpoints failed: {}", last_failure(.failures))]
    Exhausted { failures: Vec<EndpointFailure> },
}

impl PoolError {
    /// Per-endpoint diagnostics in attempt order. Empty for `AllBusy`.
    pub fn failures(&self) -> &[EndpointFailure] {
        match self {
            PoolError::AllBusy { .. } => &[],
            PoolError::Exhausted { failures } => failures,
        }
    }
}

fn last_failure(failures: &[EndpointFailure]) -> String {
    failures
        .last()
        .map(|f| f.to_string())
        .unwrap_or_else(|| "unknown error".to_string())
}

/// Cut a remote body down to a loggable diagnostic on a char boundary.
pub(crate) fn truncate_diagnostic(body: &str) -> String {
    match body.char_indices().nth(DIAGNOSTIC_LIMIT) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}
